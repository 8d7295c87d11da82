use crate::error::RelayError;
use crate::Result;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// 消息角色。无法识别的角色按 user 处理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Value")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
}

impl From<Value> for Role {
    fn from(raw: Value) -> Self {
        match raw.as_str() {
            Some("system") => Role::System,
            Some("assistant") => Role::Assistant,
            _ => Role::User,
        }
    }
}

/// 与提供商无关的聊天消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,
    #[serde(default, deserialize_with = "content_text")]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// 任意 JSON 内容转为文本：null、false、0、空串和空容器为 ""，字符串原样，其余取 JSON 文本
fn content_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let text = match value {
        Value::String(s) => s,
        Value::Null | Value::Bool(false) => String::new(),
        Value::Number(ref n) if n.as_f64() == Some(0.0) => String::new(),
        Value::Array(ref items) if items.is_empty() => String::new(),
        Value::Object(ref map) if map.is_empty() => String::new(),
        other => other.to_string(),
    };
    Ok(text)
}

/// 上游提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Provider {
    #[serde(rename = "gemini")]
    #[value(name = "gemini")]
    Gemini,
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
    #[serde(rename = "local_proxy")]
    #[value(name = "local_proxy")]
    LocalProxy,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::LocalProxy => "local_proxy",
        }
    }

    /// 诊断输出里使用的名称
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::OpenAi => "OpenAI-compatible",
            Provider::LocalProxy => "local_proxy",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次生成调用，只在单个请求内存在
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub provider: Provider,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// `POST /generate` 的原始请求体，字段均可缺省且类型不限，由 validate 负责校验
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayRequest {
    #[serde(default)]
    pub provider: Option<Value>,
    #[serde(default)]
    pub model: Option<Value>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
}

impl RelayRequest {
    /// 空请求体按 `{}` 处理；合法 JSON 但不是对象时按校验错误处理
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(RelayError::validation("request body must be a JSON object"));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// 中继只接受 local_proxy，且 model 必须是非空字符串
    pub fn validate(self) -> Result<GenerationRequest> {
        let provider = self.provider.as_ref().and_then(Value::as_str);
        if provider != Some(Provider::LocalProxy.as_str()) {
            return Err(RelayError::validation("provider must be local_proxy"));
        }
        let model = match self.model {
            Some(Value::String(model)) if !model.is_empty() => model,
            _ => return Err(RelayError::validation("missing model")),
        };

        Ok(GenerationRequest {
            provider: Provider::LocalProxy,
            model,
            messages: self.messages.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");

        assert_eq!(ChatMessage::assistant("Hi").role, Role::Assistant);
        assert_eq!(ChatMessage::system("Be brief").role, Role::System);
    }

    #[test]
    fn test_role_deserialization() {
        let msgs: Vec<ChatMessage> = serde_json::from_str(
            r#"[
                {"role": "system", "content": "s"},
                {"role": "assistant", "content": "a"},
                {"role": "user", "content": "u"},
                {"role": "tool", "content": "t"}
            ]"#,
        )
        .unwrap();

        let roles: Vec<Role> = msgs.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::Assistant, Role::User, Role::User]
        );
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }

    #[test]
    fn test_missing_or_null_content_is_empty() {
        let msgs: Vec<ChatMessage> =
            serde_json::from_str(r#"[{"role": "user"}, {"content": null}]"#).unwrap();
        assert_eq!(msgs[0].content, "");
        assert_eq!(msgs[1].content, "");
        assert_eq!(msgs[1].role, Role::User);
    }

    #[test]
    fn test_provider_names() {
        assert_eq!(Provider::LocalProxy.to_string(), "local_proxy");
        assert_eq!(
            serde_json::to_string(&Provider::OpenAi).unwrap(),
            r#""openai""#
        );
        let parsed = Provider::from_str("local_proxy", false).unwrap();
        assert_eq!(parsed, Provider::LocalProxy);
        assert!(Provider::from_str("local-proxy", false).is_err());
    }

    #[test]
    fn test_relay_request_empty_body() {
        let req = RelayRequest::from_slice(b"").unwrap();
        assert!(req.provider.is_none());
        assert!(matches!(
            req.validate(),
            Err(RelayError::ValidationError(_))
        ));
    }

    #[test]
    fn test_relay_request_invalid_json() {
        assert!(matches!(
            RelayRequest::from_slice(b"{not json"),
            Err(RelayError::JsonError(_))
        ));
    }

    #[test]
    fn test_validate_wrong_provider() {
        let req = RelayRequest::from_slice(br#"{"provider": "other"}"#).unwrap();
        let err = req.validate().unwrap_err();
        assert_eq!(err.to_string(), "provider must be local_proxy");
    }

    #[test]
    fn test_validate_non_string_provider() {
        for body in [
            r#"{"provider": 1, "model": "m"}"#,
            r#"{"provider": null, "model": "m"}"#,
            r#"{"provider": ["local_proxy"], "model": "m"}"#,
        ] {
            let req = RelayRequest::from_slice(body.as_bytes()).unwrap();
            assert_eq!(
                req.validate().unwrap_err().to_string(),
                "provider must be local_proxy"
            );
        }
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        for body in [r#"["local_proxy", "m"]"#, "42", r#""local_proxy""#] {
            let err = RelayRequest::from_slice(body.as_bytes()).unwrap_err();
            assert!(err.is_client_error());
            assert_eq!(err.to_string(), "request body must be a JSON object");
        }
    }

    #[test]
    fn test_non_string_role_is_user() {
        let msgs: Vec<ChatMessage> = serde_json::from_str(
            r#"[{"role": null, "content": "x"}, {"role": 3, "content": "y"}]"#,
        )
        .unwrap();
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[0].content, "x");
        assert_eq!(msgs[1].role, Role::User);
    }

    #[test]
    fn test_non_string_content_is_text() {
        let msgs: Vec<ChatMessage> = serde_json::from_str(
            r#"[
                {"content": 5},
                {"content": 0},
                {"content": false},
                {"content": true},
                {"content": []},
                {"content": {"a": 1}}
            ]"#,
        )
        .unwrap();
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["5", "", "", "true", "", r#"{"a":1}"#]);
    }

    #[test]
    fn test_validate_missing_model() {
        for body in [
            r#"{"provider": "local_proxy"}"#,
            r#"{"provider": "local_proxy", "model": ""}"#,
            r#"{"provider": "local_proxy", "model": null}"#,
        ] {
            let req = RelayRequest::from_slice(body.as_bytes()).unwrap();
            assert_eq!(req.validate().unwrap_err().to_string(), "missing model");
        }
    }

    #[test]
    fn test_validate_ok_defaults_messages() {
        let req =
            RelayRequest::from_slice(br#"{"provider": "local_proxy", "model": "m"}"#).unwrap();
        let request = req.validate().unwrap();
        assert_eq!(request.provider, Provider::LocalProxy);
        assert_eq!(request.model, "m");
        assert!(request.messages.is_empty());
    }
}
