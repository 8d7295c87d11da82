pub mod gemini;
pub mod local_proxy;
pub mod openai;

use crate::types::{ChatMessage, Provider};
use crate::Result;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// 单次上游调用的超时时间
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// 构建进程内共享的 HTTP 客户端
pub fn build_http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .pool_max_idle_per_host(10)
        .build()?)
}

/// Gemini 响应结构异常时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapePolicy {
    /// 返回空字符串（中继，优先可用性）
    Lenient,
    /// 返回 ResponseShape 错误（检查工具，优先可诊断性）
    Strict,
}

/// 各提供商的上游请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpstreamRequest {
    Gemini(gemini::GeminiRequest),
    OpenAi(openai::OpenAiRequest),
    LocalProxy(local_proxy::LocalProxyRequest),
}

/// 把通用消息列表转换为指定提供商的请求体
pub fn to_upstream_request(
    provider: Provider,
    model: &str,
    messages: &[ChatMessage],
    temperature: f64,
) -> UpstreamRequest {
    match provider {
        Provider::Gemini => UpstreamRequest::Gemini(gemini::convert_request(messages, temperature)),
        Provider::OpenAi => {
            UpstreamRequest::OpenAi(openai::convert_request(model, messages, temperature))
        }
        Provider::LocalProxy => {
            UpstreamRequest::LocalProxy(local_proxy::convert_request(model, messages))
        }
    }
}

/// 从上游响应中提取生成文本
pub fn from_upstream_response(
    provider: Provider,
    body: &Value,
    policy: ShapePolicy,
) -> Result<String> {
    match provider {
        Provider::Gemini => match policy {
            ShapePolicy::Lenient => Ok(gemini::extract_text_lenient(body)),
            ShapePolicy::Strict => gemini::extract_text(body),
        },
        Provider::OpenAi => openai::extract_text(body),
        Provider::LocalProxy => local_proxy::extract_text(body),
    }
}

/// 上游回复：状态码 + 解析后的 JSON + 原始文本
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: u16,
    /// 空响应体为 `{}`，非 JSON 响应体为 `null`
    pub body: Value,
    pub raw: String,
}

impl UpstreamReply {
    pub fn from_text(status: u16, raw: String) -> Self {
        let body = if raw.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&raw).unwrap_or(Value::Null)
        };
        Self { status, body, raw }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 用于诊断输出：优先格式化后的 JSON，否则原始文本
    pub fn preview(&self, limit: usize) -> String {
        let text = if self.body.is_null() {
            self.raw.clone()
        } else {
            serde_json::to_string_pretty(&self.body).unwrap_or_else(|_| self.raw.clone())
        };
        truncate_chars(&text, limit)
    }

    /// 单行形式，用于错误消息
    pub fn compact(&self) -> String {
        if self.body.is_null() {
            self.raw.clone()
        } else {
            self.body.to_string()
        }
    }
}

/// 发送 JSON 请求。非 2xx 不视为错误，由调用方决定如何处理
pub async fn send_json<B>(request: RequestBuilder, body: &B) -> Result<UpstreamReply>
where
    B: Serialize + ?Sized,
{
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await?;

    let status = response.status().as_u16();
    let raw = response.text().await?;
    Ok(UpstreamReply::from_text(status, raw))
}

/// 拼接 base 与路径，去掉 base 末尾的 `/`
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// 按字符（而非字节）截断
pub fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_upstream_request_dispatch() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];

        let body = to_upstream_request(Provider::Gemini, "m", &messages, 0.2);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(value.get("model").is_none());

        let body = to_upstream_request(Provider::OpenAi, "gpt", &messages, 0.0);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt");
        assert_eq!(value["messages"][0]["role"], "system");

        let body = to_upstream_request(Provider::LocalProxy, "m", &messages, 0.0);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["provider"], "local_proxy");
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_from_upstream_response_policies() {
        let broken = json!({"promptFeedback": {}});
        assert_eq!(
            from_upstream_response(Provider::Gemini, &broken, ShapePolicy::Lenient).unwrap(),
            ""
        );
        assert!(from_upstream_response(Provider::Gemini, &broken, ShapePolicy::Strict).is_err());

        // 策略只影响 Gemini
        assert!(from_upstream_response(Provider::OpenAi, &broken, ShapePolicy::Lenient).is_err());
        assert!(
            from_upstream_response(Provider::LocalProxy, &broken, ShapePolicy::Lenient).is_err()
        );
    }

    #[test]
    fn test_reply_from_text() {
        let reply = UpstreamReply::from_text(200, String::new());
        assert_eq!(reply.body, json!({}));
        assert!(reply.is_success());

        let reply = UpstreamReply::from_text(502, "<html>bad gateway</html>".to_string());
        assert!(reply.body.is_null());
        assert!(!reply.is_success());
        assert_eq!(reply.compact(), "<html>bad gateway</html>");
        assert_eq!(reply.preview(5), "<html");

        let reply = UpstreamReply::from_text(429, r#"{"error": {"code": 429}}"#.to_string());
        assert_eq!(reply.compact(), r#"{"error":{"code":429}}"#);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://a/v1/", "/generate"), "http://a/v1/generate");
        assert_eq!(join_url("http://a/v1", "chat/completions"), "http://a/v1/chat/completions");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 800), "ab");
    }
}
