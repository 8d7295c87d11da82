use crate::config::Credential;
use crate::error::RelayError;
use crate::providers::{join_url, send_json, UpstreamReply};
use crate::types::{ChatMessage, Role};
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gemini generateContent 请求格式
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiContent {
    pub role: &'static str,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub temperature: f64,
}

/// Gemini 响应格式，所有层级都可能缺失
#[derive(Debug, Default, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Option<Vec<PartResponse>>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    #[serde(default)]
    text: Option<String>,
}

fn map_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        _ => "user",
    }
}

/// 转换通用消息为 Gemini 格式。
///
/// 多条 system 消息时最后一条生效；生效文本为空则不发送 systemInstruction。
pub fn convert_request(messages: &[ChatMessage], temperature: f64) -> GeminiRequest {
    let mut contents = Vec::with_capacity(messages.len());
    let mut system = None;

    for msg in messages {
        if msg.role == Role::System {
            system = Some(msg.content.clone());
        } else {
            contents.push(GeminiContent {
                role: map_role(msg.role),
                parts: vec![GeminiPart {
                    text: msg.content.clone(),
                }],
            });
        }
    }

    let system_instruction = system
        .filter(|text| !text.is_empty())
        .map(|text| SystemInstruction {
            parts: vec![GeminiPart { text }],
        });

    GeminiRequest {
        contents,
        generation_config: GenerationConfig { temperature },
        system_instruction,
    }
}

/// 提取 `candidates[0].content.parts` 中所有 text 的拼接
pub fn extract_text(body: &Value) -> Result<String> {
    let resp: GeminiResponse = serde_json::from_value(body.clone())
        .map_err(|e| RelayError::shape(format!("malformed Gemini response: {}", e)))?;

    let candidate = resp
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| RelayError::shape("Gemini response has no candidates"))?;

    let parts = candidate
        .content
        .and_then(|c| c.parts)
        .ok_or_else(|| RelayError::shape("Gemini candidate has no content.parts"))?;

    Ok(parts
        .into_iter()
        .map(|part| part.text.unwrap_or_default())
        .collect())
}

/// 结构异常时返回空字符串
pub fn extract_text_lenient(body: &Value) -> String {
    extract_text(body).unwrap_or_default()
}

/// 调用 generateContent，凭据通过请求头传递，不出现在 URL 中
pub async fn generate_content(
    client: &Client,
    base_url: &str,
    model: &str,
    credential: &Credential,
    body: &GeminiRequest,
) -> Result<UpstreamReply> {
    let url = join_url(base_url, &format!("models/{}:generateContent", model));
    tracing::debug!(%url, "calling Gemini generateContent");

    let request = client
        .post(&url)
        .header("x-goog-api-key", credential.expose());
    send_json(request, body).await
}
