use crate::config::Credential;
use crate::error::RelayError;
use crate::providers::{join_url, send_json, UpstreamReply};
use crate::types::ChatMessage;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// OpenAI 兼容的 chat/completions 请求，消息原样透传
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub temperature: f64,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub fn convert_request(model: &str, messages: &[ChatMessage], temperature: f64) -> OpenAiRequest {
    OpenAiRequest {
        model: model.to_string(),
        temperature,
        messages: messages.to_vec(),
    }
}

/// 读取 `choices[0].message.content`
pub fn extract_text(body: &Value) -> Result<String> {
    let resp: OpenAiResponse = serde_json::from_value(body.clone())
        .map_err(|e| RelayError::shape(format!("malformed OpenAI response: {}", e)))?;

    resp.choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| RelayError::shape("OpenAI response has no choices[0].message.content"))
}

/// 调用 `{base}/chat/completions`
pub async fn chat_completions(
    client: &Client,
    base_url: &str,
    credential: &Credential,
    body: &OpenAiRequest,
) -> Result<UpstreamReply> {
    let url = join_url(base_url, "chat/completions");
    tracing::debug!(%url, model = %body.model, "calling OpenAI-compatible endpoint");

    let request = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", credential.expose()));
    send_json(request, body).await
}
