use crate::error::RelayError;
use crate::providers::{join_url, send_json, UpstreamReply};
use crate::types::{ChatMessage, GenerationResult, Provider};
use crate::Result;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

/// 发往本地中继 `/generate` 的请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalProxyRequest {
    pub provider: Provider,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

pub fn convert_request(model: &str, messages: &[ChatMessage]) -> LocalProxyRequest {
    LocalProxyRequest {
        provider: Provider::LocalProxy,
        model: model.to_string(),
        messages: messages.to_vec(),
    }
}

/// 读取顶层 `content` 字符串
pub fn extract_text(body: &Value) -> Result<String> {
    serde_json::from_value::<GenerationResult>(body.clone())
        .map(|result| result.content)
        .map_err(|_| RelayError::shape("relay response has no string `content` field"))
}

pub async fn generate(
    client: &Client,
    base_url: &str,
    body: &LocalProxyRequest,
) -> Result<UpstreamReply> {
    let url = join_url(base_url, "generate");
    tracing::debug!(%url, model = %body.model, "calling local relay");

    send_json(client.post(&url), body).await
}
