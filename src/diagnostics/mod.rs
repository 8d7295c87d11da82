//! Gemini 上游错误分类。
//!
//! 纯函数，无副作用：给定 HTTP 状态码与错误响应体，返回诊断类别和可读的处理建议。

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCategory {
    /// Key 被上游判定为已泄露，永久失效
    LeakedKey,
    PermissionDenied,
    RateLimited,
    GenericUpstreamError,
}

/// 错误体中 `error.message` / `error.code` / `error.status`，缺失时为空字符串
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamErrorDetail {
    pub message: String,
    pub code: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<RawErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct RawErrorDetail {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
}

fn scalar_text(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

impl UpstreamErrorDetail {
    pub fn from_body(body: &Value) -> Self {
        let raw = serde_json::from_value::<ErrorEnvelope>(body.clone())
            .ok()
            .and_then(|envelope| envelope.error);

        match raw {
            Some(raw) => Self {
                message: scalar_text(raw.message),
                code: scalar_text(raw.code),
                status: scalar_text(raw.status),
            },
            None => Self::default(),
        }
    }
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub http_status: u16,
    pub category: DiagnosticCategory,
    pub detail: UpstreamErrorDetail,
    /// 面向用户的多行说明
    pub message: String,
}

/// 按顺序匹配，先命中者生效
pub fn classify(http_status: u16, body: &Value) -> ErrorReport {
    let detail = UpstreamErrorDetail::from_body(body);

    let category = if detail.message.to_lowercase().contains("reported as leaked") {
        DiagnosticCategory::LeakedKey
    } else if http_status == 403 || detail.status == "PERMISSION_DENIED" {
        DiagnosticCategory::PermissionDenied
    } else if http_status == 429 || detail.status == "RESOURCE_EXHAUSTED" {
        DiagnosticCategory::RateLimited
    } else {
        DiagnosticCategory::GenericUpstreamError
    };

    let message = render(http_status, category, &detail);
    ErrorReport {
        http_status,
        category,
        detail,
        message,
    }
}

fn render(http_status: u16, category: DiagnosticCategory, d: &UpstreamErrorDetail) -> String {
    let fields = format!("message={}\ncode={}\nstatus={}", d.message, d.code, d.status);
    match category {
        DiagnosticCategory::LeakedKey => "Gemini rejected the key: it was reported as leaked.\n\
             The key is permanently blocked upstream and must be replaced with a new one; \
             retrying will not help."
            .to_string(),
        DiagnosticCategory::PermissionDenied => format!(
            "Gemini permission denied (403 / PERMISSION_DENIED).\n\
             Common causes: the key is invalid or disabled; the key is restricted by origin \
             and rejects callers with a null origin (file:// pages); the Generative Language \
             API is not enabled for the project; the project has no access to this model.\n{}",
            fields
        ),
        DiagnosticCategory::RateLimited => format!(
            "Gemini rate limited or quota exhausted (429 / RESOURCE_EXHAUSTED).\n\
             Retry later with backoff, or check the project's quota.\n{}",
            fields
        ),
        DiagnosticCategory::GenericUpstreamError => format!(
            "Gemini HTTP {}: {} (code={}, status={})",
            http_status, d.message, d.code, d.status
        ),
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
