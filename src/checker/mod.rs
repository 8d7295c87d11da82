//! 连通性检查：对一个提供商发送固定的冒烟测试提示词，并以退出码报告失败类别。

use crate::config::{Credential, GEMINI_DEFAULT_BASE, GEMINI_KEY_ENV};
use crate::diagnostics;
use crate::error::RelayError;
use crate::providers::{
    self, gemini, local_proxy, openai, truncate_chars, ShapePolicy, UpstreamReply,
    UpstreamRequest,
};
use crate::types::{ChatMessage, Provider};
use crate::Result;
use clap::Parser;
use reqwest::Client;

pub const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const LOCAL_PROXY_DEFAULT_BASE: &str = "http://127.0.0.1:8787";

const CHECK_TEMPERATURE: f64 = 0.0;
const TEXT_PREVIEW_CHARS: usize = 800;
const BODY_PREVIEW_CHARS: usize = 2000;

#[derive(Parser, Debug, Clone)]
#[command(name = "keyrelay-check")]
#[command(about = "Send one smoke-test prompt to a provider and report whether it works")]
pub struct CheckArgs {
    /// 要检查的提供商
    #[arg(long, value_enum)]
    pub provider: Provider,

    /// API base URL，留空使用提供商默认值
    #[arg(long, default_value = "")]
    pub base: String,

    /// 模型名，留空使用提供商默认值
    #[arg(long, default_value = "")]
    pub model: String,
}

/// 退出码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Success,
    NetworkFailure,
    MissingInput,
    UpstreamFailure,
    ParseFailure,
}

impl CheckStatus {
    pub fn exit_code(&self) -> u8 {
        match self {
            CheckStatus::Success => 0,
            CheckStatus::NetworkFailure => 1,
            CheckStatus::MissingInput => 2,
            CheckStatus::UpstreamFailure => 3,
            CheckStatus::ParseFailure => 4,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == CheckStatus::Success
    }
}

/// 一次检查的结果。成功时 `message` 写到 stdout，否则写到 stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub message: String,
}

impl CheckOutcome {
    fn new(status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RelayError> for CheckOutcome {
    fn from(e: RelayError) -> Self {
        let status = match &e {
            RelayError::HttpError(_) => CheckStatus::NetworkFailure,
            RelayError::CredentialMissing(_) | RelayError::ValidationError(_) => {
                CheckStatus::MissingInput
            }
            RelayError::UpstreamError { .. } => CheckStatus::UpstreamFailure,
            RelayError::ResponseShape(_) => CheckStatus::ParseFailure,
            _ => CheckStatus::NetworkFailure,
        };
        CheckOutcome::new(status, e.to_string())
    }
}

/// 已解析的检查目标，凭据在此处显式携带
#[derive(Debug, Clone)]
pub struct CheckTarget {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub credential: Option<Credential>,
}

fn credential_env(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::Gemini => Some(GEMINI_KEY_ENV),
        Provider::OpenAi => Some(OPENAI_KEY_ENV),
        Provider::LocalProxy => None,
    }
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

impl CheckTarget {
    /// 根据参数与环境解析目标。`lookup` 用于读取环境变量
    pub fn resolve<F>(args: &CheckArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (default_base, default_model) = match args.provider {
            Provider::Gemini => (GEMINI_DEFAULT_BASE, GEMINI_DEFAULT_MODEL),
            Provider::OpenAi => (OPENAI_DEFAULT_BASE, OPENAI_DEFAULT_MODEL),
            Provider::LocalProxy => (LOCAL_PROXY_DEFAULT_BASE, GEMINI_DEFAULT_MODEL),
        };

        let credential = match credential_env(args.provider) {
            Some(var) => Some(
                lookup(var)
                    .and_then(Credential::new)
                    .ok_or_else(|| RelayError::CredentialMissing(var.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            provider: args.provider,
            base_url: or_default(&args.base, default_base),
            model: or_default(&args.model, default_model),
            credential,
        })
    }

    pub fn from_env(args: &CheckArgs) -> Result<Self> {
        Self::resolve(args, |var| std::env::var(var).ok())
    }

    fn credential(&self) -> Result<&Credential> {
        self.credential.as_ref().ok_or_else(|| {
            let var = credential_env(self.provider).unwrap_or("API key");
            RelayError::CredentialMissing(var.to_string())
        })
    }
}

/// 固定的冒烟测试提示词
pub fn smoke_test_messages(provider: Provider) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("Output exactly one JSON object and nothing else."),
        ChatMessage::user(format!(
            r#"Output: {{"ok":true,"provider":"{}"}}"#,
            provider.as_str()
        )),
    ]
}

/// 执行一次检查，所有失败都转换为对应的 CheckOutcome
pub async fn run_check(client: &Client, target: &CheckTarget) -> CheckOutcome {
    let label = target.provider.label();

    let reply = match send_smoke_test(client, target).await {
        Ok(reply) => reply,
        Err(e) => return e.into(),
    };

    if !reply.is_success() {
        let message = match target.provider {
            // 非 JSON 错误体（例如网关返回的 HTML）只能靠原文诊断
            Provider::Gemini if reply.body.is_null() => format!(
                "{}\n{}",
                diagnostics::classify(reply.status, &reply.body).message,
                reply.preview(BODY_PREVIEW_CHARS)
            ),
            Provider::Gemini => diagnostics::classify(reply.status, &reply.body).message,
            _ => format!(
                "{} HTTP {}:\n{}",
                label,
                reply.status,
                reply.preview(BODY_PREVIEW_CHARS)
            ),
        };
        return CheckOutcome::new(CheckStatus::UpstreamFailure, message);
    }

    match providers::from_upstream_response(target.provider, &reply.body, ShapePolicy::Strict) {
        Ok(text) => CheckOutcome::new(
            CheckStatus::Success,
            format!(
                "OK: {} reachable.\nRaw model text (truncated):\n{}",
                label,
                truncate_chars(&text, TEXT_PREVIEW_CHARS)
            ),
        ),
        Err(e) => {
            let detail = match e {
                RelayError::ResponseShape(detail) => detail,
                other => other.to_string(),
            };
            CheckOutcome::new(
                CheckStatus::ParseFailure,
                format!(
                    "{} response shape invalid ({}):\n{}",
                    label,
                    detail,
                    reply.preview(BODY_PREVIEW_CHARS)
                ),
            )
        }
    }
}

async fn send_smoke_test(client: &Client, target: &CheckTarget) -> Result<UpstreamReply> {
    let messages = smoke_test_messages(target.provider);
    let body = providers::to_upstream_request(
        target.provider,
        &target.model,
        &messages,
        CHECK_TEMPERATURE,
    );

    match &body {
        UpstreamRequest::Gemini(req) => {
            let credential = target.credential()?;
            gemini::generate_content(client, &target.base_url, &target.model, credential, req).await
        }
        UpstreamRequest::OpenAi(req) => {
            openai::chat_completions(client, &target.base_url, target.credential()?, req).await
        }
        UpstreamRequest::LocalProxy(req) => {
            local_proxy::generate(client, &target.base_url, req).await
        }
    }
}
