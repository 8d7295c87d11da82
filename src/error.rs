use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP server error: {0}")]
    HyperError(#[from] hyper::Error),

    /// 传输层失败（DNS / 连接 / 超时）
    #[error("Network error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// 请求字段缺失或非法，不会发起任何网络调用
    #[error("{0}")]
    ValidationError(String),

    #[error("Missing {0} env var")]
    CredentialMissing(String),

    #[error("{provider} HTTP {status}: {body}")]
    UpstreamError {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// 上游 2xx 但缺少预期字段
    #[error("response shape invalid: {0}")]
    ResponseShape(String),
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RelayError::ValidationError(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        RelayError::ResponseShape(msg.into())
    }

    pub fn upstream(provider: &'static str, status: u16, body: impl Into<String>) -> Self {
        RelayError::UpstreamError {
            provider,
            status,
            body: body.into(),
        }
    }

    /// 是否属于调用方输入错误（对应 HTTP 400）
    pub fn is_client_error(&self) -> bool {
        matches!(self, RelayError::ValidationError(_))
    }
}
