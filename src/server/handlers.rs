use crate::error::RelayError;
use crate::providers::{self, gemini, ShapePolicy};
use crate::server::AppState;
use crate::types::{GenerationResult, Provider, RelayRequest};
use crate::Result;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

/// 处理 HTTP 请求。永远返回响应，不向连接层传播错误
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return Ok(error_response(&RelayError::from(e))),
    };

    Ok(dispatch(&method, &path, body, &state).await)
}

/// 路由
pub async fn dispatch(
    method: &Method,
    path: &str,
    body: Bytes,
    state: &AppState,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::OPTIONS, _) => preflight(),
        (&Method::POST, "/generate") => match generate(&body, state).await {
            Ok(result) => json_response(StatusCode::OK, &json!(result)),
            Err(e) => {
                debug!("generate failed: {}", e);
                error_response(&e)
            }
        },
        _ => not_found(),
    }
}

/// `POST /generate`：校验 → 读取凭据 → 调用 Gemini → 宽松提取文本
async fn generate(body: &[u8], state: &AppState) -> Result<GenerationResult> {
    let request = RelayRequest::from_slice(body)?.validate()?;

    let upstream = &state.config.upstream;
    let credential = state
        .credential
        .as_ref()
        .ok_or_else(|| RelayError::CredentialMissing(upstream.api_key_env.clone()))?;

    let gemini_req = gemini::convert_request(&request.messages, upstream.temperature);
    let reply = gemini::generate_content(
        &state.client,
        &upstream.base_url,
        &request.model,
        credential,
        &gemini_req,
    )
    .await?;

    if !reply.is_success() {
        return Err(RelayError::upstream(
            Provider::Gemini.label(),
            reply.status,
            reply.compact(),
        ));
    }

    let content =
        providers::from_upstream_response(Provider::Gemini, &reply.body, ShapePolicy::Lenient)?;
    Ok(GenerationResult { content })
}

fn with_cors<B>(mut response: Response<B>) -> Response<B> {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    with_cors(response)
}

/// 校验错误为 400，其余一律 500
fn error_response(e: &RelayError) -> Response<Full<Bytes>> {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    json_response(status, &json!({"error": {"message": e.to_string()}}))
}

/// CORS 预检
fn preflight() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    with_cors(response)
}

fn not_found() -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, &json!({"error": {"message": "Not found"}}))
}
