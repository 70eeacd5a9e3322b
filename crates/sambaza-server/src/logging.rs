use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use rand::RngCore;
use std::time::Instant;

/// Trace ID carried through request extensions and echoed back as the
/// `X-Trace-Id` response header.
///
/// A newtype rather than a bare `String`: handler extractors match on the
/// concrete type, so an unrelated `Extension<String>` can never shadow it.
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl TraceId {
    /// 16 hex chars from 8 random bytes.
    fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        TraceId(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }
}

/// How much request/response body ends up in the log line.
const BODY_SNIPPET_LEN: usize = 200;

/// 请求体最大缓冲（超过即不读取，避免日志路径吃掉大上传）
const MAX_BUFFERED_BODY: usize = 1024 * 1024;

/// Clip a body to [`BODY_SNIPPET_LEN`] bytes, respecting UTF-8
/// boundaries. Binary bodies collapse to a placeholder.
fn snippet(bytes: &[u8]) -> String {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return "<non-utf8 body>".to_string();
    };
    if text.len() <= BODY_SNIPPET_LEN {
        return text.to_string();
    }
    let mut cut = BODY_SNIPPET_LEN;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

fn human_elapsed(us: u128) -> String {
    match us {
        0..=999 => format!("{us}µs"),
        1_000..=999_999 => format!("{}ms", us / 1000),
        _ => format!("{:.1}s", us as f64 / 1_000_000.0),
    }
}

/// Auth and API-key routes carry credentials in their bodies; those are
/// never logged, in either direction.
fn is_sensitive(path: &str) -> bool {
    path.starts_with("/v1/auth/") || path.starts_with("/v1/apikeys")
}

/// Request/response logging middleware: stamps each request with a
/// [`TraceId`], logs both directions with truncated bodies, and echoes
/// the id back in `X-Trace-Id`.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = TraceId::generate();
    req.extensions_mut().insert(trace_id.clone());

    let path = req.uri().path().to_string();
    // Swagger UI assets would drown everything else out
    if path.starts_with("/docs") {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let url = match req.uri().query() {
        Some(q) => format!("{path}?{q}"),
        None => path.clone(),
    };
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let client_id = req
        .headers()
        .get("sbz-client-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let sensitive = is_sensitive(&path);
    let wants_body_log = !sensitive && matches!(method.as_str(), "POST" | "PUT" | "PATCH");

    let (req, request_snippet) = if wants_body_log {
        let (parts, body) = req.into_parts();
        let bytes = axum::body::to_bytes(body, MAX_BUFFERED_BODY)
            .await
            .unwrap_or_default();
        let text = if bytes.is_empty() {
            String::new()
        } else {
            snippet(&bytes)
        };
        (Request::from_parts(parts, Body::from(bytes)), text)
    } else {
        (req, String::new())
    };

    tracing::info!(
        trace_id = %trace_id.0,
        method = %method,
        path = %url,
        client_id = %client_id,
        body = %request_snippet,
        ua = %user_agent,
        "--> request"
    );

    let started = Instant::now();
    let response = next.run(req).await;
    let elapsed = human_elapsed(started.elapsed().as_micros());

    let status = response.status();
    let (parts, body) = response.into_parts();
    let json_response = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let response_snippet = if !sensitive && json_response && !bytes.is_empty() {
        snippet(&bytes)
    } else {
        String::new()
    };

    if status.is_server_error() {
        tracing::error!(
            trace_id = %trace_id.0,
            status = status.as_u16(),
            elapsed = %elapsed,
            body = %response_snippet,
            "<-- response"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            trace_id = %trace_id.0,
            status = status.as_u16(),
            elapsed = %elapsed,
            body = %response_snippet,
            "<-- response"
        );
    } else {
        tracing::info!(
            trace_id = %trace_id.0,
            status = status.as_u16(),
            elapsed = %elapsed,
            body = %response_snippet,
            "<-- response"
        );
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    if let Ok(value) = HeaderValue::from_str(&trace_id.0) {
        response.headers_mut().insert("X-Trace-Id", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_respects_char_boundaries() {
        let long = "号".repeat(200); // 3 bytes per char, 600 bytes total
        let clipped = snippet(long.as_bytes());
        assert!(clipped.ends_with("..."));
        assert!(clipped.len() <= BODY_SNIPPET_LEN + 3);
        assert_eq!(snippet(b"short"), "short");
        assert_eq!(snippet(&[0xff, 0xfe]), "<non-utf8 body>");
    }

    #[test]
    fn elapsed_picks_sensible_units() {
        assert_eq!(human_elapsed(250), "250µs");
        assert_eq!(human_elapsed(2_500), "2ms");
        assert_eq!(human_elapsed(1_500_000), "1.5s");
    }

    #[test]
    fn credential_paths_are_sensitive() {
        assert!(is_sensitive("/v1/auth/login"));
        assert!(is_sensitive("/v1/apikeys"));
        assert!(!is_sensitive("/v1/campaigns"));
    }
}
