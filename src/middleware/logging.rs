use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;

const MAX_LOGGED_BODY: usize = 2000;

/// Paths whose bodies carry card tokens, payer documents or provider payloads
const REDACTED_PREFIXES: &[&str] = &["/api/v1/payments", "/webhooks"];

/// Middleware that logs request and response bodies
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    // Reuse the caller's request id when one was sent
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = request.method().clone();
    let uri = request.uri().clone();
    let redact = should_redact(uri.path());
    let start = Instant::now();

    // Extract and log request body
    let (parts, body) = request.into_parts();

    // Read the request body (limit to 1MB to prevent memory issues)
    let bytes = match to_bytes(body, 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read request body: {}", e);
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    // Log request with body (redacted on payment paths, truncated if too long)
    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        body = %loggable_body(&bytes, redact),
        "→ Request"
    );

    // Reconstruct the request with the body
    let request = Request::from_parts(parts, Body::from(bytes));

    // Call the next middleware/handler
    let response = next.run(request).await;

    // Extract response status before consuming body
    let status = response.status();
    let (parts, body) = response.into_parts();

    // Read the response body (limit to 1MB)
    let bytes = match to_bytes(body, 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read response body: {}", e);
            Bytes::new()
        }
    };

    // Log response with body
    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %start.elapsed().as_millis(),
        body = %loggable_body(&bytes, redact),
        "← Response"
    );

    // Reconstruct the response with the body
    Response::from_parts(parts, Body::from(bytes))
}

fn should_redact(path: &str) -> bool {
    REDACTED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn loggable_body(bytes: &Bytes, redact: bool) -> String {
    if redact {
        format!("[redacted, {} bytes]", bytes.len())
    } else {
        truncate_body(&String::from_utf8_lossy(bytes), MAX_LOGGED_BODY)
    }
}

/// Truncate body for logging, adding ellipsis if truncated
fn truncate_body(body: &str, max_len: usize) -> String {
    let body = body.trim();
    if body.len() <= max_len {
        return body.to_string();
    }
    // Slicing mid-character panics
    let mut cut = max_len;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...[truncated, {} bytes total]", &body[..cut], body.len())
}
