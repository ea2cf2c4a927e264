use axum::{
    body::{Body, HttpBody, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::error;

// 错误响应体最多缓冲的字节数
const MAX_LOGGED_BODY: usize = 64 * 1024;

pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    if !response.status().is_server_error() {
        return response;
    }

    // 大小未知或过大时原样返回，只记录状态
    let fits = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= MAX_LOGGED_BODY as u64);
    if !fits {
        error!(%method, %path, status = %response.status(), "Server error occurred (body not logged)");
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(b) => b,
        Err(e) => {
            error!(%method, %path, status = %parts.status, "Failed to read error response body: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };
    let body_str = String::from_utf8_lossy(&bytes);

    error!(
        %method,
        %path,
        status = %parts.status,
        body = %body_str,
        "Server error occurred"
    );

    // 重置body以便重新构建响应
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
