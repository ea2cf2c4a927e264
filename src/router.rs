use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, error::AppError, middleware::log_errors, routes};

// A/B 测试相关的路由
pub fn ab_test_routes() -> Router<AppState> {
    Router::new()
        .route("/ab-tests", get(routes::ab_test::list_tests))
        .route("/ab-tests/create", post(routes::ab_test::create_test))
        .route("/ab-tests/complete", post(routes::ab_test::complete_test))
}

// 健康提示相关的路由
pub fn health_tip_routes() -> Router<AppState> {
    Router::new().route(
        "/health-tips",
        get(routes::health_tip::list_tips)
            .post(routes::health_tip::create_tip)
            .put(routes::health_tip::update_tip)
            .delete(routes::health_tip::delete_tip),
    )
}

// 邀请相关的路由
pub fn invite_routes() -> Router<AppState> {
    Router::new()
        .route("/send-invite", post(routes::invite::send_invite))
        .route("/history", get(routes::invite::history))
}

pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/sms-analytics", get(routes::analytics::sms_analytics))
        .route("/test-db", get(routes::diagnostics::test_db))
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

// 创建主路由，API_BASE_URI 非空时挂在前缀下
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(ab_test_routes())
        .merge(health_tip_routes())
        .merge(invite_routes())
        .merge(analytics_routes())
        .method_not_allowed_fallback(method_not_allowed);

    let base = state.config.api_base_uri.clone();
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(&base, api)
    };

    router
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}
