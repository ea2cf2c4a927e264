use axum::{Json, extract::State, response::IntoResponse};
use axum_extra::extract::WithRejection;
use serde_json::json;

use crate::{AppState, error::AppError, utils::parse_id};

use super::model::{AbTest, CompleteAbTestRequest, CreateAbTestRequest, NewAbTest, ensure_active};

#[axum::debug_handler]
pub async fn list_tests(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    const FAILED: &str = "Failed to fetch A/B tests";

    let mut conn = state.pool.acquire().await.map_err(AppError::data_store(FAILED))?;
    let tests = AbTest::list_with_stats(&mut conn)
        .await
        .map_err(AppError::data_store(FAILED))?;

    Ok(Json(json!({
        "success": true,
        "data": tests,
    })))
}

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<CreateAbTestRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    const FAILED: &str = "Failed to create A/B test";

    // 先校验再取连接
    let new = NewAbTest::try_from(req)?;

    let mut conn = state.pool.acquire().await.map_err(AppError::data_store(FAILED))?;
    let test = AbTest::create(&mut conn, new)
        .await
        .map_err(AppError::data_store(FAILED))?;

    tracing::info!(test_id = test.id, test_name = %test.test_name, "A/B test created");
    Ok(Json(json!({
        "success": true,
        "data": test,
    })))
}

#[axum::debug_handler]
pub async fn complete_test(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<CompleteAbTestRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    const FAILED: &str = "Failed to complete A/B test";

    let test_id = match req.test_id.as_ref().filter(|v| !v.is_null()) {
        None => return Err(AppError::Validation("Missing test_id".to_string())),
        Some(value) => parse_id(value)
            .ok_or_else(|| AppError::Validation("Invalid test_id".to_string()))?,
    };

    let mut conn = state.pool.acquire().await.map_err(AppError::data_store(FAILED))?;
    let status = AbTest::find_status(&mut conn, test_id)
        .await
        .map_err(AppError::data_store(FAILED))?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;
    ensure_active(&status)?;

    // 并发完成时由 WHERE status = 'active' 兜底
    let updated = AbTest::complete(&mut conn, test_id)
        .await
        .map_err(AppError::data_store(FAILED))?;
    if updated == 0 {
        return Err(AppError::Conflict("Test is not active".to_string()));
    }

    tracing::info!(test_id, "A/B test completed");
    Ok(Json(json!({
        "success": true,
        "message": "Test completed successfully",
    })))
}
