use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::{AppState, error::AppError};

use super::model::SmsAnalytics;

#[axum::debug_handler]
pub async fn sms_analytics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    const FAILED: &str = "Failed to fetch SMS analytics";

    let mut conn = state.pool.acquire().await.map_err(AppError::data_store(FAILED))?;
    let analytics = SmsAnalytics::load(&mut conn)
        .await
        .map_err(AppError::data_store(FAILED))?;

    Ok(Json(json!({
        "success": true,
        "data": analytics,
    })))
}
