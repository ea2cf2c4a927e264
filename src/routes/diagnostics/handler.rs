use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::{AppState, error::AppError};

/// Checks connectivity by counting health tips. Never reports credentials.
#[axum::debug_handler]
pub async fn test_db(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    const FAILED: &str = "Database connection failed";

    let mut conn = state.pool.acquire().await.map_err(AppError::data_store(FAILED))?;
    let tip_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sms_health_tips")
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::data_store(FAILED))?;

    let db = &state.config.database;
    Ok(Json(json!({
        "success": true,
        "message": "Database connection successful",
        "tipCount": tip_count,
        "dbInfo": {
            "host": db.host,
            "port": db.port,
            "database": db.database,
        },
    })))
}
