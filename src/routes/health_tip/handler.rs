use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde_json::{Value, json};

use crate::{AppState, error::AppError};

use super::model::{
    CreateTipRequest, DeleteTipQuery, HealthTip, NewTip, TipListResponse, UpdateTipRequest,
    require_id,
};

const FAILED: &str = "Failed to manage health tips";

#[axum::debug_handler]
pub async fn list_tips(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.pool.acquire().await.map_err(AppError::data_store(FAILED))?;
    let tips = HealthTip::list(&mut conn)
        .await
        .map_err(AppError::data_store(FAILED))?;
    let category_stats = HealthTip::category_stats(&mut conn)
        .await
        .map_err(AppError::data_store(FAILED))?;

    Ok(Json(TipListResponse {
        success: true,
        total: tips.len(),
        tips,
        category_stats,
    }))
}

#[axum::debug_handler]
pub async fn create_tip(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<CreateTipRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    let tip = NewTip::try_from(req)?;

    let mut conn = state.pool.acquire().await.map_err(AppError::data_store(FAILED))?;
    let tip_id = HealthTip::insert(&mut conn, tip)
        .await
        .map_err(AppError::data_store(FAILED))?;

    tracing::info!(tip_id, "health tip created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Health tip created successfully",
            "tipId": tip_id,
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_tip(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateTipRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    let id = require_id(req.id.as_ref())?;

    let mut conn = state.pool.acquire().await.map_err(AppError::data_store(FAILED))?;
    let updated = HealthTip::update(&mut conn, id, req)
        .await
        .map_err(AppError::data_store(FAILED))?;
    if updated == 0 {
        return Err(AppError::NotFound("Health tip not found".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Health tip updated successfully",
    })))
}

#[axum::debug_handler]
pub async fn delete_tip(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<DeleteTipQuery>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    let id = require_id(query.id.map(Value::String).as_ref())?;

    let mut conn = state.pool.acquire().await.map_err(AppError::data_store(FAILED))?;
    let deleted = HealthTip::delete(&mut conn, id)
        .await
        .map_err(AppError::data_store(FAILED))?;
    if deleted == 0 {
        return Err(AppError::NotFound("Health tip not found".to_string()));
    }

    tracing::info!(tip_id = id, "health tip deleted");
    Ok(Json(json!({
        "success": true,
        "message": "Health tip deleted successfully",
    })))
}
