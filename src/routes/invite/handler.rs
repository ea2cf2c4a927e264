use axum::{Json, extract::State, response::IntoResponse};
use axum_extra::extract::WithRejection;
use serde::Serialize;
use serde_json::json;

use crate::{
    AppState,
    error::AppError,
    invite::{InviteRequest, Remaining, SendInviteBody},
    utils::ClientIdentity,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendInviteResponse {
    pub success: bool,
    pub message: &'static str,
    pub rate_limit: Remaining,
}

#[axum::debug_handler]
pub async fn send_invite(
    State(state): State<AppState>,
    ClientIdentity(identity): ClientIdentity,
    WithRejection(Json(body), _): WithRejection<Json<SendInviteBody>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    // 校验失败不消耗配额
    let request = InviteRequest::try_from(body)?;
    let remaining = state.invites.send(request, &identity).await?;

    Ok(Json(SendInviteResponse {
        success: true,
        message: "Beta invite sent successfully",
        rate_limit: remaining,
    }))
}

/// Invite history is not persisted yet; clients keep their own copy.
pub async fn history() -> impl IntoResponse {
    let invites: Vec<serde_json::Value> = Vec::new();
    Json(json!({
        "success": true,
        "total": invites.len(),
        "invites": invites,
    }))
}
