use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::utils::error_codes;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{reason}")]
    RateLimited {
        reason: String,
        retry_after_secs: u64,
    },
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("{context}: {detail}")]
    Transport {
        context: &'static str,
        detail: String,
    },
    #[error("{context}: webhook returned status {status}: {body}")]
    Upstream {
        context: &'static str,
        status: u16,
        body: String,
    },
    #[error("{context}: {source}")]
    DataStore {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl AppError {
    /// Wraps a query failure with the generic message the caller should see.
    pub fn data_store(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
        move |source| AppError::DataStore { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Transport { .. } | AppError::Upstream { .. } | AppError::DataStore { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> i32 {
        match self {
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::Conflict(_) => error_codes::CONFLICT,
            AppError::RateLimited { .. } => error_codes::RATE_LIMIT,
            AppError::MethodNotAllowed => error_codes::METHOD_NOT_ALLOWED,
            AppError::Transport { .. } => error_codes::TRANSPORT_ERROR,
            AppError::Upstream { .. } => error_codes::UPSTREAM_ERROR,
            AppError::DataStore { .. } => error_codes::INTERNAL_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    code: i32,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (error, details, retry_after) = match self {
            AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                (msg, None, None)
            }
            AppError::RateLimited {
                reason,
                retry_after_secs,
            } => (reason, None, Some(retry_after_secs)),
            AppError::MethodNotAllowed => ("Method not allowed".to_string(), None, None),
            AppError::Transport { context, detail } => (context.to_string(), Some(detail), None),
            AppError::Upstream {
                context,
                status,
                body,
            } => (
                context.to_string(),
                Some(format!("webhook returned status {status}: {body}")),
                None,
            ),
            AppError::DataStore { context, source } => {
                (context.to_string(), Some(source.to_string()), None)
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            code,
            error,
            details,
            retry_after,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
