use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::model::InviteRequest;

/// Wire shape sent to the webhook receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvitePayload {
    pub email: String,
    pub duration: String,
}

impl From<&InviteRequest> for InvitePayload {
    fn from(request: &InviteRequest) -> Self {
        Self {
            email: request.recipient_email.clone(),
            duration: request.duration_days.to_string(),
        }
    }
}

/// Upper bound on how much of a webhook response is kept for diagnostics.
pub const MAX_BODY_EXCERPT: usize = 2 * 1024;

/// Raw response of a completed exchange, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResult {
    pub status_code: u16,
    pub body: String,
}

impl ForwardResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Leading part of the body, cut on a char boundary.
    pub fn body_excerpt(&self) -> &str {
        if self.body.len() <= MAX_BODY_EXCERPT {
            return &self.body;
        }
        let mut end = MAX_BODY_EXCERPT;
        while !self.body.is_char_boundary(end) {
            end -= 1;
        }
        &self.body[..end]
    }
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("webhook request could not be completed: {0}")]
    Network(#[from] reqwest::Error),
}

#[async_trait]
pub trait WebhookForwarder: Send + Sync {
    /// Makes exactly one attempt; non-2xx responses are returned, not raised.
    async fn forward(&self, payload: &InvitePayload) -> Result<ForwardResult, ForwardError>;
}

#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    url: String,
}

impl HttpForwarder {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ForwardError> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WebhookForwarder for HttpForwarder {
    async fn forward(&self, payload: &InvitePayload) -> Result<ForwardResult, ForwardError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status_code = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!(status_code, "webhook responded");
        Ok(ForwardResult { status_code, body })
    }
}
