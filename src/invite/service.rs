use std::sync::Arc;

use tracing::{error, info, warn};

use super::audit::{AuditSink, InviteOutcome};
use super::forwarder::{InvitePayload, WebhookForwarder};
use super::limiter::{RateDecision, RateLimiter, Remaining};
use super::model::{InviteRequest, InviteStatus};
use crate::error::AppError;

const SEND_FAILED: &str = "Failed to send invite";

/// Rate-checks, forwards and audits one invite.
#[derive(Clone)]
pub struct InviteService {
    limiter: Arc<RateLimiter>,
    forwarder: Arc<dyn WebhookForwarder>,
    audit: Arc<dyn AuditSink>,
}

impl InviteService {
    pub fn new(
        limiter: Arc<RateLimiter>,
        forwarder: Arc<dyn WebhookForwarder>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            limiter,
            forwarder,
            audit,
        }
    }

    /// Returns the quota left after this admission.
    pub async fn send(&self, request: InviteRequest, identity: &str) -> Result<Remaining, AppError> {
        let decision = self.limiter.check(identity);
        let remaining = match &decision {
            RateDecision::Allowed { remaining } => *remaining,
            RateDecision::Limited {
                retry_after_secs, ..
            } => {
                let retry_after_secs = *retry_after_secs;
                warn!(%identity, retry_after_secs, "invite rate limited");
                return Err(AppError::RateLimited {
                    reason: decision.to_string(),
                    retry_after_secs,
                });
            }
        };

        let payload = InvitePayload::from(&request);
        let result = self.forwarder.forward(&payload).await;

        let (status, outcome) = match result {
            Ok(response) if response.is_success() => (InviteStatus::Sent, Ok(remaining)),
            Ok(response) => {
                error!(
                    status_code = response.status_code,
                    body = %response.body_excerpt(),
                    "invite webhook rejected the request"
                );
                (
                    InviteStatus::Failed,
                    Err(AppError::Upstream {
                        context: SEND_FAILED,
                        status: response.status_code,
                        body: response.body_excerpt().to_string(),
                    }),
                )
            }
            Err(e) => {
                error!(error = %e, "invite webhook unreachable");
                (
                    InviteStatus::Error,
                    Err(AppError::Transport {
                        context: SEND_FAILED,
                        detail: e.to_string(),
                    }),
                )
            }
        };

        self.audit.record(InviteOutcome::new(
            request.recipient_email,
            request.duration_days,
            status,
            identity,
        ));

        if status == InviteStatus::Sent {
            info!(%identity, hourly = remaining.hourly, daily = remaining.daily, "invite sent");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::invite::clock::ManualClock;
    use crate::invite::forwarder::{ForwardError, ForwardResult};
    use crate::invite::limiter::RateLimitPolicy;
    use crate::invite::model::DurationDays;

    enum Reply {
        Status(u16),
        Unreachable,
    }

    struct StubForwarder {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl StubForwarder {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WebhookForwarder for StubForwarder {
        async fn forward(&self, _payload: &InvitePayload) -> Result<ForwardResult, ForwardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Status(status_code) => Ok(ForwardResult {
                    status_code,
                    body: format!("stub {status_code}"),
                }),
                Reply::Unreachable => {
                    // port 1 on localhost is never listening in test environments
                    let err = reqwest::Client::new()
                        .get("http://127.0.0.1:1/")
                        .send()
                        .await
                        .unwrap_err();
                    Err(ForwardError::Network(err))
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        outcomes: Mutex<Vec<InviteOutcome>>,
    }

    impl AuditSink for RecordingSink {
        fn record(&self, outcome: InviteOutcome) {
            self.outcomes.lock().unwrap().push(outcome);
        }
    }

    fn service(reply: Reply) -> (InviteService, Arc<StubForwarder>, Arc<RecordingSink>) {
        let limiter = Arc::new(RateLimiter::with_clock(
            RateLimitPolicy::default(),
            Arc::new(ManualClock::default()),
        ));
        let forwarder = Arc::new(StubForwarder::new(reply));
        let sink = Arc::new(RecordingSink::default());
        (
            InviteService::new(limiter, forwarder.clone(), sink.clone()),
            forwarder,
            sink,
        )
    }

    fn request() -> InviteRequest {
        InviteRequest {
            recipient_email: "a@b.com".into(),
            duration_days: DurationDays::Month,
        }
    }

    #[tokio::test]
    async fn success_is_audited_as_sent() {
        let (service, _, sink) = service(Reply::Status(204));
        let remaining = service.send(request(), "10.0.0.1").await.unwrap();
        assert_eq!(remaining, Remaining { hourly: 9, daily: 49 });

        let outcomes = sink.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, InviteStatus::Sent);
        assert_eq!(outcomes[0].origin_identity, "10.0.0.1");
        assert_eq!(outcomes[0].duration_days, DurationDays::Month);
    }

    #[tokio::test]
    async fn non_2xx_is_audited_as_failed() {
        let (service, _, sink) = service(Reply::Status(500));
        let err = service.send(request(), "10.0.0.1").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { status: 500, .. }));
        assert_eq!(sink.outcomes.lock().unwrap()[0].status, InviteStatus::Failed);
    }

    #[tokio::test]
    async fn transport_failure_is_audited_as_error() {
        let (service, _, sink) = service(Reply::Unreachable);
        let err = service.send(request(), "10.0.0.1").await.unwrap_err();
        assert!(matches!(err, AppError::Transport { .. }));
        assert_eq!(sink.outcomes.lock().unwrap()[0].status, InviteStatus::Error);
    }

    #[tokio::test]
    async fn throttled_requests_neither_forward_nor_audit() {
        let (service, forwarder, sink) = service(Reply::Status(200));
        for _ in 0..10 {
            service.send(request(), "10.0.0.1").await.unwrap();
        }

        let err = service.send(request(), "10.0.0.1").await.unwrap_err();
        match err {
            AppError::RateLimited {
                reason,
                retry_after_secs,
            } => {
                assert_eq!(reason, "Hourly limit exceeded (10 invites per hour)");
                assert_eq!(retry_after_secs, 3600);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 10);
        assert_eq!(sink.outcomes.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn failed_forwards_still_consume_quota() {
        let (service, _, _) = service(Reply::Status(503));
        for _ in 0..10 {
            assert!(service.send(request(), "10.0.0.1").await.is_err());
        }
        assert!(matches!(
            service.send(request(), "10.0.0.1").await,
            Err(AppError::RateLimited { .. })
        ));
    }
}
