// 邀请转发：限流 -> webhook -> 审计
pub mod audit;
pub mod clock;
pub mod forwarder;
pub mod limiter;
pub mod model;
pub mod service;

pub use audit::{AuditSink, AuditWriter, InviteOutcome, LogAuditWriter, QueuedAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use forwarder::{
    ForwardError, ForwardResult, HttpForwarder, InvitePayload, MAX_BODY_EXCERPT, WebhookForwarder,
};
pub use limiter::{RateDecision, RateLimitPolicy, RateLimiter, Remaining};
pub use model::{DurationDays, InviteRequest, InviteStatus, SendInviteBody};
pub use service::InviteService;
