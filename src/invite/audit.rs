//! Best-effort audit trail for invite forward attempts.
//!
//! `record` never blocks and never fails from the caller's point of view:
//! outcomes go into a bounded queue and a background task hands them to an
//! [`AuditWriter`]. A full or closed queue drops the outcome with a warning.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{DurationDays, InviteStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteOutcome {
    pub id: Uuid,
    pub recipient_email: String,
    pub duration_days: DurationDays,
    pub status: InviteStatus,
    pub timestamp: DateTime<Utc>,
    pub origin_identity: String,
}

impl InviteOutcome {
    pub fn new(
        recipient_email: impl Into<String>,
        duration_days: DurationDays,
        status: InviteStatus,
        origin_identity: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_email: recipient_email.into(),
            duration_days,
            status,
            timestamp: Utc::now(),
            origin_identity: origin_identity.into(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, outcome: InviteOutcome);
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit write failed: {0}")]
    Write(String),
}

#[async_trait]
pub trait AuditWriter: Send + 'static {
    async fn write(&mut self, outcome: &InviteOutcome) -> Result<(), AuditError>;
}

/// Emits one structured log event per outcome.
#[derive(Debug, Default)]
pub struct LogAuditWriter;

#[async_trait]
impl AuditWriter for LogAuditWriter {
    async fn write(&mut self, outcome: &InviteOutcome) -> Result<(), AuditError> {
        info!(
            target: "invite_audit",
            id = %outcome.id,
            email = %outcome.recipient_email,
            duration = %outcome.duration_days,
            status = %outcome.status,
            timestamp = %outcome.timestamp.to_rfc3339(),
            origin = %outcome.origin_identity,
            "invite recorded"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QueuedAuditSink {
    tx: mpsc::Sender<InviteOutcome>,
}

impl QueuedAuditSink {
    /// Starts the drain task. It exits once every sink clone has been dropped
    /// and the queue is empty.
    pub fn spawn<W: AuditWriter>(mut writer: W, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<InviteOutcome>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                if let Err(e) = writer.write(&outcome).await {
                    warn!(id = %outcome.id, status = %outcome.status, error = %e, "dropping invite audit record");
                }
            }
        });
        (Self { tx }, handle)
    }
}

impl AuditSink for QueuedAuditSink {
    fn record(&self, outcome: InviteOutcome) {
        match self.tx.try_send(outcome) {
            Ok(()) => {}
            Err(TrySendError::Full(outcome)) => {
                warn!(id = %outcome.id, status = %outcome.status, "audit queue full, dropping record");
            }
            Err(TrySendError::Closed(outcome)) => {
                warn!(id = %outcome.id, status = %outcome.status, "audit queue closed, dropping record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::sync::Notify;

    use super::*;

    #[derive(Clone, Default)]
    struct MemoryWriter {
        written: Arc<Mutex<Vec<InviteOutcome>>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl AuditWriter for MemoryWriter {
        async fn write(&mut self, outcome: &InviteOutcome) -> Result<(), AuditError> {
            if self.fail_for.as_deref() == Some(outcome.recipient_email.as_str()) {
                return Err(AuditError::Write("disk full".into()));
            }
            self.written.lock().unwrap().push(outcome.clone());
            Ok(())
        }
    }

    /// Blocks on the first write until released.
    struct GatedWriter {
        gate: Arc<Notify>,
        written: Arc<Mutex<Vec<InviteOutcome>>>,
    }

    #[async_trait]
    impl AuditWriter for GatedWriter {
        async fn write(&mut self, outcome: &InviteOutcome) -> Result<(), AuditError> {
            self.gate.notified().await;
            self.written.lock().unwrap().push(outcome.clone());
            Ok(())
        }
    }

    fn outcome(email: &str, status: InviteStatus) -> InviteOutcome {
        InviteOutcome::new(email, DurationDays::Month, status, "203.0.113.7")
    }

    #[tokio::test]
    async fn drains_in_order_and_survives_writer_errors() {
        let writer = MemoryWriter {
            fail_for: Some("broken@b.com".into()),
            ..Default::default()
        };
        let written = writer.written.clone();
        let (sink, handle) = QueuedAuditSink::spawn(writer, 8);

        sink.record(outcome("one@b.com", InviteStatus::Sent));
        sink.record(outcome("broken@b.com", InviteStatus::Failed));
        sink.record(outcome("two@b.com", InviteStatus::Error));
        drop(sink);
        handle.await.unwrap();

        let written = written.lock().unwrap();
        let emails: Vec<_> = written.iter().map(|o| o.recipient_email.as_str()).collect();
        assert_eq!(emails, ["one@b.com", "two@b.com"]);
        assert_eq!(written[1].status, InviteStatus::Error);
        assert_eq!(written[1].origin_identity, "203.0.113.7");
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let gate = Arc::new(Notify::new());
        let written = Arc::new(Mutex::new(Vec::new()));
        let (sink, handle) = QueuedAuditSink::spawn(
            GatedWriter {
                gate: gate.clone(),
                written: written.clone(),
            },
            1,
        );

        for i in 0..10 {
            sink.record(outcome(&format!("user{i}@b.com"), InviteStatus::Sent));
        }
        drop(sink);

        // release as many writes as could possibly be queued
        for _ in 0..10 {
            gate.notify_one();
            tokio::task::yield_now().await;
        }
        handle.abort();
        let _ = handle.await;

        let count = written.lock().unwrap().len();
        assert!((1..=2).contains(&count), "wrote {count} records");
    }

    #[tokio::test]
    async fn record_after_drain_stopped_is_silent() {
        let (sink, handle) = QueuedAuditSink::spawn(MemoryWriter::default(), 4);
        handle.abort();
        let _ = handle.await;
        sink.record(outcome("late@b.com", InviteStatus::Sent));
    }
}
