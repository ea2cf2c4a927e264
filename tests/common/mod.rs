//! Shared router harness: stub webhook, in-memory audit sink and a manual clock.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use beta_admin_api::{
    AppState,
    config::Config,
    invite::{
        AuditSink, ForwardError, ForwardResult, InviteOutcome, InvitePayload, InviteService,
        ManualClock, RateLimitPolicy, RateLimiter, WebhookForwarder,
    },
    router::create_router,
};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

pub struct StubWebhook {
    pub status: AtomicU16,
    pub calls: AtomicUsize,
    pub payloads: Mutex<Vec<InvitePayload>>,
    pub body: Mutex<String>,
}

#[async_trait]
impl WebhookForwarder for StubWebhook {
    async fn forward(&self, payload: &InvitePayload) -> Result<ForwardResult, ForwardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(ForwardResult {
            status_code: self.status.load(Ordering::SeqCst),
            body: self.body.lock().unwrap().clone(),
        })
    }
}

#[derive(Default)]
pub struct MemorySink {
    pub outcomes: Mutex<Vec<InviteOutcome>>,
}

impl AuditSink for MemorySink {
    fn record(&self, outcome: InviteOutcome) {
        self.outcomes.lock().unwrap().push(outcome);
    }
}

pub struct TestApp {
    pub router: Router,
    pub webhook: Arc<StubWebhook>,
    pub audit: Arc<MemorySink>,
    pub clock: ManualClock,
}

pub fn config(overrides: &[(&'static str, String)]) -> Config {
    let mut vars: HashMap<&str, String> = HashMap::from([
        ("DB_HOST", "127.0.0.1".to_string()),
        ("DB_PORT", "1".to_string()),
        ("DB_USER", "tester".to_string()),
        ("DB_PASSWORD", "secret".to_string()),
        ("DB_NAME", "beta".to_string()),
        ("DB_SSL_MODE", "disable".to_string()),
        ("INVITE_WEBHOOK_URL", "http://127.0.0.1:1/hook".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key, value.clone());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn build_app(config: Config, pool: PgPool) -> TestApp {
    let clock = ManualClock::default();
    let limiter = Arc::new(RateLimiter::with_clock(
        RateLimitPolicy::default(),
        Arc::new(clock.clone()),
    ));
    let webhook = Arc::new(StubWebhook {
        status: AtomicU16::new(200),
        calls: AtomicUsize::new(0),
        payloads: Mutex::new(Vec::new()),
        body: Mutex::new("from stub".to_string()),
    });
    let audit = Arc::new(MemorySink::default());

    let state = AppState {
        pool,
        config,
        invites: InviteService::new(limiter, webhook.clone(), audit.clone()),
    };

    TestApp {
        router: create_router(state),
        webhook,
        audit,
        clock,
    }
}

/// App whose pool points at a closed port and never connects.
pub fn lazy_app_with(overrides: &[(&'static str, String)]) -> TestApp {
    let config = config(overrides);
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(500))
        .connect_lazy_with(config.database.connect_options());
    build_app(config, pool)
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    json_request("POST", uri, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn invite_from(ip: &str, body: Value) -> Request<Body> {
    let mut request = post_json("/send-invite", body);
    request
        .headers_mut()
        .insert("x-forwarded-for", ip.parse().unwrap());
    request
}
