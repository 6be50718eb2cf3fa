//! Shared fakes for integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use querygate_core::{
    AuditLogger, BackendClient, MemoryAuditSink, Result, SecurePipeline, ServerConfig, ToolContext,
    backend::{BackendRequest, BackendResponse, Sleeper, Transport},
    error::QueryGateError,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Transport replaying scripted responses and recording every request.
///
/// Once the script runs out it answers `200 {}`.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<BackendResponse>>>,
    requests: Mutex<Vec<BackendRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: Value) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(BackendResponse { status, body }));
        self
    }

    pub fn fail_network(self, context: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(QueryGateError::network(context)));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &BackendRequest) -> Result<BackendResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(BackendResponse {
                    status: 200,
                    body: json!({}),
                })
            })
    }
}

/// Sleeper that records requested delays without waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Configuration pointing at a fictitious cloud deployment.
pub fn test_config() -> ServerConfig {
    ServerConfig::new(
        Url::parse("https://acme.es.example.cloud:9243").unwrap(),
        "test-api-key".to_string(),
    )
    .with_retry_attempts(3)
    .with_retry_delay(Duration::from_millis(100))
}

/// Everything a test needs to drive and inspect one invocation.
pub struct Harness {
    pub ctx: ToolContext,
    pub transport: Arc<ScriptedTransport>,
    pub sleeper: Arc<RecordingSleeper>,
    pub audit: Arc<MemoryAuditSink>,
}

pub fn harness(config: ServerConfig, transport: ScriptedTransport) -> Harness {
    let transport = Arc::new(transport);
    let sleeper = Arc::new(RecordingSleeper::default());
    let audit = Arc::new(MemoryAuditSink::new());

    let pipeline = SecurePipeline::new(
        config.redaction_enabled,
        AuditLogger::new(config.audit_enabled, audit.clone()),
    );
    let client = BackendClient::with_transport(Arc::new(config), transport.clone(), sleeper.clone());

    Harness {
        ctx: ToolContext::new(Arc::new(client), pipeline),
        transport,
        sleeper,
        audit,
    }
}
