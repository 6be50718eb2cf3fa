//! Backend client for the search and control-plane services.
//!
//! Every operation validates its identifiers against the guardrails before a
//! request is built, then sends it through the bounded retry wrapper. Non-2xx
//! responses are converted into [`QueryGateError::Backend`] carrying the
//! structured reason from the error body when one is present.
//!
//! # Module Structure
//! - `transport`: HTTP seam ([`Transport`]) and its `reqwest` implementation
//! - `retry`: retry policy, backoff and the [`Sleeper`] seam

pub mod retry;
pub mod transport;

pub use retry::{RetryPolicy, Sleeper, TokioSleeper, with_retry};
pub use transport::{BackendRequest, BackendResponse, Method, ReqwestTransport, Target, Transport};

use crate::{
    Result,
    config::ServerConfig,
    error::QueryGateError,
    guardrails::{check_index_access, validate_index_name, validate_index_target, validate_read_only_query},
};
use serde_json::Value;
use std::sync::Arc;

/// Path of the control-plane detection rule search endpoint
pub const DETECTION_RULES_PATH: &str = "/api/detection_engine/rules/_find";

/// Client shared by all invocations.
///
/// Holds only fixed connection settings; there is no per-call state, so one
/// instance is shared behind an `Arc` by concurrent invocations.
#[derive(Clone)]
pub struct BackendClient {
    config: Arc<ServerConfig>,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Creates a client using `reqwest` and the tokio timer.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(
            config,
            Arc::new(transport),
            Arc::new(TokioSleeper),
        ))
    }

    /// Creates a client over explicit transport and sleeper implementations.
    pub fn with_transport(
        config: Arc<ServerConfig>,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            config,
            transport,
            sleeper,
            policy,
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Sends `request` with retries and returns the decoded 2xx body.
    async fn call(&self, operation: &str, request: BackendRequest) -> Result<Value> {
        tracing::debug!(operation, path = %request.path, "Sending backend request");

        with_retry(&self.policy, self.sleeper.as_ref(), operation, || async {
            let response = self.transport.send(&request).await?;
            if response.is_success() {
                Ok(response.body)
            } else {
                Err(error_from_response(response))
            }
        })
        .await
    }

    /// Runs a search against `index`.
    ///
    /// The page size is the smaller of the requested size (the `size`
    /// argument, else the body's `size`, else the cap) and the configured cap.
    ///
    /// # Errors
    /// Rejects invalid or disallowed index names, non-object bodies and
    /// bodies containing write or scripting keywords before any request.
    pub async fn search(&self, index: &str, body: Value, size: Option<u32>) -> Result<Value> {
        validate_index_target(index, &self.config.allowed_index_patterns)?;
        validate_read_only_query(&body)?;

        let Value::Object(mut body) = body else {
            return Err(QueryGateError::rejected("Search body must be a JSON object"));
        };

        let cap = u64::from(self.config.max_result_size);
        let requested = size
            .map(u64::from)
            .or_else(|| body.get("size").and_then(Value::as_u64))
            .unwrap_or(cap);
        body.insert("size".to_string(), Value::from(requested.min(cap)));

        self.call(
            "search",
            BackendRequest::post(format!("/{}/_search", index), Value::Object(body)),
        )
        .await
    }

    /// Counts documents in `index` matching an optional query body.
    ///
    /// # Errors
    /// Same guardrails as [`BackendClient::search`].
    pub async fn count(&self, index: &str, body: Option<Value>) -> Result<Value> {
        validate_index_target(index, &self.config.allowed_index_patterns)?;
        let body = body.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        validate_read_only_query(&body)?;

        self.call(
            "count",
            BackendRequest::post(format!("/{}/_count", index), body),
        )
        .await
    }

    /// Lists indices matching `pattern`, keeping only allowed ones.
    ///
    /// The pattern itself only has to pass the character check; entries are
    /// filtered against the allow-list afterwards.
    ///
    /// # Errors
    /// Rejects patterns with disallowed characters.
    pub async fn list_indices(&self, pattern: &str) -> Result<Vec<Value>> {
        validate_index_name(pattern)?;

        let request = BackendRequest::get(Target::Search, format!("/_cat/indices/{}", pattern))
            .with_query("format", "json")
            .with_query("h", "index,health,status,docs.count,store.size");

        let body = self.call("list_indices", request).await?;
        let Value::Array(entries) = body else {
            return Err(QueryGateError::invalid_response(
                "index listing is not a JSON array",
            ));
        };

        let allowed = &self.config.allowed_index_patterns;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                entry
                    .get("index")
                    .and_then(Value::as_str)
                    .is_some_and(|name| check_index_access(name, allowed).is_ok())
            })
            .collect())
    }

    /// Fetches the mapping of `index`.
    ///
    /// # Errors
    /// Rejects invalid or disallowed index names before any request.
    pub async fn get_mapping(&self, index: &str) -> Result<Value> {
        validate_index_target(index, &self.config.allowed_index_patterns)?;

        self.call(
            "get_mapping",
            BackendRequest::get(Target::Search, format!("/{}/_mapping", index)),
        )
        .await
    }

    /// Fetches cluster health.
    ///
    /// # Errors
    /// Returns backend or network errors.
    pub async fn cluster_health(&self) -> Result<Value> {
        self.call(
            "cluster_health",
            BackendRequest::get(Target::Search, "/_cluster/health"),
        )
        .await
    }

    /// Searches detection rules on the control plane.
    ///
    /// `per_page` is clamped to the configured result cap and `page` to at
    /// least 1.
    ///
    /// # Errors
    /// Returns backend or network errors; 404 and 403 are passed through so
    /// callers can explain a disabled or forbidden feature.
    pub async fn find_detection_rules(
        &self,
        page: u32,
        per_page: u32,
        filter: Option<&str>,
    ) -> Result<Value> {
        let mut request = BackendRequest::get(Target::ControlPlane, DETECTION_RULES_PATH)
            .with_query("page", page.max(1))
            .with_query(
                "per_page",
                per_page.min(self.config.max_result_size).max(1),
            );
        if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
            request = request.with_query("filter", filter);
        }

        self.call("find_detection_rules", request).await
    }
}

/// Builds a backend error from a non-2xx response.
///
/// The reason is taken from `error.root_cause[0].reason`, then
/// `error.reason`, then a top-level `message` (control-plane format).
pub fn error_from_response(response: BackendResponse) -> QueryGateError {
    let body = &response.body;
    let reason = body
        .pointer("/error/root_cause/0/reason")
        .or_else(|| body.pointer("/error/reason"))
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(ToString::to_string);

    let message = reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .map_or_else(|| format!("HTTP {}", response.status), ToString::to_string);

    QueryGateError::backend_status(response.status, reason, message)
}
