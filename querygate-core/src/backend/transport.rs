//! HTTP transport for the search and control-plane backends.
//!
//! The [`Transport`] trait is the seam between the backend client and the
//! network. A transport reports every HTTP status as a response; only
//! network-level failures (connect errors, timeouts) are returned as errors.

use crate::{Result, config::ServerConfig, error::QueryGateError};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// Which backend a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Search backend (queries, mappings, cluster state)
    Search,
    /// Control-plane backend (detection rules)
    ControlPlane,
}

/// HTTP verbs used by the client. Only reads are expressible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST carrying a read-only query body
    Post,
}

/// A single backend request.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    /// Destination backend
    pub target: Target,
    /// HTTP verb
    pub method: Method,
    /// Path relative to the backend base URL, starting with `/`
    pub path: String,
    /// Query string parameters
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
}

impl BackendRequest {
    /// GET request against `target`.
    pub fn get(target: Target, path: impl Into<String>) -> Self {
        Self {
            target,
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// POST request against the search backend with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            target: Target::Search,
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Adds a query string parameter.
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// A backend response with any status.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    /// HTTP status code
    pub status: u16,
    /// Decoded JSON body, or the raw text as a JSON string when not JSON
    pub body: Value,
}

impl BackendResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to a backend.
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request.
    ///
    /// # Errors
    /// Returns [`QueryGateError::Network`] for connect failures and timeouts.
    async fn send(&self, request: &BackendRequest) -> Result<BackendResponse>;
}

/// `reqwest`-backed transport sharing one pooled client.
pub struct ReqwestTransport {
    http: reqwest::Client,
    search_url: Url,
    control_plane_url: Url,
    authorization: String,
}

impl ReqwestTransport {
    /// Builds a transport with the configured timeout and credential.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("querygate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                QueryGateError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            search_url: config.elasticsearch_url.clone(),
            control_plane_url: config.kibana_url.clone(),
            authorization: format!("ApiKey {}", config.api_key()),
        })
    }

    fn url_for(&self, request: &BackendRequest) -> String {
        let base = match request.target {
            Target::Search => &self.search_url,
            Target::ControlPlane => &self.control_plane_url,
        };
        format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            request.path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("search_url", &self.search_url.as_str())
            .field("control_plane_url", &self.control_plane_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &BackendRequest) -> Result<BackendResponse> {
        let url = self.url_for(request);

        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        }
        .header(reqwest::header::AUTHORIZATION, &self.authorization)
        .header(reqwest::header::ACCEPT, "application/json");

        if request.target == Target::ControlPlane {
            builder = builder.header("kbn-xsrf", "true");
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(BackendResponse { status, body })
    }
}
