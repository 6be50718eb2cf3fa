//! Operations exposed to callers.
//!
//! Each operation is a thin piece of logic over the [`BackendClient`]; the
//! [`dispatch`] entry point deserializes parameters and always runs the logic
//! inside the [`SecurePipeline`].
//!
//! # Module Structure
//! - `mapping`: flattening of index mapping responses

pub mod mapping;

use crate::{
    Result,
    audit::AuditLogger,
    backend::BackendClient,
    config::ServerConfig,
    error::QueryGateError,
    outcome::Outcome,
    pipeline::SecurePipeline,
    timerange::merge_time_range,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

/// Failure returned when the control plane has no detection engine
pub const DETECTION_ENGINE_UNAVAILABLE: &str = "Detection rules are unavailable: the security \
detection engine is not enabled on this deployment. Enable the security solution in the control \
plane, or check that KIBANA_URL points at the right instance.";

/// Failure returned when the API key may not read detection rules
pub const DETECTION_ENGINE_FORBIDDEN: &str = "Detection rules are not accessible with the \
configured API key. Grant read privileges for the security solution to use this operation.";

/// Names of the available operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Run a search request
    Search,
    /// Count matching documents
    Count,
    /// List indices
    ListIndices,
    /// Show an index mapping
    GetMapping,
    /// Show cluster health
    ClusterHealth,
    /// Search detection rules on the control plane
    FindDetectionRules,
}

impl Tool {
    /// Every operation, in listing order.
    pub const ALL: [Self; 6] = [
        Self::Search,
        Self::Count,
        Self::ListIndices,
        Self::GetMapping,
        Self::ClusterHealth,
        Self::FindDetectionRules,
    ];

    /// Wire name of the operation.
    pub fn name(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Count => "count",
            Self::ListIndices => "list_indices",
            Self::GetMapping => "get_mapping",
            Self::ClusterHealth => "cluster_health",
            Self::FindDetectionRules => "find_detection_rules",
        }
    }

    /// One-line description for listings.
    pub fn description(self) -> &'static str {
        match self {
            Self::Search => "Run a read-only search (index, body, size, time_range)",
            Self::Count => "Count matching documents (index, body, time_range)",
            Self::ListIndices => "List allowed indices matching a pattern (pattern)",
            Self::GetMapping => "Show field mappings of an index (index, flatten)",
            Self::ClusterHealth => "Show cluster health",
            Self::FindDetectionRules => "Search detection rules (page, per_page, filter)",
        }
    }

    /// Looks up an operation by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn default_search_body() -> Value {
    json!({"query": {"match_all": {}}})
}

/// Page size used when neither the parameters nor the body set one.
const DEFAULT_SEARCH_SIZE: u32 = 10;

fn default_pattern() -> String {
    "*".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_page() -> u32 {
    1
}

const fn default_per_page() -> u32 {
    20
}

/// Parameters of [`Tool::Search`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchParams {
    /// Index name or comma-separated patterns
    pub index: String,
    /// Full search request body
    #[serde(default = "default_search_body")]
    pub body: Value,
    /// Requested page size, capped by configuration. Overrides the body's
    /// `size` when present.
    #[serde(default)]
    pub size: Option<u32>,
    /// Lower time bound such as `now-24h`
    #[serde(default)]
    pub time_range: Option<String>,
}

/// Parameters of [`Tool::Count`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountParams {
    /// Index name or comma-separated patterns
    pub index: String,
    /// Optional body with a `query`
    #[serde(default)]
    pub body: Option<Value>,
    /// Lower time bound such as `now-24h`
    #[serde(default)]
    pub time_range: Option<String>,
}

/// Parameters of [`Tool::ListIndices`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListIndicesParams {
    /// Index pattern to list
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

/// Parameters of [`Tool::GetMapping`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetMappingParams {
    /// Index name
    pub index: String,
    /// Return `field.path -> type` pairs instead of the raw mapping
    #[serde(default = "default_true")]
    pub flatten: bool,
}

/// Parameters of [`Tool::ClusterHealth`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterHealthParams {}

/// Parameters of [`Tool::FindDetectionRules`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindDetectionRulesParams {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u32,
    /// Rules per page, capped by configuration
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// KQL filter over rule attributes
    #[serde(default)]
    pub filter: Option<String>,
}

/// Shared dependencies of every operation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Backend client shared by all invocations
    pub client: Arc<BackendClient>,
    /// Orchestrator wrapping every invocation
    pub pipeline: SecurePipeline,
}

impl ToolContext {
    /// Creates a context from explicit parts.
    pub fn new(client: Arc<BackendClient>, pipeline: SecurePipeline) -> Self {
        Self { client, pipeline }
    }

    /// Builds the production context: `reqwest` transport and file audit log.
    ///
    /// # Errors
    /// Returns an error if the HTTP client or audit log cannot be set up.
    pub fn from_config(config: Arc<ServerConfig>) -> Result<Self> {
        let audit = AuditLogger::from_config(&config)?;
        let pipeline = SecurePipeline::from_config(&config, audit);
        let client = Arc::new(BackendClient::new(config)?);
        Ok(Self::new(client, pipeline))
    }
}

fn parse_params<T: DeserializeOwned>(tool: Tool, params: &Value) -> Result<T> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(params)
        .map_err(|e| QueryGateError::invalid_parameters(format!("{}: {}", tool, e)))
}

/// Runs the operation named `name` through the secure pipeline.
///
/// # Errors
/// Returns [`QueryGateError::InvalidParameters`] for unknown operations and
/// malformed parameters; these are rejected before the pipeline runs. Every
/// later failure is reported inside the returned [`Outcome`].
pub async fn dispatch(ctx: &ToolContext, name: &str, params: Value) -> Result<Outcome> {
    let tool = Tool::from_name(name)
        .ok_or_else(|| QueryGateError::invalid_parameters(format!("unknown tool '{}'", name)))?;
    let client = ctx.client.as_ref();

    let outcome = match tool {
        Tool::Search => {
            let parsed: SearchParams = parse_params(tool, &params)?;
            ctx.pipeline
                .execute(tool.name(), &params, || search(client, parsed))
                .await
        }
        Tool::Count => {
            let parsed: CountParams = parse_params(tool, &params)?;
            ctx.pipeline
                .execute(tool.name(), &params, || count(client, parsed))
                .await
        }
        Tool::ListIndices => {
            let parsed: ListIndicesParams = parse_params(tool, &params)?;
            ctx.pipeline
                .execute(tool.name(), &params, || list_indices(client, parsed))
                .await
        }
        Tool::GetMapping => {
            let parsed: GetMappingParams = parse_params(tool, &params)?;
            ctx.pipeline
                .execute(tool.name(), &params, || get_mapping(client, parsed))
                .await
        }
        Tool::ClusterHealth => {
            let _: ClusterHealthParams = parse_params(tool, &params)?;
            ctx.pipeline
                .execute(tool.name(), &params, || cluster_health(client))
                .await
        }
        Tool::FindDetectionRules => {
            let parsed: FindDetectionRulesParams = parse_params(tool, &params)?;
            ctx.pipeline
                .execute(tool.name(), &params, || find_detection_rules(client, parsed))
                .await
        }
    };

    Ok(outcome)
}

/// Search logic: optional time-range merge, then a capped search.
///
/// # Errors
/// Propagates guardrail, merge and backend errors.
pub async fn search(client: &BackendClient, params: SearchParams) -> Result<Outcome> {
    let body = match params.time_range.as_deref() {
        Some(since) => merge_time_range(params.body, since)?,
        None => params.body,
    };

    let size = params
        .size
        .or_else(|| body.get("size").is_none().then_some(DEFAULT_SEARCH_SIZE));
    let response = client.search(&params.index, body, size).await?;

    let total = response
        .pointer("/hits/total/value")
        .or_else(|| response.pointer("/hits/total"))
        .and_then(Value::as_u64);

    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| {
                    json!({
                        "_index": hit.get("_index").cloned().unwrap_or(Value::Null),
                        "_id": hit.get("_id").cloned().unwrap_or(Value::Null),
                        "_source": hit.get("_source").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(Outcome::Success {
        data: Value::Array(hits),
        total,
        aggregations: response.get("aggregations").cloned(),
    })
}

/// Count logic.
///
/// # Errors
/// Propagates guardrail, merge and backend errors.
pub async fn count(client: &BackendClient, params: CountParams) -> Result<Outcome> {
    let body = match params.time_range.as_deref() {
        Some(since) => Some(merge_time_range(
            params.body.unwrap_or_else(|| json!({})),
            since,
        )?),
        None => params.body,
    };

    let response = client.count(&params.index, body).await?;
    let count = response
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| QueryGateError::invalid_response("count response has no 'count'"))?;

    Ok(Outcome::Success {
        data: json!({ "count": count }),
        total: Some(count),
        aggregations: None,
    })
}

/// Index listing logic.
///
/// # Errors
/// Propagates guardrail and backend errors.
pub async fn list_indices(client: &BackendClient, params: ListIndicesParams) -> Result<Outcome> {
    let indices = client.list_indices(&params.pattern).await?;
    let total = u64::try_from(indices.len()).ok();

    Ok(Outcome::Success {
        data: Value::Array(indices),
        total,
        aggregations: None,
    })
}

/// Mapping logic.
///
/// # Errors
/// Propagates guardrail and backend errors.
pub async fn get_mapping(client: &BackendClient, params: GetMappingParams) -> Result<Outcome> {
    let response = client.get_mapping(&params.index).await?;

    let data = if params.flatten {
        serde_json::to_value(mapping::flatten_mapping_response(&response))
            .map_err(|e| QueryGateError::serialization("flattened mapping", e))?
    } else {
        response
    };

    Ok(Outcome::success(data))
}

/// Cluster health logic.
///
/// # Errors
/// Propagates backend errors.
pub async fn cluster_health(client: &BackendClient) -> Result<Outcome> {
    Ok(Outcome::success(client.cluster_health().await?))
}

/// Detection rule logic.
///
/// A 404 from the control plane means the detection engine is not enabled and
/// a 403 means the key lacks privileges; both become descriptive failures.
///
/// # Errors
/// Propagates other backend errors.
pub async fn find_detection_rules(
    client: &BackendClient,
    params: FindDetectionRulesParams,
) -> Result<Outcome> {
    let response = match client
        .find_detection_rules(params.page, params.per_page, params.filter.as_deref())
        .await
    {
        Ok(response) => response,
        Err(error) => {
            return match error.status() {
                Some(404) => Ok(Outcome::failure(DETECTION_ENGINE_UNAVAILABLE)),
                Some(403) => Ok(Outcome::failure(DETECTION_ENGINE_FORBIDDEN)),
                _ => Err(error),
            };
        }
    };

    let rules = response
        .get("data")
        .and_then(Value::as_array)
        .map(|rules| rules.iter().map(summarize_rule).collect::<Vec<_>>())
        .unwrap_or_default();

    Ok(Outcome::Success {
        data: Value::Array(rules),
        total: response.get("total").and_then(Value::as_u64),
        aggregations: None,
    })
}

fn summarize_rule(rule: &Value) -> Value {
    let mut summary = serde_json::Map::new();
    for field in [
        "id",
        "rule_id",
        "name",
        "description",
        "enabled",
        "type",
        "severity",
        "risk_score",
        "tags",
        "index",
        "updated_at",
    ] {
        if let Some(value) = rule.get(field) {
            summary.insert(field.to_string(), value.clone());
        }
    }
    Value::Object(summary)
}
