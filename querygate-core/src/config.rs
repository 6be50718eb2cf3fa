//! Server configuration.
//!
//! Loaded once at process start from environment input and shared read-only
//! (behind an `Arc`) for the lifetime of the process.
//!
//! # Security
//! The API key is held in a `Zeroizing` container, is never serialized, and is
//! omitted from the `Debug` and `Display` output.

use crate::{Result, error::QueryGateError};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

/// Smallest page size a caller can be granted
pub const MIN_RESULT_SIZE: u32 = 1;
/// Largest page size a caller can be granted
pub const MAX_RESULT_SIZE: u32 = 500;

const DEFAULT_RESULT_SIZE: u32 = 100;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_AUDIT_LOG: &str = "querygate-audit.jsonl";

/// Process-wide configuration for the secure pipeline.
///
/// # Example
/// ```rust
/// use querygate_core::config::ServerConfig;
///
/// let config = ServerConfig::new(
///     "https://logs.es.eu-west-1.aws.example.io".parse()?,
///     "api-key".to_string(),
/// )
/// .with_allowed_patterns(vec!["logs-*".to_string()])
/// .with_max_result_size(10_000);
///
/// assert_eq!(config.max_result_size, 500);
/// assert_eq!(
///     config.kibana_url.as_str(),
///     "https://logs.kb.eu-west-1.aws.example.io/"
/// );
/// assert!(config.validate().is_ok());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    /// Search backend base URL
    pub elasticsearch_url: Url,
    /// Control-plane backend base URL
    pub kibana_url: Url,
    /// API key sent as `Authorization: ApiKey <key>`
    api_key: Zeroizing<String>,
    /// Glob patterns restricting accessible indices (empty = unrestricted)
    pub allowed_index_patterns: Vec<String>,
    /// Upper bound for any result page, within [1, 500]
    pub max_result_size: u32,
    /// Per-request timeout applied by the HTTP client
    pub request_timeout: Duration,
    /// Total tries per backend call (at least 1)
    pub retry_attempts: u32,
    /// Base delay for exponential backoff
    pub retry_delay: Duration,
    /// Whether audit entries are emitted
    pub audit_enabled: bool,
    /// Whether successful outcomes are redacted
    pub redaction_enabled: bool,
    /// Append-only audit log destination
    pub audit_log_path: PathBuf,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("elasticsearch_url", &self.elasticsearch_url.as_str())
            .field("kibana_url", &self.kibana_url.as_str())
            .field("api_key", &"****")
            .field("allowed_index_patterns", &self.allowed_index_patterns)
            .field("max_result_size", &self.max_result_size)
            .field("request_timeout", &self.request_timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("audit_enabled", &self.audit_enabled)
            .field("redaction_enabled", &self.redaction_enabled)
            .field("audit_log_path", &self.audit_log_path)
            .finish()
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "search backend:   {}",
            crate::error::redact_url(self.elasticsearch_url.as_str())
        )?;
        writeln!(
            f,
            "control plane:    {}",
            crate::error::redact_url(self.kibana_url.as_str())
        )?;
        writeln!(
            f,
            "allowed indices:  {}",
            if self.allowed_index_patterns.is_empty() {
                "<unrestricted>".to_string()
            } else {
                self.allowed_index_patterns.join(",")
            }
        )?;
        writeln!(f, "max result size:  {}", self.max_result_size)?;
        writeln!(
            f,
            "request timeout:  {}ms",
            self.request_timeout.as_millis()
        )?;
        writeln!(
            f,
            "retry:            {} attempts, {}ms base delay",
            self.retry_attempts,
            self.retry_delay.as_millis()
        )?;
        writeln!(f, "audit:            {}", self.audit_enabled)?;
        writeln!(f, "audit log:        {}", self.audit_log_path.display())?;
        write!(f, "redaction:        {}", self.redaction_enabled)
        // Intentionally omit the API key
    }
}

impl ServerConfig {
    /// Creates a configuration with safe defaults.
    ///
    /// The control-plane URL is derived from the search URL.
    pub fn new(elasticsearch_url: Url, api_key: String) -> Self {
        let kibana_url = derive_kibana_url(&elasticsearch_url);
        Self {
            elasticsearch_url,
            kibana_url,
            api_key: Zeroizing::new(api_key),
            allowed_index_patterns: Vec::new(),
            max_result_size: DEFAULT_RESULT_SIZE,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            audit_enabled: true,
            redaction_enabled: true,
            audit_log_path: PathBuf::from(DEFAULT_AUDIT_LOG),
        }
    }

    /// Loads configuration from the process environment.
    ///
    /// # Errors
    /// Returns a configuration error if `ELASTICSEARCH_URL` or
    /// `ELASTICSEARCH_API_KEY` is missing, or any value fails to parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// # Errors
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let elasticsearch_url = get("ELASTICSEARCH_URL")
            .ok_or_else(|| QueryGateError::configuration("ELASTICSEARCH_URL is required"))?;
        let elasticsearch_url = parse_url("ELASTICSEARCH_URL", &elasticsearch_url)?;

        let api_key = get("ELASTICSEARCH_API_KEY")
            .ok_or_else(|| QueryGateError::configuration("ELASTICSEARCH_API_KEY is required"))?;

        let mut config = Self::new(elasticsearch_url, api_key);

        if let Some(kibana) = get("KIBANA_URL") {
            config.kibana_url = parse_url("KIBANA_URL", &kibana)?;
        }

        if let Some(patterns) = get("ALLOWED_INDEX_PATTERNS") {
            config = config.with_allowed_patterns(parse_pattern_list(&patterns));
        }

        if let Some(size) = get("MAX_RESULT_SIZE") {
            config = config.with_max_result_size(parse_number("MAX_RESULT_SIZE", &size)?);
        }

        if let Some(timeout) = get("REQUEST_TIMEOUT_MS") {
            config.request_timeout =
                Duration::from_millis(parse_number("REQUEST_TIMEOUT_MS", &timeout)?);
        }

        if let Some(attempts) = get("RETRY_ATTEMPTS") {
            config = config.with_retry_attempts(parse_number("RETRY_ATTEMPTS", &attempts)?);
        }

        if let Some(delay) = get("RETRY_DELAY_MS") {
            config.retry_delay = Duration::from_millis(parse_number("RETRY_DELAY_MS", &delay)?);
        }

        if let Some(flag) = get("AUDIT_ENABLED") {
            config.audit_enabled = parse_flag("AUDIT_ENABLED", &flag)?;
        }

        if let Some(flag) = get("REDACTION_ENABLED") {
            config.redaction_enabled = parse_flag("REDACTION_ENABLED", &flag)?;
        }

        if let Some(path) = get("AUDIT_LOG_PATH") {
            config.audit_log_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(QueryGateError::configuration("API key cannot be empty"));
        }

        for (name, url) in [
            ("ELASTICSEARCH_URL", &self.elasticsearch_url),
            ("KIBANA_URL", &self.kibana_url),
        ] {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(QueryGateError::configuration(format!(
                    "{} must use http or https",
                    name
                )));
            }
        }

        if !(MIN_RESULT_SIZE..=MAX_RESULT_SIZE).contains(&self.max_result_size) {
            return Err(QueryGateError::configuration(format!(
                "max_result_size must be within [{}, {}]",
                MIN_RESULT_SIZE, MAX_RESULT_SIZE
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(QueryGateError::configuration(
                "request_timeout must be greater than 0",
            ));
        }

        if self.retry_attempts == 0 {
            return Err(QueryGateError::configuration(
                "retry_attempts must be greater than 0",
            ));
        }

        Ok(())
    }

    /// The API key for request authorization.
    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Builder method to set the allow-list of index patterns.
    pub fn with_allowed_patterns(mut self, patterns: Vec<String>) -> Self {
        self.allowed_index_patterns = patterns;
        self
    }

    /// Builder method to set the result cap, clamped to [1, 500].
    pub fn with_max_result_size(mut self, size: u32) -> Self {
        self.max_result_size = size.clamp(MIN_RESULT_SIZE, MAX_RESULT_SIZE);
        self
    }

    /// Builder method to set the retry attempt count (at least 1).
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Builder method to set the base retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Builder method to toggle redaction.
    pub fn with_redaction(mut self, enabled: bool) -> Self {
        self.redaction_enabled = enabled;
        self
    }

    /// Builder method to toggle auditing.
    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }
}

/// Derives the control-plane URL from the search URL.
///
/// The first `.es.` host label is replaced by `.kb.`; a host without that
/// label is used unchanged.
pub fn derive_kibana_url(elasticsearch_url: &Url) -> Url {
    let mut kibana = elasticsearch_url.clone();
    if let Some(host) = elasticsearch_url.host_str()
        && host.contains(".es.")
    {
        let derived = host.replacen(".es.", ".kb.", 1);
        if kibana.set_host(Some(&derived)).is_err() {
            tracing::warn!("Could not derive control-plane host, using search host");
            return elasticsearch_url.clone();
        }
    }
    kibana
}

/// Splits a comma-separated pattern list, dropping empty entries.
pub fn parse_pattern_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_url(name: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| {
        QueryGateError::configuration(format!("{} is not a valid URL: {}", name, e))
    })
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(|_| {
        QueryGateError::configuration(format!("{} must be a non-negative integer", name))
    })
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(QueryGateError::configuration(format!(
            "{} must be true or false",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("ELASTICSEARCH_URL", "https://prod.es.us-east-1.aws.example.io:9243"),
        ("ELASTICSEARCH_API_KEY", "c2VjcmV0LWtleQ=="),
    ];

    #[test]
    fn test_defaults_from_required_values() {
        let config = ServerConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.max_result_size, 100);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.request_timeout, Duration::from_millis(30_000));
        assert!(config.audit_enabled);
        assert!(config.redaction_enabled);
        assert!(config.allowed_index_patterns.is_empty());
        assert_eq!(
            config.kibana_url.as_str(),
            "https://prod.kb.us-east-1.aws.example.io:9243/"
        );
    }

    #[test]
    fn test_missing_url_is_fatal() {
        let result = ServerConfig::from_lookup(lookup_from(&[("ELASTICSEARCH_API_KEY", "k")]));
        let error = result.unwrap_err();
        assert!(error.to_string().contains("ELASTICSEARCH_URL"));
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let result =
            ServerConfig::from_lookup(lookup_from(&[("ELASTICSEARCH_URL", "http://localhost:9200")]));
        let error = result.unwrap_err();
        assert!(error.to_string().contains("ELASTICSEARCH_API_KEY"));
    }

    #[test]
    fn test_result_size_is_clamped() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_RESULT_SIZE", "9000"));
        let config = ServerConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.max_result_size, 500);

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_RESULT_SIZE", "0"));
        let config = ServerConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.max_result_size, 1);
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("KIBANA_URL", "https://kibana.internal:5601"),
            ("ALLOWED_INDEX_PATTERNS", "logs-*, metrics-*,,"),
            ("RETRY_ATTEMPTS", "5"),
            ("RETRY_DELAY_MS", "250"),
            ("REQUEST_TIMEOUT_MS", "5000"),
            ("AUDIT_ENABLED", "false"),
            ("REDACTION_ENABLED", "0"),
            ("AUDIT_LOG_PATH", "/var/log/querygate.jsonl"),
        ]);
        let config = ServerConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.kibana_url.as_str(), "https://kibana.internal:5601/");
        assert_eq!(config.allowed_index_patterns, vec!["logs-*", "metrics-*"]);
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert!(!config.audit_enabled);
        assert!(!config.redaction_enabled);
        assert_eq!(config.audit_log_path, PathBuf::from("/var/log/querygate.jsonl"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (key, value) in [
            ("RETRY_ATTEMPTS", "three"),
            ("AUDIT_ENABLED", "maybe"),
            ("REQUEST_TIMEOUT_MS", "0"),
            ("KIBANA_URL", "not a url"),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value));
            assert!(
                ServerConfig::from_lookup(lookup_from(&pairs)).is_err(),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_zero_retry_attempts_raised_to_one() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RETRY_ATTEMPTS", "0"));
        let config = ServerConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.retry_attempts, 1);
    }

    #[test]
    fn test_derive_kibana_url_without_es_label() {
        let url: Url = "http://localhost:9200".parse().unwrap();
        assert_eq!(derive_kibana_url(&url), url);
    }

    #[test]
    fn test_credential_never_displayed() {
        let config = ServerConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        let debug = format!("{:?}", config);
        let display = config.to_string();

        assert!(!debug.contains("c2VjcmV0LWtleQ=="));
        assert!(!display.contains("c2VjcmV0LWtleQ=="));
        assert!(display.contains("<unrestricted>"));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        temp_env::with_vars(
            [
                ("ELASTICSEARCH_URL", Some("http://localhost:9200")),
                ("ELASTICSEARCH_API_KEY", Some("local-key")),
                ("MAX_RESULT_SIZE", Some("25")),
                ("KIBANA_URL", None),
                ("ALLOWED_INDEX_PATTERNS", None),
            ],
            || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(config.max_result_size, 25);
                assert_eq!(config.api_key(), "local-key");
            },
        );
    }
}
