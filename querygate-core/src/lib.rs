//! Core library for QueryGate.
//!
//! QueryGate sits between a caller and a search backend (plus its management
//! control plane) and exposes a fixed set of read-only operations. Every
//! invocation flows through the same secure pipeline.
//!
//! # Security Guarantees
//! - Index names are checked against a character set and an allow-list
//! - Query bodies containing write or scripting keywords are rejected
//! - Sensitive values in results are masked before they are returned
//! - Every invocation leaves one append-only audit record
//! - The API key is held in a zeroizing container and never logged
//!
//! # Architecture
//! - [`tools`] parses parameters and holds per-operation logic
//! - [`pipeline`] runs that logic, redacts its result and audits it
//! - [`backend`] talks HTTP through a [`backend::Transport`] seam with bounded retries
//! - [`guardrails`], [`timerange`] and [`redaction`] are pure functions

pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod guardrails;
pub mod logging;
pub mod outcome;
pub mod pipeline;
pub mod redaction;
pub mod timerange;
pub mod tools;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditLogger, AuditSink, FileAuditSink, MemoryAuditSink};
pub use backend::{BackendClient, RetryPolicy, Sleeper, Transport};
pub use config::ServerConfig;
pub use error::{QueryGateError, Result};
pub use logging::init_logging;
pub use outcome::Outcome;
pub use pipeline::SecurePipeline;
pub use redaction::{RedactionResult, redact};
pub use tools::{Tool, ToolContext, dispatch};
