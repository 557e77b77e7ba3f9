//! Error types for the Stepwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Errors raised by the orchestration skeleton live on [`Error`]; errors
//! raised inside a tool live on [`ToolError`] and are normally absorbed into
//! the conversation instead of reaching the caller.

use std::time::Duration;
use thiserror::Error;

/// The top-level error type for all Stepwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors (startup / logic defects) ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unknown approach: {0}")]
    UnknownApproach(String),

    // --- Capability errors ---
    #[error("No response from LLM")]
    NoResponse,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- History errors ---
    #[error("Ran out of memory: no message fits the history budget")]
    OutOfMemory,

    // --- Engine errors ---
    #[error("Run timed out after {limit:?}")]
    Timeout { limit: Duration },

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error is a configuration defect (never retried).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::UnknownApproach(_))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Structured output not supported by provider: {0}")]
    StructuredUnsupported(String),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateName(String),
}
