//! # Stepwise Core
//!
//! Domain types, traits, and error definitions for the Stepwise agent
//! orchestration engine. This crate defines the contracts that LLM providers
//! and tools must satisfy; the engine and policies live in `stepwise-agent`.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`] for LLM backends (streaming and structured output)
//! - [`Tool`] for capabilities the model can call
//!
//! Implementations live in their respective crates, which keeps the engine
//! testable with scripted providers and stub tools.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    ChunkReceiver, OutputSchema, Provider, ProviderRequest, ProviderResponse, StreamChunk,
    ToolDefinition, Usage,
};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
