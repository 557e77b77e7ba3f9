//! Agent policies — step graphs that decide how a turn is answered.
//!
//! - [`tool_loop`] — the model calls tools directly until it answers
//! - [`flowchart`] — the flow picks an approach and runs queries itself

pub mod flowchart;
pub mod tool_loop;

pub use flowchart::{MAX_QUERY_ATTEMPTS, flowchart};
pub use tool_loop::tool_loop;
