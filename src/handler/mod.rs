//! Handler module - method registration and dispatch support.
//!
//! Provides:
//! - [`MethodHandler`] - erased async handler interface
//! - [`TypedHandler`] - serde-typed adapter over async closures
//! - [`MethodRegistry`] - maps method names to their request listeners
//!
//! # Example
//!
//! ```ignore
//! use tandem_rpc::handler::{MethodHandler, TypedHandler};
//! use tandem_rpc::WireError;
//!
//! // Wrap an async closure over concrete serde types.
//! let handler = TypedHandler::new(|terms: [i64; 2]| async move {
//!     Ok::<_, WireError>(terms[0] + terms[1])
//! });
//!
//! // Erased call over raw JSON params.
//! let result = handler.call(serde_json::json!([2, 3])).await;
//! ```

mod registry;
mod typed;

pub use registry::MethodRegistry;
pub use typed::{BoxFuture, HandlerResult, MethodHandler, TypedHandler};
