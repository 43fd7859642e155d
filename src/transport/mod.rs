//! Transport module - topic-addressed message channels.
//!
//! Provides:
//! - [`Transport`] - the adapter contract the engine runs over
//! - [`InProcTransport`] - channel-backed endpoint pair for same-process peers
//!
//! Engines own exactly one transport endpoint and drive it through the
//! trait; swapping the endpoint for a pipe- or socket-backed one changes
//! nothing above this module.

mod adapter;
mod inproc;

pub use adapter::{ErrorHandler, ListenerId, TopicHandler, Transport, Undelivered};
pub use inproc::InProcTransport;
