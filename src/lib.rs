//! # tandem-rpc
//!
//! Bidirectional RPC engine over pluggable topic-based transports.
//!
//! Two peers each run an engine over one end of a shared channel. Either
//! side registers methods and either side calls them; there is no client or
//! server role. The engine only needs a transport that can publish JSON
//! payloads to named topics and subscribe handlers to them.
//!
//! ## Architecture
//!
//! - **Envelopes**: versioned request/response payloads with string
//!   correlation IDs; a request without an ID is a notification
//! - **Topics**: requests for a method travel on `syn:<name>`, responses on
//!   `ack:<name>`; the connection handshake rides a reserved method name
//! - **Transport adapter**: `emit`/`on`/`off` plus one error slot, so any
//!   message channel can carry the protocol
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tandem_rpc::{InProcTransport, Rpc, WireError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (left, right) = InProcTransport::pair();
//!
//!     let worker = Rpc::builder(Arc::new(left))
//!         .method("add", |terms: [i64; 2]| async move {
//!             Ok::<_, WireError>(terms[0] + terms[1])
//!         })
//!         .build()?;
//!
//!     let caller = Rpc::builder(Arc::new(right))
//!         .timeout(Duration::from_secs(2))
//!         .build()?;
//!
//!     tokio::try_join!(worker.connect(), caller.connect())?;
//!
//!     let sum: i64 = caller.call("add", &[2, 3]).await?;
//!     assert_eq!(sum, 5);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod pending;
mod rpc;

pub use error::{Result, RpcError};
pub use protocol::{MethodName, WireError};
pub use rpc::{InvokeOptions, Rpc, RpcBuilder};
pub use transport::{InProcTransport, Transport};
