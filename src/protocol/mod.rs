//! Protocol module - envelopes, error codes, and topic derivation.
//!
//! This module defines everything that crosses the wire:
//! - JSON-RPC-flavored request/response envelopes
//! - The structured `{code, message, data}` error triple and reserved codes
//! - The `syn:`/`ack:` topic scheme and the reserved handshake name

mod envelope;
mod topic;

pub use envelope::{
    codes, CallId, RequestEnvelope, ResponseEnvelope, WireError, PROTOCOL_VERSION,
};
pub use topic::{
    handshake_method, MethodName, ACK_PREFIX, HANDSHAKE_METHOD, SYN_PREFIX,
};
