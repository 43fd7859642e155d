//! Transport adapter contract.
//!
//! The engine does not talk to sockets or pipes directly; it publishes and
//! subscribes on named topics through this interface. Anything that can
//! carry JSON values between two peers (channels, pipes, websockets, a
//! message bus) can back an engine by implementing [`Transport`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::WireError;

/// Callback invoked with each payload published to a subscribed topic.
pub type TopicHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Callback invoked with transport-level failures.
pub type ErrorHandler = Arc<dyn Fn(WireError) + Send + Sync>;

/// Opaque handle identifying one subscription on one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Create a listener handle from a raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value of the handle.
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A message that reached a topic nobody listens on.
///
/// Transports attach this as the `data` of the [`WireError`] they hand to
/// the error slot, so the engine can recover the stranded envelope and
/// answer on behalf of the missing listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Undelivered {
    /// Topic the message was published to.
    pub topic: String,
    /// Payload that went nowhere.
    pub payload: Value,
}

/// Topic-addressed message channel between two peers.
///
/// Expectations on implementations:
///
/// - [`emit`](Transport::emit) is fire-and-forget. It never blocks the
///   caller and never reports failure; a message with no subscriber on the
///   far side is not an error at the emitting end.
/// - [`on`](Transport::on) may be called many times for the same topic;
///   every registered handler sees every payload. Handlers run outside any
///   transport lock and may call back into the transport.
/// - [`off`](Transport::off) with a handle removes that one subscription;
///   with `None` it removes every subscription on the topic. Unknown topics
///   and stale handles are ignored.
/// - [`set_onerror`](Transport::set_onerror) installs the single error
///   slot, replacing any previous handler. When a payload arrives for a
///   topic with no listeners, the transport reports it through this slot
///   as a method-not-found [`WireError`] carrying an [`Undelivered`] in its
///   `data`.
/// - [`destroy`](Transport::destroy) releases transport resources. It is
///   optional; the default does nothing. After destroy, `emit` becomes a
///   no-op and no handler runs again.
pub trait Transport: Send + Sync {
    /// Publish a payload to a topic on the peer.
    fn emit(&self, topic: &str, payload: Value);

    /// Subscribe a handler to a topic, returning its handle.
    fn on(&self, topic: &str, handler: TopicHandler) -> ListenerId;

    /// Unsubscribe one handler, or all handlers on the topic when `listener`
    /// is `None`.
    fn off(&self, topic: &str, listener: Option<ListenerId>);

    /// Install or clear the error slot.
    fn set_onerror(&self, handler: Option<ErrorHandler>);

    /// Tear the transport down.
    fn destroy(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listener_id_equality() {
        assert_eq!(ListenerId::new(3), ListenerId::new(3));
        assert_ne!(ListenerId::new(3), ListenerId::new(4));
        assert_eq!(ListenerId::new(9).raw(), 9);
    }

    #[test]
    fn test_undelivered_shape() {
        let report = Undelivered {
            topic: "syn:add".to_string(),
            payload: json!({"method": "add"}),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["topic"], "syn:add");
        assert_eq!(value["payload"]["method"], "add");

        let back: Undelivered = serde_json::from_value(value).unwrap();
        assert_eq!(back.topic, "syn:add");
    }
}
