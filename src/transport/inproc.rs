//! In-process transport over tokio channels.
//!
//! [`InProcTransport::pair`] yields two linked endpoints; everything emitted
//! on one side is delivered to subscribers on the other. Each endpoint runs
//! a pump task that drains its inbound channel, so delivery between a pair
//! of endpoints is in publish order.
//!
//! Endpoints must be created inside a Tokio runtime.
//!
//! # Example
//!
//! ```ignore
//! use tandem_rpc::transport::{InProcTransport, Transport};
//!
//! let (a, b) = InProcTransport::pair();
//! b.on("greet", std::sync::Arc::new(|payload| println!("{payload}")));
//! a.emit("greet", serde_json::json!("hello"));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::adapter::{ErrorHandler, ListenerId, TopicHandler, Transport, Undelivered};
use crate::protocol::WireError;

/// One message crossing between endpoints.
struct Delivery {
    topic: String,
    payload: Value,
}

/// A registered topic subscription.
struct Listener {
    id: ListenerId,
    callback: TopicHandler,
}

/// State shared between an endpoint handle and its pump task.
struct Shared {
    topics: Mutex<HashMap<String, Vec<Listener>>>,
    onerror: Mutex<Option<ErrorHandler>>,
    outbound: UnboundedSender<Delivery>,
    next_listener: AtomicU64,
    destroyed: AtomicBool,
}

impl Shared {
    /// Hand an inbound payload to the topic's subscribers.
    fn deliver(&self, topic: String, payload: Value) {
        // Snapshot callbacks so a handler can subscribe or unsubscribe
        // without deadlocking against the topic table.
        let callbacks: Vec<TopicHandler> = {
            let topics = self.topics.lock();
            topics
                .get(&topic)
                .map(|listeners| {
                    listeners
                        .iter()
                        .map(|listener| Arc::clone(&listener.callback))
                        .collect()
                })
                .unwrap_or_default()
        };

        if callbacks.is_empty() {
            self.report_unrouted(topic, payload);
            return;
        }

        tracing::trace!("Delivering to {} listener(s) on {}", callbacks.len(), topic);
        for callback in &callbacks {
            callback(payload.clone());
        }
    }

    /// Report a payload that arrived for a topic with no subscribers.
    fn report_unrouted(&self, topic: String, payload: Value) {
        let handler = self.onerror.lock().clone();
        let Some(handler) = handler else {
            tracing::debug!("Dropping payload for silent topic {}", topic);
            return;
        };

        let report = Undelivered {
            topic: topic.clone(),
            payload,
        };
        let data = serde_json::to_value(&report).unwrap_or(Value::Null);
        handler(WireError::method_not_found(&topic).with_data(data));
    }
}

/// One endpoint of an in-process transport pair.
pub struct InProcTransport {
    shared: Arc<Shared>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl InProcTransport {
    /// Create two linked endpoints.
    pub fn pair() -> (Self, Self) {
        let (a_to_b, from_a) = mpsc::unbounded_channel();
        let (b_to_a, from_b) = mpsc::unbounded_channel();
        (
            Self::endpoint(a_to_b, from_b),
            Self::endpoint(b_to_a, from_a),
        )
    }

    fn endpoint(outbound: UnboundedSender<Delivery>, inbound: UnboundedReceiver<Delivery>) -> Self {
        let shared = Arc::new(Shared {
            topics: Mutex::new(HashMap::new()),
            onerror: Mutex::new(None),
            outbound,
            next_listener: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
        });
        let pump = tokio::spawn(pump(Arc::clone(&shared), inbound));
        Self {
            shared,
            pump: Mutex::new(Some(pump)),
        }
    }

    /// Number of live subscriptions on a topic.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.shared
            .topics
            .lock()
            .get(topic)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }
}

/// Drain the inbound channel until the peer hangs up or we are destroyed.
async fn pump(shared: Arc<Shared>, mut inbound: UnboundedReceiver<Delivery>) {
    while let Some(delivery) = inbound.recv().await {
        // destroy() can race the dequeue; drop anything already pulled.
        if shared.destroyed.load(Ordering::SeqCst) {
            break;
        }
        shared.deliver(delivery.topic, delivery.payload);
    }
}

impl Transport for InProcTransport {
    fn emit(&self, topic: &str, payload: Value) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return;
        }
        // The peer may already be gone; emit stays fire-and-forget.
        let _ = self.shared.outbound.send(Delivery {
            topic: topic.to_string(),
            payload,
        });
    }

    fn on(&self, topic: &str, handler: TopicHandler) -> ListenerId {
        let id = ListenerId::new(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared
            .topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(Listener {
                id,
                callback: handler,
            });
        id
    }

    fn off(&self, topic: &str, listener: Option<ListenerId>) {
        let mut topics = self.shared.topics.lock();
        match listener {
            Some(id) => {
                if let Some(listeners) = topics.get_mut(topic) {
                    listeners.retain(|entry| entry.id != id);
                    if listeners.is_empty() {
                        topics.remove(topic);
                    }
                }
            }
            None => {
                topics.remove(topic);
            }
        }
    }

    fn set_onerror(&self, handler: Option<ErrorHandler>) {
        *self.shared.onerror.lock() = handler;
    }

    fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.shared.topics.lock().clear();
        *self.shared.onerror.lock() = None;
        tracing::debug!("In-proc endpoint destroyed");
    }
}

impl Drop for InProcTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codes;
    use serde_json::json;
    use std::time::Duration;

    fn capture() -> (TopicHandler, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: TopicHandler = Arc::new(move |payload| {
            let _ = tx.send(payload);
        });
        (handler, rx)
    }

    #[tokio::test]
    async fn test_emit_reaches_peer_listener() {
        let (a, b) = InProcTransport::pair();
        let (handler, mut rx) = capture();
        b.on("greet", handler);

        a.emit("greet", json!("hello"));
        assert_eq!(rx.recv().await, Some(json!("hello")));
    }

    #[tokio::test]
    async fn test_delivery_is_in_publish_order() {
        let (a, b) = InProcTransport::pair();
        let (handler, mut rx) = capture();
        b.on("seq", handler);

        for n in 0..4 {
            a.emit("seq", json!(n));
        }
        for n in 0..4 {
            assert_eq!(rx.recv().await, Some(json!(n)));
        }
    }

    #[tokio::test]
    async fn test_every_listener_sees_the_payload() {
        let (a, b) = InProcTransport::pair();
        let (first, mut first_rx) = capture();
        let (second, mut second_rx) = capture();
        b.on("fan", first);
        b.on("fan", second);

        a.emit("fan", json!(1));
        assert_eq!(first_rx.recv().await, Some(json!(1)));
        assert_eq!(second_rx.recv().await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_off_removes_one_subscription() {
        let (a, b) = InProcTransport::pair();
        let (first, mut first_rx) = capture();
        let (second, mut second_rx) = capture();
        let first_id = b.on("fan", first);
        b.on("fan", second);

        b.off("fan", Some(first_id));
        assert_eq!(b.listener_count("fan"), 1);

        a.emit("fan", json!(2));
        assert_eq!(second_rx.recv().await, Some(json!(2)));
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_off_none_clears_the_topic() {
        let (_a, b) = InProcTransport::pair();
        let (first, _first_rx) = capture();
        let (second, _second_rx) = capture();
        b.on("fan", first);
        b.on("fan", second);

        b.off("fan", None);
        assert_eq!(b.listener_count("fan"), 0);

        // Stale handles and unknown topics are ignored.
        b.off("fan", Some(ListenerId::new(99)));
        b.off("never-subscribed", None);
    }

    #[tokio::test]
    async fn test_unrouted_payload_reaches_error_slot() {
        let (a, b) = InProcTransport::pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        b.set_onerror(Some(Arc::new(move |error: WireError| {
            let _ = tx.send(error);
        })));

        a.emit("syn:missing", json!({"k": 1}));

        let error = rx.recv().await.unwrap();
        assert_eq!(error.code, codes::METHOD_NOT_FOUND);

        let report: Undelivered = serde_json::from_value(error.data).unwrap();
        assert_eq!(report.topic, "syn:missing");
        assert_eq!(report.payload, json!({"k": 1}));
    }

    #[tokio::test]
    async fn test_handler_can_emit_back() {
        let (a, b) = InProcTransport::pair();
        let (reply, mut reply_rx) = capture();
        a.on("pong", reply);

        let b_shared = Arc::clone(&b.shared);
        b.on(
            "ping",
            Arc::new(move |payload| {
                let _ = b_shared.outbound.send(Delivery {
                    topic: "pong".to_string(),
                    payload,
                });
            }),
        );

        a.emit("ping", json!("echo"));
        assert_eq!(reply_rx.recv().await, Some(json!("echo")));
    }

    #[tokio::test]
    async fn test_destroy_stops_delivery() {
        let (a, b) = InProcTransport::pair();
        let (handler, mut rx) = capture();
        b.on("greet", handler);

        b.destroy();
        a.emit("greet", json!("late"));

        let outcome = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(outcome.is_err() || outcome == Ok(None));

        // Emitting from a destroyed endpoint is a quiet no-op.
        b.emit("greet", json!("ignored"));
        b.destroy();
    }
}
