//! Engine builder and call lifecycle.
//!
//! The [`RpcBuilder`] configures method handlers and the default call
//! timeout; [`build`](RpcBuilder::build) wires the engine onto its
//! transport. An outbound call then runs through:
//! 1. Park a waiter in the pending table under a fresh correlation ID
//! 2. Subscribe to the method's reply topic
//! 3. Emit the request envelope on `syn:<method>`
//! 4. Settle on response, deadline, or teardown
//!
//! Both peers are symmetric: each side registers methods, each side calls.
//! The connection handshake rides the same topics under a reserved method
//! name, so a transport needs no special setup beyond `emit`/`on`.
//!
//! # Example
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
//!     let calculator = Rpc::builder(Arc::new(left))
//!         .method("add", |terms: [i64; 2]| async move {
//!             Ok::<_, WireError>(terms[0] + terms[1])
//!         })
//!         .build()?;
//!
//!     let client = Rpc::builder(Arc::new(right))
//!         .timeout(Duration::from_secs(2))
//!         .build()?;
//!
//!     tokio::try_join!(calculator.connect(), client.connect())?;
//!
//!     let sum: i64 = client.call("add", &[2, 3]).await?;
//!     assert_eq!(sum, 5);
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Result, RpcError};
use crate::handler::{MethodHandler, MethodRegistry, TypedHandler};
use crate::pending::PendingCalls;
use crate::protocol::{
    handshake_method, CallId, MethodName, RequestEnvelope, ResponseEnvelope, WireError,
};
use crate::transport::{ListenerId, TopicHandler, Transport, Undelivered};

/// Per-call options for [`Rpc::invoke`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InvokeOptions {
    /// Fire-and-forget: emit the request without an ID and do not wait.
    pub notify: bool,
    /// Deadline overriding the engine's default call timeout.
    pub timeout: Option<Duration>,
}

/// Where a finished handshake landed.
#[derive(Debug, Clone, Copy)]
enum HandshakeOutcome {
    /// Peer acknowledged; the link is up.
    Connected,
    /// The deadline elapsed before the peer answered.
    TimedOut(Duration),
    /// The engine was destroyed while waiting.
    Closed,
}

impl HandshakeOutcome {
    fn into_result(self) -> Result<()> {
        match self {
            Self::Connected => Ok(()),
            Self::TimedOut(deadline) => Err(RpcError::Timeout(deadline)),
            Self::Closed => Err(RpcError::Closed),
        }
    }
}

/// Handshake progress for this endpoint.
enum ConnectPhase {
    /// No connect call yet.
    Idle,
    /// Listeners installed, outcome not yet known.
    Pending {
        syn_listener: ListenerId,
        ack_listener: ListenerId,
        waiters: Vec<oneshot::Sender<HandshakeOutcome>>,
    },
    /// Outcome cached; later connect calls reuse it. The listeners stay
    /// subscribed so a peer arriving late still gets its acknowledgement.
    Done {
        syn_listener: ListenerId,
        ack_listener: ListenerId,
        outcome: HandshakeOutcome,
    },
}

/// State shared by the engine handle and every callback it installs.
struct RpcShared {
    /// The channel this engine runs over.
    transport: Arc<dyn Transport>,
    /// Registered methods and their request listeners.
    registry: Mutex<MethodRegistry>,
    /// In-flight outbound calls.
    pending: PendingCalls,
    /// Handshake state machine.
    connect: Mutex<ConnectPhase>,
    /// Deadline applied to calls that carry none of their own.
    default_timeout: Option<Duration>,
    /// Set once by destroy; never cleared.
    destroyed: AtomicBool,
}

impl RpcShared {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Move the handshake to `Done`, waking every parked connect call.
    ///
    /// First resolution wins; later calls find `Done` and leave the cached
    /// outcome alone.
    fn resolve_handshake(&self, outcome: HandshakeOutcome) {
        let waiters = {
            let mut phase = self.connect.lock();
            match std::mem::replace(&mut *phase, ConnectPhase::Idle) {
                ConnectPhase::Pending {
                    syn_listener,
                    ack_listener,
                    waiters,
                } => {
                    *phase = ConnectPhase::Done {
                        syn_listener,
                        ack_listener,
                        outcome,
                    };
                    waiters
                }
                other => {
                    *phase = other;
                    return;
                }
            }
        };
        // Waiters are woken outside the lock.
        for waiter in waiters {
            let _ = waiter.send(outcome);
        }
    }

    /// Cached handshake outcome, if the handshake has finished.
    fn handshake_outcome(&self) -> Option<HandshakeOutcome> {
        match &*self.connect.lock() {
            ConnectPhase::Done { outcome, .. } => Some(*outcome),
            _ => None,
        }
    }

    /// Subscribe a handler under its method name.
    fn register_erased(&self, name: MethodName, handler: Box<dyn MethodHandler>) -> Result<()> {
        if name.is_reserved() {
            return Err(RpcError::ReservedMethod(name.as_str().to_string()));
        }

        let handler: Arc<dyn MethodHandler> = Arc::from(handler);
        let mut registry = self.registry.lock();
        if self.is_destroyed() {
            return Err(RpcError::Closed);
        }
        if registry.contains(&name) {
            return Err(RpcError::DuplicateMethod(name.as_str().to_string()));
        }
        let listener = self.transport.on(
            &name.syn_topic(),
            method_callback(name.clone(), handler, Arc::clone(&self.transport)),
        );
        registry.insert(name, listener);
        Ok(())
    }

    /// Tear everything down. Idempotent.
    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.resolve_handshake(HandshakeOutcome::Closed);
        let handshake_listeners = match &*self.connect.lock() {
            ConnectPhase::Done {
                syn_listener,
                ack_listener,
                ..
            } => Some((*syn_listener, *ack_listener)),
            _ => None,
        };
        if let Some((syn_listener, ack_listener)) = handshake_listeners {
            let handshake = handshake_method();
            self.transport.off(&handshake.syn_topic(), Some(syn_listener));
            self.transport.off(&handshake.ack_topic(), Some(ack_listener));
        }

        let registered = self.registry.lock().drain();
        for (name, listener) in registered {
            self.transport.off(&name.syn_topic(), Some(listener));
        }

        // Waiting callers see their channel close and report teardown.
        self.pending.clear();
        self.transport.set_onerror(None);
        self.transport.destroy();
        tracing::debug!("Engine destroyed");
    }
}

/// Build the request-topic callback serving one registered method.
fn method_callback(
    name: MethodName,
    handler: Arc<dyn MethodHandler>,
    transport: Arc<dyn Transport>,
) -> TopicHandler {
    Arc::new(move |payload: Value| {
        let request: RequestEnvelope = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Discarding malformed request on {}: {}", name.syn_topic(), e);
                return;
            }
        };

        let fut = handler.call(request.params);

        let Some(id) = request.id else {
            // Notification: run the handler, nobody hears the outcome.
            let name = name.clone();
            tokio::spawn(async move {
                if let Err(e) = fut.await {
                    tracing::debug!("Notification handler for {} failed: {}", name, e);
                }
            });
            return;
        };

        let reply_topic = name.ack_topic();
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            let response = match fut.await {
                Ok(result) => ResponseEnvelope::success(id, result),
                Err(error) => ResponseEnvelope::failure(id, error),
            };
            match serde_json::to_value(&response) {
                Ok(payload) => transport.emit(&reply_topic, payload),
                Err(e) => tracing::warn!("Could not encode response on {}: {}", reply_topic, e),
            }
        });
    })
}

/// Build the reply-topic callback for one outstanding call.
fn response_callback(id: CallId, shared: Arc<RpcShared>) -> TopicHandler {
    Arc::new(move |payload: Value| {
        let response: ResponseEnvelope = match serde_json::from_value(payload) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Discarding malformed response: {}", e);
                return;
            }
        };
        // Replies to other calls on the same method share this topic.
        if response.id.as_ref() != Some(&id) {
            return;
        }
        if !shared.pending.settle(&id, response.into_outcome()) {
            tracing::debug!("Discarding response for settled call {}", id);
        }
    })
}

/// Point the transport's error slot at the unrouted-payload router.
fn install_onerror(transport: &Arc<dyn Transport>) {
    let inner = Arc::clone(transport);
    transport.set_onerror(Some(Arc::new(move |error: WireError| {
        route_unrouted(&inner, error);
    })));
}

/// Answer or log a payload the transport could not route.
///
/// A stranded request that carries an ID gets a synthesized error response
/// on its reply topic, so the caller fails fast instead of waiting out its
/// deadline. Everything else is only logged.
fn route_unrouted(transport: &Arc<dyn Transport>, error: WireError) {
    let report: Undelivered = match serde_json::from_value(error.data.clone()) {
        Ok(report) => report,
        Err(_) => {
            tracing::warn!("Transport error: {}", error);
            return;
        }
    };

    // Try the request shape first. A response would be rejected here for
    // lacking `method`, while a request also passes for the response shape
    // because that one is all-optional.
    if let Ok(request) = serde_json::from_value::<RequestEnvelope>(report.payload.clone()) {
        let Some(id) = request.id.clone() else {
            tracing::debug!("Dropping notification for silent topic {}", report.topic);
            return;
        };
        let reply_topic = MethodName::from(request.method.as_str()).ack_topic();
        let data = serde_json::to_value(&request).unwrap_or(Value::Null);
        let response = ResponseEnvelope::failure(
            id,
            WireError::new(error.code, error.message.clone()).with_data(data),
        );
        match serde_json::to_value(&response) {
            Ok(payload) => transport.emit(&reply_topic, payload),
            Err(e) => tracing::warn!("Could not encode rejection on {}: {}", reply_topic, e),
        }
        return;
    }

    if serde_json::from_value::<ResponseEnvelope>(report.payload.clone()).is_ok() {
        tracing::debug!("Dropping orphaned response on {}", report.topic);
        return;
    }

    tracing::warn!("Undeliverable payload on {}", report.topic);
}

/// A bidirectional RPC endpoint bound to one transport.
///
/// Dropping the engine tears it down; see [`destroy`](Rpc::destroy).
pub struct Rpc {
    shared: Arc<RpcShared>,
}

impl Rpc {
    /// Create a builder over the given transport.
    pub fn builder(transport: Arc<dyn Transport>) -> RpcBuilder {
        RpcBuilder::new(transport)
    }

    /// Register a method handler.
    ///
    /// Fails synchronously if the name is reserved or already taken; an
    /// existing registration is left untouched.
    pub fn register_method<F, P, R, Fut>(
        &self,
        method: impl Into<MethodName>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize,
        Fut: Future<Output = std::result::Result<R, WireError>> + Send + 'static,
    {
        if self.shared.is_destroyed() {
            return Err(RpcError::Closed);
        }
        self.shared
            .register_erased(method.into(), Box::new(TypedHandler::new(handler)))
    }

    /// Unregister a method and release its request listener.
    ///
    /// Removing a name that was never registered is a no-op.
    pub fn remove_method(&self, method: impl Into<MethodName>) {
        let name = method.into();
        let listener = self.shared.registry.lock().remove(&name);
        if let Some(listener) = listener {
            self.shared.transport.off(&name.syn_topic(), Some(listener));
        }
    }

    /// Send a request (or notification) with raw JSON params.
    ///
    /// The typed wrappers [`call`](Rpc::call) and [`notify`](Rpc::notify)
    /// cover most uses; this is the full-control variant.
    pub async fn invoke(
        &self,
        method: impl Into<MethodName>,
        params: Value,
        options: InvokeOptions,
    ) -> Result<Value> {
        let name = method.into();
        if self.shared.is_destroyed() {
            return Err(RpcError::Closed);
        }
        if name.is_reserved() {
            return Err(RpcError::ReservedMethod(name.as_str().to_string()));
        }

        if options.notify {
            let envelope = RequestEnvelope::notification(name.as_str(), params);
            let payload = serde_json::to_value(&envelope)?;
            self.shared.transport.emit(&name.syn_topic(), payload);
            return Ok(Value::Null);
        }

        let id = CallId::fresh();
        // Waiter goes in before the request leaves, so a response cannot
        // slip past between emit and subscribe.
        let rx = self.shared.pending.register(id.clone());
        let reply_topic = name.ack_topic();
        let listener = self.shared.transport.on(
            &reply_topic,
            response_callback(id.clone(), Arc::clone(&self.shared)),
        );
        if self.shared.is_destroyed() {
            // destroy() raced the bookkeeping above and cannot have seen
            // it; close out the call here.
            self.shared.transport.off(&reply_topic, Some(listener));
            self.shared.pending.remove(&id);
            return Err(RpcError::Closed);
        }

        let envelope = RequestEnvelope::call(name.as_str(), params, id.clone());
        let outcome = match serde_json::to_value(&envelope) {
            Ok(payload) => {
                self.shared.transport.emit(&name.syn_topic(), payload);

                let deadline = options.timeout.or(self.shared.default_timeout);
                match deadline {
                    Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                        Ok(Ok(outcome)) => outcome.map_err(RpcError::from),
                        Ok(Err(_)) => Err(RpcError::Closed),
                        Err(_) => {
                            self.shared.pending.expire(&id);
                            Err(RpcError::Timeout(deadline))
                        }
                    },
                    None => match rx.await {
                        Ok(outcome) => outcome.map_err(RpcError::from),
                        Err(_) => Err(RpcError::Closed),
                    },
                }
            }
            Err(e) => Err(RpcError::Json(e)),
        };

        self.shared.transport.off(&reply_topic, Some(listener));
        self.shared.pending.remove(&id);
        outcome
    }

    /// Call a method with typed params and result.
    pub async fn call<P, R>(&self, method: impl Into<MethodName>, params: &P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.invoke(method, params, InvokeOptions::default()).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Call a method with an explicit deadline.
    pub async fn call_with_timeout<P, R>(
        &self,
        method: impl Into<MethodName>,
        params: &P,
        deadline: Duration,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let options = InvokeOptions {
            notify: false,
            timeout: Some(deadline),
        };
        let result = self.invoke(method, params, options).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Send a notification: no correlation ID, no response, no deadline.
    pub async fn notify<P>(&self, method: impl Into<MethodName>, params: &P) -> Result<()>
    where
        P: Serialize,
    {
        let params = serde_json::to_value(params)?;
        let options = InvokeOptions {
            notify: true,
            timeout: None,
        };
        self.invoke(method, params, options).await?;
        Ok(())
    }

    /// Perform the connection handshake.
    ///
    /// The engine's default call timeout bounds the wait when one is set;
    /// without one this waits as long as it takes. The first call installs
    /// the handshake listeners and announces this endpoint; concurrent and
    /// later calls share the first call's outcome, including a cached
    /// failure.
    pub async fn connect(&self) -> Result<()> {
        self.connect_inner(None).await
    }

    /// Perform the connection handshake with a deadline.
    ///
    /// Only the first connect call arms the timer; see [`connect`](Rpc::connect).
    pub async fn connect_with_timeout(&self, deadline: Duration) -> Result<()> {
        self.connect_inner(Some(deadline)).await
    }

    async fn connect_inner(&self, deadline: Option<Duration>) -> Result<()> {
        if self.shared.is_destroyed() {
            return Err(RpcError::Closed);
        }
        let deadline = deadline.or(self.shared.default_timeout);

        let handshake = handshake_method();
        let (rx, first) = {
            let mut phase = self.shared.connect.lock();
            match &mut *phase {
                ConnectPhase::Done { outcome, .. } => return outcome.into_result(),
                ConnectPhase::Pending { waiters, .. } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    (rx, false)
                }
                ConnectPhase::Idle => {
                    let ack_shared = Arc::clone(&self.shared);
                    let ack_listener = self.shared.transport.on(
                        &handshake.ack_topic(),
                        Arc::new(move |_payload| {
                            ack_shared.resolve_handshake(HandshakeOutcome::Connected);
                        }),
                    );
                    let syn_shared = Arc::clone(&self.shared);
                    let syn_listener = self.shared.transport.on(
                        &handshake.syn_topic(),
                        Arc::new(move |_payload| {
                            // Acknowledge first so a peer blocked on its own
                            // handshake unblocks, then resolve our side.
                            let handshake = handshake_method();
                            syn_shared
                                .transport
                                .emit(&handshake.ack_topic(), Value::Null);
                            syn_shared.resolve_handshake(HandshakeOutcome::Connected);
                        }),
                    );
                    let (tx, rx) = oneshot::channel();
                    *phase = ConnectPhase::Pending {
                        syn_listener,
                        ack_listener,
                        waiters: vec![tx],
                    };
                    (rx, true)
                }
            }
        };

        if first {
            if self.shared.is_destroyed() {
                // destroy() raced the installation above; close out the
                // phase it never saw.
                self.shared.resolve_handshake(HandshakeOutcome::Closed);
            } else {
                self.shared
                    .transport
                    .emit(&handshake.syn_topic(), Value::Null);
            }
        }

        let outcome = match (first, deadline) {
            (true, Some(deadline)) => match tokio::time::timeout(deadline, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => HandshakeOutcome::Closed,
                Err(_) => {
                    self.shared
                        .resolve_handshake(HandshakeOutcome::TimedOut(deadline));
                    // First resolution wins; reread in case the peer made it
                    // just under the wire.
                    self.shared
                        .handshake_outcome()
                        .unwrap_or(HandshakeOutcome::Closed)
                }
            },
            _ => rx.await.unwrap_or(HandshakeOutcome::Closed),
        };

        outcome.into_result()
    }

    /// Whether the handshake has completed successfully.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.shared.handshake_outcome(),
            Some(HandshakeOutcome::Connected)
        )
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Number of registered methods.
    pub fn method_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Tear the engine down.
    ///
    /// Unsubscribes every listener, fails in-flight calls and parked
    /// connect calls, clears the transport error slot, and destroys the
    /// transport. Idempotent; every later operation reports closure.
    pub fn destroy(&self) {
        self.shared.destroy();
    }
}

impl Drop for Rpc {
    fn drop(&mut self) {
        self.shared.destroy();
    }
}

/// Builder for configuring and wiring an [`Rpc`] engine.
pub struct RpcBuilder {
    transport: Arc<dyn Transport>,
    default_timeout: Option<Duration>,
    methods: Vec<(MethodName, Box<dyn MethodHandler>)>,
}

impl RpcBuilder {
    /// Create a builder over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            default_timeout: None,
            methods: Vec::new(),
        }
    }

    /// Default deadline for calls that carry none of their own.
    ///
    /// Without a default, such calls wait indefinitely.
    pub fn timeout(mut self, deadline: Duration) -> Self {
        self.default_timeout = Some(deadline);
        self
    }

    /// Queue a method handler for registration.
    pub fn method<F, P, R, Fut>(mut self, name: impl Into<MethodName>, handler: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize,
        Fut: Future<Output = std::result::Result<R, WireError>> + Send + 'static,
    {
        self.methods
            .push((name.into(), Box::new(TypedHandler::new(handler))));
        self
    }

    /// Wire the engine onto its transport.
    ///
    /// Fails if a queued method name is reserved or appears twice; the
    /// partially built engine is torn down again in that case.
    pub fn build(self) -> Result<Rpc> {
        let shared = Arc::new(RpcShared {
            transport: self.transport,
            registry: Mutex::new(MethodRegistry::new()),
            pending: PendingCalls::new(),
            connect: Mutex::new(ConnectPhase::Idle),
            default_timeout: self.default_timeout,
            destroyed: AtomicBool::new(false),
        });
        install_onerror(&shared.transport);

        let engine = Rpc { shared };
        for (name, handler) in self.methods {
            if let Err(error) = engine.shared.register_erased(name, handler) {
                engine.shared.destroy();
                return Err(error);
            }
        }
        Ok(engine)
    }
}
