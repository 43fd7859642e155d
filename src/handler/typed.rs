//! Handler trait and serde-typed adapter.
//!
//! Registered handlers are stored as erased [`MethodHandler`] trait objects
//! so the registry can hold any parameter/result shape behind one interface.
//! [`TypedHandler`] wraps an async closure over concrete serde types and does
//! the (de)serialization at the boundary; decode and encode failures become
//! application-error [`WireError`]s instead of crashing the dispatch path.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::protocol::WireError;

/// Result of a method handler, after result serialization.
pub type HandlerResult = std::result::Result<Value, WireError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for erased method handlers.
pub trait MethodHandler: Send + Sync + 'static {
    /// Handle a request with its raw params value.
    fn call(&self, params: Value) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that deserializes params before calling the handler and
/// serializes the result after it.
pub struct TypedHandler<F, P, Fut> {
    handler: F,
    _phantom: PhantomData<fn(P) -> Fut>,
}

impl<F, P, Fut> TypedHandler<F, P, Fut> {
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, P, R, Fut> MethodHandler for TypedHandler<F, P, Fut>
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize,
    Fut: Future<Output = std::result::Result<R, WireError>> + Send + 'static,
{
    fn call(&self, params: Value) -> BoxFuture<'static, HandlerResult> {
        let parsed: P = match serde_json::from_value(params) {
            Ok(value) => value,
            Err(err) => {
                let error = WireError::application(format!("invalid params: {err}"));
                return Box::pin(async move { Err(error) });
            }
        };

        let fut = (self.handler)(parsed);
        Box::pin(async move {
            let result = fut.await?;
            serde_json::to_value(result)
                .map_err(|err| WireError::application(format!("unencodable result: {err}")))
        })
    }
}
