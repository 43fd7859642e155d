//! Method registry.
//!
//! Maps registered method names to the transport listener serving each one,
//! so removal and teardown can unsubscribe exactly the listener they
//! installed. Dispatch itself happens inside the per-method listener; the
//! registry only answers "is this name taken, and which subscription backs
//! it".

use std::collections::HashMap;

use crate::protocol::MethodName;
use crate::transport::ListenerId;

/// Registered methods and the request listener backing each one.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: HashMap<MethodName, ListenerId>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Check whether a method name is registered.
    #[inline]
    pub fn contains(&self, name: &MethodName) -> bool {
        self.methods.contains_key(name)
    }

    /// Record a method and its request listener.
    ///
    /// Callers check [`contains`](Self::contains) first; inserting over an
    /// existing entry would orphan its listener.
    pub fn insert(&mut self, name: MethodName, listener: ListenerId) {
        let previous = self.methods.insert(name, listener);
        debug_assert!(previous.is_none(), "method registered twice");
    }

    /// Remove a method, returning its listener so the caller can unsubscribe.
    pub fn remove(&mut self, name: &MethodName) -> Option<ListenerId> {
        self.methods.remove(name)
    }

    /// Take every entry, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<(MethodName, ListenerId)> {
        self.methods.drain().collect()
    }

    /// Number of registered methods.
    #[inline]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if no methods are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
