//! Topic derivation from method names.
//!
//! Each method name maps to two topic strings: requests travel on
//! `syn:<name>`, responses on `ack:<name>`. The connection handshake runs
//! over the same mechanism under a reserved method name no user method may
//! claim.

use serde::{Deserialize, Serialize};

/// Prefix of request topics.
pub const SYN_PREFIX: &str = "syn:";

/// Prefix of response topics.
pub const ACK_PREFIX: &str = "ack:";

/// Reserved method name driving the connection handshake.
pub const HANDSHAKE_METHOD: &str = "__rpc_connect_event";

/// A registered (or registrable) method name.
///
/// Newtype over the raw string so topic derivation and the reservation check
/// live with the name itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodName(String);

impl MethodName {
    /// Wrap a raw method name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw name.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this name is reserved for the handshake.
    #[inline]
    pub fn is_reserved(&self) -> bool {
        self.0 == HANDSHAKE_METHOD
    }

    /// Topic this method's requests travel on.
    ///
    /// # Example
    ///
    /// ```
    /// use tandem_rpc::protocol::MethodName;
    ///
    /// assert_eq!(MethodName::new("add").syn_topic(), "syn:add");
    /// ```
    pub fn syn_topic(&self) -> String {
        format!("{SYN_PREFIX}{}", self.0)
    }

    /// Topic this method's responses travel on.
    ///
    /// # Example
    ///
    /// ```
    /// use tandem_rpc::protocol::MethodName;
    ///
    /// assert_eq!(MethodName::new("add").ack_topic(), "ack:add");
    /// ```
    pub fn ack_topic(&self) -> String {
        format!("{ACK_PREFIX}{}", self.0)
    }
}

impl From<&str> for MethodName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for MethodName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for MethodName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The method name the handshake topics derive from.
#[inline]
pub fn handshake_method() -> MethodName {
    MethodName::new(HANDSHAKE_METHOD)
}
