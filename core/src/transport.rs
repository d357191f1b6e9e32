//! Outbound request-channel seam and the directory wire model.
//!
//! The runtime's channel pool and request/reply client are built over these
//! traits. A [`RequestChannel`] performs one correlated request/response
//! exchange against the backing directory service; a [`ChannelOpener`]
//! produces channels (the per-connection setup cost the pool exists to
//! amortize). Both are implemented by the messaging-transport collaborator,
//! outside this workspace.

use crate::record::QuerySpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures on the request/reply path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A channel could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// No correlated reply arrived within the deadline.
    #[error("Exchange timed out after {0:?}")]
    Timeout(Duration),
    /// The exchange itself failed (send error, broken channel, remote fault).
    #[error("Exchange failed: {0}")]
    Exchange(String),
    /// The remote answered with a reply of the wrong shape.
    #[error("Unexpected reply shape, expected {expected}")]
    UnexpectedReply {
        /// The reply variant the caller required.
        expected: &'static str,
    },
}

/// Kind of mutation requested from the backing store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// Persist a new record.
    Create,
    /// Replace an existing record.
    Update,
    /// Remove a record.
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Acknowledgement of a mutation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationAck {
    /// Whether the backing store accepted the mutation.
    pub accepted: bool,
    /// Optional store-side detail (rejection reason, new revision, ...).
    pub detail: Option<String>,
}

/// One typed request over a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoreRequest {
    /// Fetch records matching a specification.
    Query(QuerySpec),
    /// Apply a mutation to a serialized record.
    Mutate {
        /// The mutation verb.
        kind: MutationKind,
        /// The record, in wire form.
        record: serde_json::Value,
    },
}

/// The correlated reply to a [`StoreRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoreReply {
    /// Records matching a query, in store order.
    Records(Vec<serde_json::Value>),
    /// Acknowledgement of a mutation.
    Ack(MutationAck),
}

/// A reusable outbound channel performing one exchange at a time.
///
/// Exclusivity is enforced by the pool: a channel is only ever reachable
/// through a leased handle, so `exchange` takes `&mut self` without locking.
pub trait RequestChannel: Send {
    /// Send `request` and await its correlated reply.
    ///
    /// The caller applies the deadline; implementations should simply await
    /// the reply.
    fn exchange(
        &mut self,
        request: StoreRequest,
    ) -> Pin<Box<dyn Future<Output = Result<StoreReply, TransportError>> + Send + '_>>;
}

/// Produces request channels for the pool.
pub trait ChannelOpener: Send + Sync {
    /// Open a fresh channel.
    ///
    /// Failures here mean the transport cannot currently produce a resource
    /// and surface to callers as pool exhaustion.
    fn open(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn RequestChannel>, TransportError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_kind_display() {
        assert_eq!(MutationKind::Create.to_string(), "create");
        assert_eq!(MutationKind::Delete.to_string(), "delete");
    }

    #[test]
    fn transport_errors_compare_structurally() {
        assert_eq!(
            TransportError::UnexpectedReply { expected: "Records" },
            TransportError::UnexpectedReply { expected: "Records" },
        );
    }
}
