//! Synchronous request/response exchanges over pooled channels.
//!
//! A [`RequestReplyClient`] performs one exchange per call: lease a channel,
//! send a typed request, await the correlated reply or a timeout, decode the
//! result. The lease is held in a local binding whose drop returns the
//! channel on every exit path (success, transport error, timeout, decode
//! error), so no call path can leak or double-release a channel.

use crate::pool::{ChannelPool, PoolError};
use std::sync::Arc;
use std::time::Duration;
use steward_core::envelope::{ErrorCode, ErrorEntry};
use steward_core::record::{BuildError, ProvisionedRecord, QuerySpec, RecordBuilder};
use steward_core::transport::{MutationAck, MutationKind, StoreReply, StoreRequest, TransportError};
use thiserror::Error;

/// Default per-exchange timeout when neither the pool nor the caller
/// configures one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from a request/reply exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No channel could be leased.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// A query exchange failed at the transport (including timeout).
    #[error("Query failed: {source}")]
    QueryFailed {
        /// The underlying transport failure.
        source: TransportError,
    },
    /// A mutation exchange failed at the transport (including timeout).
    #[error("{kind} request failed: {source}")]
    MutationFailed {
        /// The mutation verb that failed.
        kind: MutationKind,
        /// The underlying transport failure.
        source: TransportError,
    },
    /// The store returned a record the builder could not decode.
    #[error("Cannot decode store record: {0}")]
    Decode(#[from] BuildError),
}

impl ClientError {
    /// Convert into a reply error entry with the matching stable code.
    ///
    /// All variants are system errors: the client only runs against the
    /// backing store, never on caller input.
    #[must_use]
    pub fn to_entry(&self) -> ErrorEntry {
        let code = match self {
            Self::Pool(_) => ErrorCode::PoolExhausted,
            Self::QueryFailed { .. } | Self::Decode(_) => ErrorCode::QueryFailed,
            Self::MutationFailed { .. } => ErrorCode::ProviderFailure,
        };
        ErrorEntry::system(code, self.to_string())
    }
}

/// Client for request/response exchanges against the backing directory.
///
/// Cloning is cheap; clones share the pool and builder.
pub struct RequestReplyClient<R: ProvisionedRecord> {
    pool: ChannelPool,
    builder: Arc<dyn RecordBuilder<R>>,
    default_timeout: Duration,
}

impl<R: ProvisionedRecord> Clone for RequestReplyClient<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            builder: Arc::clone(&self.builder),
            default_timeout: self.default_timeout,
        }
    }
}

impl<R: ProvisionedRecord> RequestReplyClient<R> {
    /// Create a client over a pool with the default timeout.
    #[must_use]
    pub fn new(pool: ChannelPool, builder: Arc<dyn RecordBuilder<R>>) -> Self {
        Self {
            pool,
            builder,
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the default per-exchange timeout.
    ///
    /// A pool-level `request_timeout` still takes precedence on leases that
    /// carry one.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Fetch records matching `spec`, preserving store order.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Pool`] when no channel can be leased.
    /// - [`ClientError::QueryFailed`] on transport failure, timeout, or a
    ///   reply of the wrong shape.
    /// - [`ClientError::Decode`] when a returned record cannot be built.
    pub async fn query(&self, spec: &QuerySpec) -> Result<Vec<R>, ClientError> {
        let mut lease = self.pool.lease().await?;
        let deadline = lease.request_timeout().unwrap_or(self.default_timeout);
        let reply = lease
            .exchange(StoreRequest::Query(spec.clone()), deadline)
            .await
            .map_err(|source| ClientError::QueryFailed { source })?;
        lease.release();

        match reply {
            StoreReply::Records(fragments) => fragments
                .iter()
                .map(|fragment| self.builder.build(fragment))
                .collect::<Result<Vec<_>, _>>()
                .map_err(ClientError::from),
            StoreReply::Ack(_) => Err(ClientError::QueryFailed {
                source: TransportError::UnexpectedReply {
                    expected: "Records",
                },
            }),
        }
    }

    /// Request a mutation and return the store's acknowledgement.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Pool`] when no channel can be leased.
    /// - [`ClientError::MutationFailed`] on transport failure, timeout, or a
    ///   reply of the wrong shape.
    pub async fn mutate(
        &self,
        kind: MutationKind,
        record: &R,
    ) -> Result<MutationAck, ClientError> {
        let mut lease = self.pool.lease().await?;
        let deadline = lease.request_timeout().unwrap_or(self.default_timeout);
        let reply = lease
            .exchange(
                StoreRequest::Mutate {
                    kind,
                    record: self.builder.to_wire(record),
                },
                deadline,
            )
            .await
            .map_err(|source| ClientError::MutationFailed { kind, source })?;
        lease.release();

        match reply {
            StoreReply::Ack(ack) => Ok(ack),
            StoreReply::Records(_) => Err(ClientError::MutationFailed {
                kind,
                source: TransportError::UnexpectedReply { expected: "Ack" },
            }),
        }
    }

    /// The pool backing this client.
    #[must_use]
    pub const fn pool(&self) -> &ChannelPool {
        &self.pool
    }
}
