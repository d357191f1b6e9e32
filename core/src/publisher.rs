//! Sync-event publication seam.
//!
//! After a successful mutation the dispatcher publishes a create/update/
//! delete notification for interested subscribers. Publication is
//! fire-and-forget with respect to the mutation: it happens strictly after
//! the provider commit and independently of the reply path. A publish
//! failure is never silently dropped (see the dispatcher's sync-failure
//! policy).
//!
//! A deployment may run without a publisher; the dispatcher then skips
//! publication and says so once at construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// What happened to the record a sync event describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncKind {
    /// A record was created (Create or Generate flow).
    Created,
    /// A record was updated past a baseline check.
    Updated,
    /// A record was deleted.
    Deleted,
}

impl SyncKind {
    /// Stable wire name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post-mutation notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// The object kind the record belongs to.
    pub object_type: String,
    /// Identity of the affected record, when the builder exposes one.
    pub record_id: Option<String>,
    /// Serialized record as it stood after the mutation.
    pub body: serde_json::Value,
    /// When the dispatcher observed the successful mutation.
    pub occurred_at: DateTime<Utc>,
}

/// Failure to publish a sync event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The messaging transport rejected or timed out the publication.
    #[error("Sync publish failed for {object_type}: {reason}")]
    Transport {
        /// Object kind of the event that failed.
        object_type: String,
        /// Transport-reported reason.
        reason: String,
    },
}

/// Publisher seam for sync notifications.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the dispatcher can hold
/// `Arc<dyn SyncPublisher>`.
pub trait SyncPublisher: Send + Sync {
    /// Publish one notification.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the transport cannot accept the event.
    /// The mutation the event describes has already committed; callers decide
    /// whether to escalate or fail the reply. Dropping the error is not an
    /// option.
    fn publish(
        &self,
        kind: SyncKind,
        event: &SyncEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(SyncKind::Created.as_str(), "created");
        assert_eq!(SyncKind::Updated.to_string(), "updated");
        assert_eq!(SyncKind::Deleted.as_str(), "deleted");
    }
}
