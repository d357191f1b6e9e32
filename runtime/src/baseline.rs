//! Optimistic concurrency check for Update requests.
//!
//! Two clients racing to update the same record must not silently overwrite
//! each other from stale reads. Before any update mutation, the
//! [`BaselineChecker`] re-queries the record's authoritative current state
//! over the same leased read path and compares it structurally against the
//! baseline snapshot the client supplied.
//!
//! The check and the mutation are two separate remote calls; the window
//! between them is accepted by design and the backing store's own
//! concurrency control is the final authority. This is a deliberate
//! weaker-than-serializable guarantee, not a defect.

use crate::client::{ClientError, RequestReplyClient};
use std::sync::Arc;
use steward_core::envelope::{ErrorCode, ErrorEntry};
use steward_core::record::{ProvisionedRecord, QuerySpec, RecordId};
use thiserror::Error;

/// Decision of a baseline check.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BaselineOutcome {
    /// Current state matches the baseline and the update changes something.
    Proceed,
    /// No current record exists to update against.
    Stale,
    /// The current record differs from the supplied baseline.
    Conflict,
    /// Baseline and new state are equal; there is nothing to update.
    NoOpRejected,
}

impl BaselineOutcome {
    /// The reply error entry for a non-[`Proceed`](Self::Proceed) outcome.
    #[must_use]
    pub fn rejection_entry(self) -> Option<ErrorEntry> {
        match self {
            Self::Proceed => None,
            Self::Stale => Some(ErrorEntry::application(
                ErrorCode::BaselineStale,
                "No current record exists to update against",
            )),
            Self::Conflict => Some(ErrorEntry::application(
                ErrorCode::BaselineConflict,
                "Baseline is stale; the record was modified by another request",
            )),
            Self::NoOpRejected => Some(ErrorEntry::application(
                ErrorCode::NoOpRejected,
                "Baseline and new state are equal; no update may be performed",
            )),
        }
    }
}

/// Failures while establishing the current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BaselineError {
    /// The current-state query failed.
    #[error("Baseline check could not fetch current state: {0}")]
    Query(#[from] ClientError),
    /// The identity query returned more than one record. This is a
    /// data-integrity problem in the backing store, not a client error.
    #[error("Identity query for {record_id} returned {count} records")]
    Ambiguous {
        /// The identity that matched more than once.
        record_id: RecordId,
        /// How many records matched.
        count: usize,
    },
}

impl BaselineError {
    /// Convert into a reply error entry with the matching stable code.
    #[must_use]
    pub fn to_entry(&self) -> ErrorEntry {
        match self {
            Self::Query(inner) => inner.to_entry(),
            Self::Ambiguous { .. } => {
                ErrorEntry::system(ErrorCode::AmbiguousBaseline, self.to_string())
            }
        }
    }
}

/// Optimistic-concurrency gate for update mutations.
pub struct BaselineChecker<R: ProvisionedRecord> {
    client: Arc<RequestReplyClient<R>>,
    object_type: String,
}

impl<R: ProvisionedRecord> BaselineChecker<R> {
    /// Create a checker querying through `client` for `object_type` records.
    #[must_use]
    pub fn new(client: Arc<RequestReplyClient<R>>, object_type: impl Into<String>) -> Self {
        Self {
            client,
            object_type: object_type.into(),
        }
    }

    /// Decide whether an update from `baseline` to `new_state` may proceed.
    ///
    /// Decision table, evaluated against the authoritative current record
    /// fetched by identity:
    ///
    /// | Current records | Comparison                         | Outcome        |
    /// |-----------------|------------------------------------|----------------|
    /// | 0               | any                                | `Stale`        |
    /// | 1               | `current != baseline`              | `Conflict`     |
    /// | 1               | `current == baseline == new_state` | `NoOpRejected` |
    /// | 1               | `current == baseline != new_state` | `Proceed`      |
    /// | > 1             | any                                | error          |
    ///
    /// # Errors
    ///
    /// - [`BaselineError::Query`] when current state cannot be fetched.
    /// - [`BaselineError::Ambiguous`] when the identity matches more than
    ///   one record.
    pub async fn check(
        &self,
        baseline: &R,
        new_state: &R,
    ) -> Result<BaselineOutcome, BaselineError> {
        let spec = QuerySpec::by_record_id(&self.object_type, &baseline.record_id());
        let mut current = self.client.query(&spec).await?;

        if current.len() > 1 {
            return Err(BaselineError::Ambiguous {
                record_id: baseline.record_id(),
                count: current.len(),
            });
        }
        let Some(current) = current.pop() else {
            return Ok(BaselineOutcome::Stale);
        };

        if current != *baseline {
            Ok(BaselineOutcome::Conflict)
        } else if baseline == new_state {
            Ok(BaselineOutcome::NoOpRejected)
        } else {
            Ok(BaselineOutcome::Proceed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proceed_has_no_rejection_entry() {
        assert!(BaselineOutcome::Proceed.rejection_entry().is_none());
    }

    #[test]
    fn rejections_carry_stable_codes() {
        let stale = BaselineOutcome::Stale.rejection_entry();
        let conflict = BaselineOutcome::Conflict.rejection_entry();
        let noop = BaselineOutcome::NoOpRejected.rejection_entry();
        assert_eq!(stale.map(|e| e.code), Some(ErrorCode::BaselineStale));
        assert_eq!(conflict.map(|e| e.code), Some(ErrorCode::BaselineConflict));
        assert_eq!(noop.map(|e| e.code), Some(ErrorCode::NoOpRejected));
    }

    #[test]
    fn rejection_entries_are_deterministic() {
        assert_eq!(
            BaselineOutcome::Conflict.rejection_entry(),
            BaselineOutcome::Conflict.rejection_entry()
        );
    }
}
