//! Domain record abstraction and query specifications.
//!
//! The core never looks inside a provisioned object. It needs exactly two
//! things from one: an identity to re-query current state by, and structural
//! equality for the baseline comparison. Everything else (fields, schema,
//! wire shape) belongs to the object-builder collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `RecordId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid record ID: {0}")]
pub struct ParseRecordIdError(String);

/// Unique identifier of a provisioned record.
///
/// A newtype over `String` (type safety, clear signatures, serializable).
/// `FromStr` validates external input (rejects empty); `new()`/`From` accept
/// application-controlled data unchecked.
///
/// # Examples
///
/// ```
/// use steward_core::record::RecordId;
///
/// let id = RecordId::new("acct-20441");
/// assert_eq!(id.as_str(), "acct-20441");
///
/// let parsed: RecordId = "vpc-0a1b".parse().unwrap();
/// assert_eq!(parsed, RecordId::new("vpc-0a1b"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new `RecordId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the record ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `RecordId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = ParseRecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseRecordIdError("Record ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A domain object as the command core sees it.
///
/// Structural equality (`PartialEq`) is the baseline-comparison operation;
/// [`record_id`](Self::record_id) keys the current-state query. The two
/// mutators support the post-mutation bookkeeping the dispatcher performs:
/// stamping the requesting identity onto a generated record, and attaching
/// the accepted baseline to an updated record before its sync event is
/// published.
///
/// Records are created fresh per request by the object builder and never
/// shared across requests.
pub trait ProvisionedRecord:
    Clone + fmt::Debug + PartialEq + Send + Sync + 'static
{
    /// Identity used to re-query the record's authoritative current state.
    fn record_id(&self) -> RecordId;

    /// Stamp the requesting principal onto the record (Generate flow).
    fn stamp_requestor(&mut self, principal: &str);

    /// Attach the accepted baseline snapshot (Update flow, pre-publication).
    fn attach_baseline(&mut self, baseline: Self);
}

/// The query-spec fragment was not a JSON object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Query specification must be a JSON object, got {0}")]
pub struct InvalidQuerySpec(pub String);

/// Filter for a directory query.
///
/// Either caller-populated (Query action, from the payload) or synthesized by
/// the baseline checker keyed on a record's identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// The object kind being queried.
    pub object_type: String,
    /// Field criteria, matched conjunctively by the backing store.
    pub criteria: serde_json::Map<String, serde_json::Value>,
}

impl QuerySpec {
    /// Field name used for identity lookups.
    pub const RECORD_ID_FIELD: &'static str = "recordId";

    /// Spec matching exactly the record with the given identity.
    #[must_use]
    pub fn by_record_id(object_type: impl Into<String>, id: &RecordId) -> Self {
        let mut criteria = serde_json::Map::new();
        criteria.insert(
            Self::RECORD_ID_FIELD.to_string(),
            serde_json::Value::String(id.as_str().to_string()),
        );
        Self {
            object_type: object_type.into(),
            criteria,
        }
    }

    /// Validate a caller-populated payload fragment into a spec.
    ///
    /// An empty object is a valid spec (match everything of this type).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidQuerySpec`] when the fragment is not a JSON object.
    pub fn from_payload(
        object_type: impl Into<String>,
        fragment: &serde_json::Value,
    ) -> Result<Self, InvalidQuerySpec> {
        match fragment {
            serde_json::Value::Object(criteria) => Ok(Self {
                object_type: object_type.into(),
                criteria: criteria.clone(),
            }),
            other => Err(InvalidQuerySpec(value_kind(other).to_string())),
        }
    }
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// A payload fragment could not be built into a record.
///
/// Produced by the object-builder collaborator; the dispatcher converts it
/// into a `MALFORMED_REQUEST` reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot build {object_type} record: {reason}")]
pub struct BuildError {
    /// The object kind that was being built.
    pub object_type: String,
    /// What was wrong with the fragment.
    pub reason: String,
}

impl BuildError {
    /// Create a build error.
    pub fn new(object_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            reason: reason.into(),
        }
    }
}

/// Object-builder seam: payload fragment ⇄ typed record.
///
/// Implementations own the schema knowledge (XML/JSON field mapping in the
/// original system). The core only calls through this trait.
pub trait RecordBuilder<R: ProvisionedRecord>: Send + Sync {
    /// Build a record from a payload or wire fragment.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the fragment is missing required fields or
    /// has the wrong shape.
    fn build(&self, fragment: &serde_json::Value) -> Result<R, BuildError>;

    /// Serialize a record for a reply data area or sync event body.
    fn to_wire(&self, record: &R) -> serde_json::Value;
}
