//! Request and reply envelope types.
//!
//! Every inbound message arrives as an [`Envelope`]: a control header (action,
//! object type, sender, auth identity) plus a [`Payload`] carrying the data
//! fragments the action needs. Every request is answered with a
//! [`ReplyEnvelope`] that echoes the control area with a status and carries
//! either result objects or structured error entries.
//!
//! # Design
//!
//! - Envelopes are immutable after construction. The transport layer
//!   deserializes the wire message and hands the core a ready `Envelope`;
//!   the core hands back a `ReplyEnvelope` for the transport to serialize.
//! - Error entries are values, not exceptions: the same failure always
//!   produces a structurally identical `ErrorEntry`, so replies can be
//!   rebuilt or compared deterministically.
//! - Error codes are a closed enum with stable wire strings. Clients branch
//!   on the code, never on the description.
//!
//! # Example
//!
//! ```
//! use steward_core::envelope::{Action, DataArea, Envelope, Payload, ReplyEnvelope};
//!
//! let envelope = Envelope::new(
//!     Action::Query,
//!     "Account",
//!     "billing-portal",
//!     "user@example.edu/10.0.0.7",
//!     Payload::default(),
//! );
//!
//! let reply = ReplyEnvelope::success(&envelope, DataArea::Empty);
//! assert!(reply.control.status.is_success());
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an unknown action string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported message action: {0}")]
pub struct UnsupportedAction(pub String);

/// The request verb carried in an envelope's control area.
///
/// The five actions map one-to-one onto the provider operations. Anything
/// else on the wire fails to parse and is answered with an
/// [`ErrorCode::UnsupportedMessageAction`] reply.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Read zero or more records matching a query specification.
    Query,
    /// Create a record whose content is produced server-side from a requisition.
    Generate,
    /// Create a record from caller-supplied content.
    Create,
    /// Replace a record, guarded by a baseline conflict check.
    Update,
    /// Remove a record.
    Delete,
}

impl Action {
    /// Stable wire name for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Generate => "Generate",
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }

    /// All actions, in dispatch order. Useful for exhaustive guard tests.
    pub const ALL: [Self; 5] = [
        Self::Query,
        Self::Generate,
        Self::Create,
        Self::Update,
        Self::Delete,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = UnsupportedAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Query" => Ok(Self::Query),
            "Generate" => Ok(Self::Generate),
            "Create" => Ok(Self::Create),
            "Update" => Ok(Self::Update),
            "Delete" => Ok(Self::Delete),
            other => Err(UnsupportedAction(other.to_string())),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

/// Data fragments carried by an inbound envelope.
///
/// A payload holds at most one fragment of each kind; which fragments are
/// required depends on the action:
///
/// | Action   | Required fragments            |
/// |----------|-------------------------------|
/// | Query    | `query_spec`                  |
/// | Generate | `new_data`                    |
/// | Create   | `new_data`                    |
/// | Update   | `new_data` and `baseline_data`|
/// | Delete   | `delete_data`                 |
///
/// A required fragment that is absent surfaces as a
/// [`MissingFragment`] error, which the dispatcher converts into a
/// [`ErrorCode::MalformedRequest`] reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// The record to create, or the new state of the record to update.
    pub new_data: Option<serde_json::Value>,
    /// The record to delete.
    pub delete_data: Option<serde_json::Value>,
    /// The snapshot the client last read, for the update conflict check.
    pub baseline_data: Option<serde_json::Value>,
    /// Caller-populated filter for the Query action.
    pub query_spec: Option<serde_json::Value>,
}

/// A required payload fragment was absent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Required payload fragment is missing: {0}")]
pub struct MissingFragment(pub &'static str);

impl Payload {
    /// The `new_data` fragment, or an error naming it.
    ///
    /// # Errors
    ///
    /// Returns [`MissingFragment`] when the fragment is absent.
    pub fn require_new_data(&self) -> Result<&serde_json::Value, MissingFragment> {
        self.new_data.as_ref().ok_or(MissingFragment("new_data"))
    }

    /// The `delete_data` fragment, or an error naming it.
    ///
    /// # Errors
    ///
    /// Returns [`MissingFragment`] when the fragment is absent.
    pub fn require_delete_data(&self) -> Result<&serde_json::Value, MissingFragment> {
        self.delete_data
            .as_ref()
            .ok_or(MissingFragment("delete_data"))
    }

    /// The `baseline_data` fragment, or an error naming it.
    ///
    /// # Errors
    ///
    /// Returns [`MissingFragment`] when the fragment is absent.
    pub fn require_baseline_data(&self) -> Result<&serde_json::Value, MissingFragment> {
        self.baseline_data
            .as_ref()
            .ok_or(MissingFragment("baseline_data"))
    }

    /// The `query_spec` fragment, or an error naming it.
    ///
    /// # Errors
    ///
    /// Returns [`MissingFragment`] when the fragment is absent.
    pub fn require_query_spec(&self) -> Result<&serde_json::Value, MissingFragment> {
        self.query_spec
            .as_ref()
            .ok_or(MissingFragment("query_spec"))
    }
}

/// An inbound request message.
///
/// Constructed by the message-transport collaborator after wire
/// deserialization; immutable from then on. The `action` and `auth_user_id`
/// fields are carried raw and validated by the dispatcher, so that an
/// unknown action or malformed identity is answered with a structured reply
/// rather than rejected at parse time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The raw request verb, parsed into an [`Action`] at dispatch.
    pub action: String,
    /// The domain object kind this request targets (e.g. `"Account"`).
    pub object_type: String,
    /// Identifier of the sending application.
    pub sender_app_id: String,
    /// Raw `principal/ipAddress` identity string, validated at dispatch.
    pub auth_user_id: String,
    /// Data fragments for the action.
    pub payload: Payload,
    /// Opaque correlation token, echoed verbatim in the reply.
    pub test_id: Option<String>,
}

impl Envelope {
    /// Create an envelope. `action` accepts an [`Action`] or a raw string.
    pub fn new(
        action: impl Into<String>,
        object_type: impl Into<String>,
        sender_app_id: impl Into<String>,
        auth_user_id: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            action: action.into(),
            object_type: object_type.into(),
            sender_app_id: sender_app_id.into(),
            auth_user_id: auth_user_id.into(),
            payload,
            test_id: None,
        }
    }

    /// Attach a correlation token to be echoed in the reply.
    #[must_use]
    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }
}

/// Outcome status echoed in a reply's control area.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    /// The request was handled and any requested mutation committed.
    Success,
    /// The request was rejected or failed; the data area carries errors.
    Failure,
}

impl ReplyStatus {
    /// Whether this status is [`ReplyStatus::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Control header of a reply, echoing the request it answers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlArea {
    /// The raw action string of the request being answered.
    pub action: String,
    /// The object type of the request being answered.
    pub object_type: String,
    /// The sender the reply is addressed to.
    pub sender_app_id: String,
    /// Outcome of the request.
    pub status: ReplyStatus,
    /// Correlation token echoed from the request, if one was supplied.
    pub test_id: Option<String>,
}

impl ControlArea {
    /// Echo a request's control fields with the given status.
    #[must_use]
    pub fn echo(envelope: &Envelope, status: ReplyStatus) -> Self {
        Self {
            action: envelope.action.clone(),
            object_type: envelope.object_type.clone(),
            sender_app_id: envelope.sender_app_id.clone(),
            status,
            test_id: envelope.test_id.clone(),
        }
    }
}

/// Classification of an error entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The client sent something wrong; resubmitting corrected input can succeed.
    Application,
    /// A backing system misbehaved; resubmitting the same input may succeed later.
    System,
}

/// Stable error codes clients can branch on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The envelope's object type does not match the command's.
    UnsupportedMessageObject,
    /// The envelope's action string is not one of the five verbs.
    UnsupportedMessageAction,
    /// The auth identity failed `principal/ipAddress` validation.
    InvalidAuthUserId,
    /// A required payload fragment was missing or unbuildable.
    MalformedRequest,
    /// No current record exists to update against.
    BaselineStale,
    /// The current record differs from the supplied baseline.
    BaselineConflict,
    /// Baseline and new state are equal; there is nothing to update.
    NoOpRejected,
    /// The identity query returned more than one record.
    AmbiguousBaseline,
    /// The provider reported a failure.
    ProviderFailure,
    /// The current-state or caller query failed at the transport.
    QueryFailed,
    /// No request channel could be leased.
    PoolExhausted,
    /// The post-mutation sync notification could not be published.
    PublishFailed,
}

impl ErrorCode {
    /// Stable wire string for this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedMessageObject => "UNSUPPORTED_MESSAGE_OBJECT",
            Self::UnsupportedMessageAction => "UNSUPPORTED_MESSAGE_ACTION",
            Self::InvalidAuthUserId => "INVALID_AUTH_USER_ID",
            Self::MalformedRequest => "MALFORMED_REQUEST",
            Self::BaselineStale => "BASELINE_STALE",
            Self::BaselineConflict => "BASELINE_CONFLICT",
            Self::NoOpRejected => "NO_OP_REJECTED",
            Self::AmbiguousBaseline => "AMBIGUOUS_BASELINE",
            Self::ProviderFailure => "PROVIDER_FAILURE",
            Self::QueryFailed => "QUERY_FAILED",
            Self::PoolExhausted => "POOL_EXHAUSTED",
            Self::PublishFailed => "PUBLISH_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured error in a failure reply's data area.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Application or system classification.
    pub kind: ErrorKind,
    /// Stable code clients branch on.
    pub code: ErrorCode,
    /// Human-readable description. Not part of the client contract.
    pub description: String,
}

impl ErrorEntry {
    /// Build an [`ErrorKind::Application`] entry.
    pub fn application(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Application,
            code,
            description: description.into(),
        }
    }

    /// Build an [`ErrorKind::System`] entry.
    pub fn system(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::System,
            code,
            description: description.into(),
        }
    }
}

/// Reply payload: nothing, result objects, or error entries.
///
/// Most replies carry zero or one error, so the error list is inlined up to
/// two entries before spilling to the heap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DataArea {
    /// Acknowledgement with no body (successful Create/Update/Delete).
    Empty,
    /// Zero or more serialized records (Query results, Generate output).
    Objects(Vec<serde_json::Value>),
    /// Structured errors explaining a failure reply.
    Errors(SmallVec<[ErrorEntry; 2]>),
}

/// An outbound reply message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Echoed control header with outcome status.
    pub control: ControlArea,
    /// Reply body.
    pub data: DataArea,
}

impl ReplyEnvelope {
    /// Build a success reply answering `envelope`.
    #[must_use]
    pub fn success(envelope: &Envelope, data: DataArea) -> Self {
        Self {
            control: ControlArea::echo(envelope, ReplyStatus::Success),
            data,
        }
    }

    /// Build a failure reply answering `envelope` with a single error.
    #[must_use]
    pub fn failure(envelope: &Envelope, error: ErrorEntry) -> Self {
        let mut entries = SmallVec::new();
        entries.push(error);
        Self {
            control: ControlArea::echo(envelope, ReplyStatus::Failure),
            data: DataArea::Errors(entries),
        }
    }

    /// The error entries of a failure reply, empty for success replies.
    #[must_use]
    pub fn errors(&self) -> &[ErrorEntry] {
        match &self.data {
            DataArea::Errors(entries) => entries,
            _ => &[],
        }
    }
}
