//! # Steward Core
//!
//! Core traits and types for the Steward provisioning command architecture.
//!
//! Steward handles message-driven request/reply commands for an account
//! provisioning service. This crate defines the seams and data model shared
//! by every command; the mechanisms with behavior (channel pool,
//! request/reply client, baseline conflict check, dispatcher) live in
//! `steward-runtime`.
//!
//! ## Core Concepts
//!
//! - **Envelope**: the inbound request wrapper (action, object type, sender,
//!   auth identity, payload) and its reply counterpart
//! - **`ProvisionedRecord`**: the domain object seam, identity plus
//!   structural equality and nothing more
//! - **Provider**: the pluggable strategy performing actual provisioning,
//!   resolved from a startup registry rather than reflective class loading
//! - **`SyncPublisher`**: post-mutation notification seam
//! - **`AuthUserId`**: validated `principal/ipAddress` request identity
//!
//! ## Architecture Principles
//!
//! - Composition over inheritance: commands are a context struct plus free
//!   behavior, not a base-class chain
//! - Explicit result types per failure taxonomy; no catch-all exceptions
//! - External collaborators (transport, object builder, provider) behind
//!   `Send + Sync` traits, injected at construction

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod auth;
pub mod envelope;
pub mod provider;
pub mod publisher;
pub mod record;
pub mod transport;

pub use auth::{AuthIdError, AuthUserId, HarnessIdentity};
pub use envelope::{
    Action, ControlArea, DataArea, Envelope, ErrorCode, ErrorEntry, ErrorKind, Payload,
    ReplyEnvelope, ReplyStatus,
};
pub use provider::{Provider, ProviderError, ProviderRegistry};
pub use publisher::{PublishError, SyncEvent, SyncKind, SyncPublisher};
pub use record::{BuildError, ProvisionedRecord, QuerySpec, RecordBuilder, RecordId};
pub use transport::{
    ChannelOpener, MutationAck, MutationKind, RequestChannel, StoreReply, StoreRequest,
    TransportError,
};
