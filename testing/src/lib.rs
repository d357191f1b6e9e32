//! # Steward Testing
//!
//! Testing doubles and helpers for the Steward provisioning command
//! architecture.
//!
//! This crate provides:
//! - In-memory doubles for every external collaborator: scripted transport
//!   channels, a stub provider, a recording publisher
//! - A [`TestRecord`] fixture implementing the record seam
//! - A [`Harness`] wiring a full dispatcher to the doubles
//! - A shared [`CallLog`] for asserting cross-collaborator ordering
//!
//! ## Example
//!
//! ```
//! use steward_testing::{envelope, Harness};
//! use steward_core::envelope::Action;
//!
//! # async fn example() {
//! let harness = Harness::new("Account");
//! let request = envelope(Action::Query, "Account");
//! let reply = harness.dispatcher.dispatch(&request).await.unwrap();
//! assert!(!reply.control.status.is_success()); // no query spec supplied
//! # }
//! ```

pub mod doubles;
pub mod harness;
pub mod record;

pub use doubles::{CallLog, RecordingPublisher, ScriptItem, ScriptedChannel, ScriptedOpener, StubProvider};
pub use harness::{envelope, Harness, VALID_AUTH_ID};
pub use record::{wire_record, TestRecord, TestRecordBuilder};
