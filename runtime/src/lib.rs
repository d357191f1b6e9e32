//! # Steward Runtime
//!
//! Runtime mechanisms for the Steward provisioning command architecture.
//!
//! This crate provides the behavior behind the seams defined in
//! `steward-core`:
//!
//! - **[`pool::ChannelPool`]**: bounded pool of reusable request channels
//!   with exclusive, drop-released leases
//! - **[`client::RequestReplyClient`]**: one request/response exchange per
//!   call over a leased channel, with timeouts
//! - **[`baseline::BaselineChecker`]**: optimistic concurrency gate for
//!   update mutations
//! - **[`dispatcher::CommandDispatcher`]**: per-object-kind routing,
//!   precondition enforcement, and sync publication ordering
//!
//! ## Example
//!
//! ```ignore
//! use steward_runtime::{
//!     dispatcher::{CommandContext, CommandDispatcher, DispatcherConfig},
//!     pool::{ChannelPool, PoolConfig},
//!     client::RequestReplyClient,
//! };
//!
//! let pool = ChannelPool::new(opener, PoolConfig::default());
//! let client = Arc::new(RequestReplyClient::new(pool, builder.clone()));
//! let dispatcher = CommandDispatcher::new(
//!     DispatcherConfig::new("Account"),
//!     CommandContext { provider, builder, client, publisher: Some(publisher) },
//! );
//!
//! let reply = dispatcher.dispatch(&envelope).await?;
//! ```

pub mod baseline;
pub mod client;
pub mod dispatcher;
pub mod pool;

pub use baseline::{BaselineChecker, BaselineError, BaselineOutcome};
pub use client::{ClientError, RequestReplyClient, DEFAULT_REQUEST_TIMEOUT};
pub use dispatcher::{
    CommandContext, CommandDispatcher, DispatcherConfig, EscalatedFailure, SyncFailurePolicy,
};
pub use pool::{ChannelPool, LeasedChannel, PoolConfig, PoolError};
