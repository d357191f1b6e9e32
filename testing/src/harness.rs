//! Pre-wired dispatcher assembly for integration tests.

#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use crate::doubles::{CallLog, RecordingPublisher, ScriptedOpener, StubProvider};
use crate::record::{TestRecord, TestRecordBuilder};
use std::sync::Arc;
use std::time::Duration;
use steward_core::envelope::{Envelope, Payload};
use steward_core::publisher::SyncPublisher;
use steward_runtime::client::RequestReplyClient;
use steward_runtime::dispatcher::{
    CommandContext, CommandDispatcher, DispatcherConfig, SyncFailurePolicy,
};
use steward_runtime::pool::{ChannelPool, PoolConfig};

/// A valid auth identity accepted by default dispatcher configuration.
pub const VALID_AUTH_ID: &str = "user@example.edu/127.0.0.1";

/// A dispatcher over [`TestRecord`] wired entirely to in-memory doubles.
///
/// Holds every collaborator so tests can script the transport, inject
/// provider and publisher failures, and assert ordering through the shared
/// [`CallLog`].
pub struct Harness {
    /// Transport double backing the channel pool.
    pub opener: ScriptedOpener,
    /// Provider double.
    pub provider: StubProvider,
    /// Publisher double (also installed in the dispatcher unless built
    /// without one).
    pub publisher: RecordingPublisher,
    /// Ordering log shared by provider and publisher.
    pub log: CallLog,
    /// The pool the request/reply client leases from.
    pub pool: ChannelPool,
    /// The dispatcher under test.
    pub dispatcher: CommandDispatcher<TestRecord>,
}

impl Harness {
    /// Default harness: publisher configured, escalate-on-publish-failure,
    /// a small pool with a short lease wait so exhaustion tests stay fast.
    #[must_use]
    pub fn new(object_type: &str) -> Self {
        Self::build(object_type, SyncFailurePolicy::Escalate, true)
    }

    /// Harness with an explicit publish-failure policy.
    #[must_use]
    pub fn with_policy(object_type: &str, policy: SyncFailurePolicy) -> Self {
        Self::build(object_type, policy, true)
    }

    /// Harness with no publisher configured.
    #[must_use]
    pub fn without_publisher(object_type: &str) -> Self {
        Self::build(object_type, SyncFailurePolicy::Escalate, false)
    }

    fn build(object_type: &str, policy: SyncFailurePolicy, with_publisher: bool) -> Self {
        let log = CallLog::new();
        let opener = ScriptedOpener::new();
        let provider = StubProvider::new(log.clone());
        let publisher = RecordingPublisher::new(log.clone());

        let pool_config = PoolConfig::builder()
            .capacity(2)
            .lease_wait(Duration::from_millis(50))
            .request_timeout(Duration::from_millis(200))
            .build();
        let pool = ChannelPool::new(Arc::new(opener.clone()), pool_config);
        let builder = Arc::new(TestRecordBuilder);
        let client = Arc::new(RequestReplyClient::new(pool.clone(), builder.clone()));

        let context = CommandContext {
            provider: Arc::new(provider.clone()),
            builder,
            client,
            publisher: with_publisher
                .then(|| Arc::new(publisher.clone()) as Arc<dyn SyncPublisher>),
        };
        let dispatcher = CommandDispatcher::new(
            DispatcherConfig::new(object_type).sync_failure_policy(policy),
            context,
        );

        Self {
            opener,
            provider,
            publisher,
            log,
            pool,
            dispatcher,
        }
    }
}

/// An envelope with a valid auth identity and an empty payload.
#[must_use]
pub fn envelope(action: impl Into<String>, object_type: &str) -> Envelope {
    Envelope::new(
        action,
        object_type,
        "test-sender",
        VALID_AUTH_ID,
        Payload::default(),
    )
}
