//! Per-message-type request routing and precondition enforcement.
//!
//! Every command in the original system repeated the same shape: check the
//! envelope targets the right object kind, validate the caller's identity,
//! branch on the action, delegate the real work to a provider, publish a
//! sync event after a successful mutation, and always answer with a reply
//! envelope. [`CommandDispatcher`] is that shape, written once.
//!
//! # Composition over inheritance
//!
//! Instead of an abstract command base class layering configuration and
//! logging state, a dispatcher is assembled from a [`DispatcherConfig`] and
//! a [`CommandContext`] carrying the provider, object builder, request/reply
//! client, and optional sync publisher. Handlers are plain methods.
//!
//! # Reply guarantee
//!
//! Validation failures, malformed payloads, provider errors, and baseline
//! rejections all terminate in an error reply: the dispatcher never leaves a
//! request unanswered on those paths. The single exception is a sync-publish
//! failure after a committed mutation under the
//! [`SyncFailurePolicy::Escalate`] policy, which is surfaced to the
//! transport layer as an [`EscalatedFailure`] instead (see below).

use crate::baseline::{BaselineChecker, BaselineOutcome};
use crate::client::RequestReplyClient;
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use steward_core::auth::AuthUserId;
use steward_core::envelope::{
    Action, DataArea, Envelope, ErrorCode, ErrorEntry, ReplyEnvelope,
};
use steward_core::provider::Provider;
use steward_core::publisher::{PublishError, SyncEvent, SyncKind, SyncPublisher};
use steward_core::record::{ProvisionedRecord, QuerySpec, RecordBuilder};
use steward_core::HarnessIdentity;
use thiserror::Error;

/// Counter of replies produced, labeled by status.
pub const REPLIES_COUNTER: &str = "steward_dispatch_replies_total";
/// Counter of sync publications that failed after a committed mutation.
pub const PUBLISH_FAILURES_COUNTER: &str = "steward_sync_publish_failures_total";

/// What to do when a sync publication fails after the mutation committed.
///
/// At that point the durable change has happened but subscribers may not
/// hear about it. Telling the client "success" hides that; telling them
/// "failure" misrepresents the committed mutation. The original
/// implementations disagreed with each other, so the resolution is an
/// explicit deployment decision rather than a hard-coded guess. Neither
/// option drops the failure silently.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SyncFailurePolicy {
    /// Surface an [`EscalatedFailure`] to the transport layer, which applies
    /// its own escalation (dead-letter, alerting). No reply is produced.
    #[default]
    Escalate,
    /// Answer the client with a `PUBLISH_FAILED` error reply.
    FailReply,
}

/// Dispatcher configuration.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// The object kind this dispatcher accepts.
    pub expected_object_type: String,
    /// Resolution for post-commit publish failures.
    pub sync_failure_policy: SyncFailurePolicy,
    /// Test-harness identity substitution applied before auth validation.
    pub harness: HarnessIdentity,
}

impl DispatcherConfig {
    /// Configuration for a dispatcher accepting `expected_object_type`.
    pub fn new(expected_object_type: impl Into<String>) -> Self {
        Self {
            expected_object_type: expected_object_type.into(),
            sync_failure_policy: SyncFailurePolicy::default(),
            harness: HarnessIdentity::default(),
        }
    }

    /// Set the post-commit publish-failure policy.
    #[must_use]
    pub const fn sync_failure_policy(mut self, policy: SyncFailurePolicy) -> Self {
        self.sync_failure_policy = policy;
        self
    }

    /// Set the harness identity substitution.
    #[must_use]
    pub fn harness(mut self, harness: HarnessIdentity) -> Self {
        self.harness = harness;
        self
    }
}

/// Collaborators a dispatcher delegates to.
///
/// All are shared handles: one context serves every concurrent request.
pub struct CommandContext<R: ProvisionedRecord> {
    /// The provisioning strategy for this object kind.
    pub provider: Arc<dyn Provider<R>>,
    /// Payload fragment ⇄ record conversion.
    pub builder: Arc<dyn RecordBuilder<R>>,
    /// Client used for baseline current-state queries.
    pub client: Arc<RequestReplyClient<R>>,
    /// Sync-event publisher; `None` skips publication entirely.
    pub publisher: Option<Arc<dyn SyncPublisher>>,
}

/// A failure that cannot be answered with a reply envelope.
///
/// Produced only for sync-publish failures after a committed mutation under
/// [`SyncFailurePolicy::Escalate`]; the transport layer owns what happens
/// next (dead-letter, alert, redelivery).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscalatedFailure {
    /// Sync publication failed after the provider committed the mutation.
    #[error("Sync publication failed after committed {action} on {object_type}: {source}")]
    PublishAfterCommit {
        /// The action whose mutation committed.
        action: String,
        /// The object kind involved.
        object_type: String,
        /// The underlying publish failure.
        source: PublishError,
    },
}

/// Generic request dispatcher for one object kind.
pub struct CommandDispatcher<R: ProvisionedRecord> {
    config: DispatcherConfig,
    context: CommandContext<R>,
    checker: BaselineChecker<R>,
}

impl<R: ProvisionedRecord> CommandDispatcher<R> {
    /// Assemble a dispatcher.
    ///
    /// A missing publisher is logged here, once, rather than on every
    /// dispatch.
    #[must_use]
    pub fn new(config: DispatcherConfig, context: CommandContext<R>) -> Self {
        if context.publisher.is_none() {
            tracing::info!(
                object_type = %config.expected_object_type,
                "No sync publisher configured; post-mutation sync events will be skipped"
            );
        }
        let checker = BaselineChecker::new(
            Arc::clone(&context.client),
            config.expected_object_type.clone(),
        );
        Self {
            config,
            context,
            checker,
        }
    }

    /// Handle one inbound envelope to completion.
    ///
    /// # Errors
    ///
    /// Returns [`EscalatedFailure`] only when a sync publication fails after
    /// a committed mutation and the policy is
    /// [`SyncFailurePolicy::Escalate`]. Every other failure is answered with
    /// an error reply.
    pub async fn dispatch(&self, envelope: &Envelope) -> Result<ReplyEnvelope, EscalatedFailure> {
        tracing::debug!(
            action = %envelope.action,
            object_type = %envelope.object_type,
            sender = %envelope.sender_app_id,
            "Dispatching request"
        );

        let result = self.route(envelope).await;
        match &result {
            Ok(reply) => {
                let status = if reply.control.status.is_success() {
                    "success"
                } else {
                    "failure"
                };
                counter!(REPLIES_COUNTER, "status" => status).increment(1);
            }
            Err(escalated) => {
                tracing::error!(error = %escalated, "Escalating to transport layer");
            }
        }
        result
    }

    async fn route(&self, envelope: &Envelope) -> Result<ReplyEnvelope, EscalatedFailure> {
        if envelope.object_type != self.config.expected_object_type {
            return Ok(ReplyEnvelope::failure(
                envelope,
                ErrorEntry::application(
                    ErrorCode::UnsupportedMessageObject,
                    format!(
                        "This command handles {} objects, not {}",
                        self.config.expected_object_type, envelope.object_type
                    ),
                ),
            ));
        }

        let auth = match AuthUserId::parse_with_harness(&envelope.auth_user_id, &self.config.harness)
        {
            Ok(auth) => auth,
            Err(err) => {
                return Ok(ReplyEnvelope::failure(
                    envelope,
                    ErrorEntry::application(ErrorCode::InvalidAuthUserId, err.to_string()),
                ));
            }
        };

        let Ok(action) = envelope.action.parse::<Action>() else {
            return Ok(ReplyEnvelope::failure(
                envelope,
                ErrorEntry::application(
                    ErrorCode::UnsupportedMessageAction,
                    format!("Unsupported message action: {}", envelope.action),
                ),
            ));
        };

        match action {
            Action::Query => Ok(self.handle_query(envelope).await),
            Action::Generate => self.handle_generate(envelope, &auth).await,
            Action::Create => self.handle_create(envelope).await,
            Action::Update => self.handle_update(envelope).await,
            Action::Delete => self.handle_delete(envelope).await,
        }
    }

    async fn handle_query(&self, envelope: &Envelope) -> ReplyEnvelope {
        let fragment = match envelope.payload.require_query_spec() {
            Ok(fragment) => fragment,
            Err(err) => return self.malformed(envelope, err.to_string()),
        };
        let spec = match QuerySpec::from_payload(&envelope.object_type, fragment) {
            Ok(spec) => spec,
            Err(err) => return self.malformed(envelope, err.to_string()),
        };

        match self.context.provider.query(&spec).await {
            Ok(records) => {
                let objects = records
                    .iter()
                    .map(|record| self.context.builder.to_wire(record))
                    .collect();
                ReplyEnvelope::success(envelope, DataArea::Objects(objects))
            }
            Err(err) => {
                tracing::error!(error = %err, "Provider query failed");
                ReplyEnvelope::failure(envelope, err.to_entry())
            }
        }
    }

    async fn handle_generate(
        &self,
        envelope: &Envelope,
        auth: &AuthUserId,
    ) -> Result<ReplyEnvelope, EscalatedFailure> {
        let requisition = match self.build_from(envelope, envelope.payload.require_new_data()) {
            Ok(record) => record,
            Err(reply) => return Ok(reply),
        };

        let mut generated = match self.context.provider.generate(requisition).await {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(error = %err, "Provider generate failed");
                return Ok(ReplyEnvelope::failure(envelope, err.to_entry()));
            }
        };
        generated.stamp_requestor(auth.principal());

        if let Some(entry) = self.publish_sync(envelope, SyncKind::Created, &generated).await? {
            return Ok(ReplyEnvelope::failure(envelope, entry));
        }

        let body = self.context.builder.to_wire(&generated);
        Ok(ReplyEnvelope::success(
            envelope,
            DataArea::Objects(vec![body]),
        ))
    }

    async fn handle_create(&self, envelope: &Envelope) -> Result<ReplyEnvelope, EscalatedFailure> {
        let record = match self.build_from(envelope, envelope.payload.require_new_data()) {
            Ok(record) => record,
            Err(reply) => return Ok(reply),
        };

        if let Err(err) = self.context.provider.create(&record).await {
            tracing::error!(error = %err, "Provider create failed");
            return Ok(ReplyEnvelope::failure(envelope, err.to_entry()));
        }

        if let Some(entry) = self.publish_sync(envelope, SyncKind::Created, &record).await? {
            return Ok(ReplyEnvelope::failure(envelope, entry));
        }
        Ok(ReplyEnvelope::success(envelope, DataArea::Empty))
    }

    async fn handle_update(&self, envelope: &Envelope) -> Result<ReplyEnvelope, EscalatedFailure> {
        let baseline = match self.build_from(envelope, envelope.payload.require_baseline_data()) {
            Ok(record) => record,
            Err(reply) => return Ok(reply),
        };
        let mut new_state = match self.build_from(envelope, envelope.payload.require_new_data()) {
            Ok(record) => record,
            Err(reply) => return Ok(reply),
        };

        match self.checker.check(&baseline, &new_state).await {
            Ok(BaselineOutcome::Proceed) => {}
            Ok(outcome) => {
                if let Some(entry) = outcome.rejection_entry() {
                    return Ok(ReplyEnvelope::failure(envelope, entry));
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Baseline check failed");
                return Ok(ReplyEnvelope::failure(envelope, err.to_entry()));
            }
        }

        if let Err(err) = self.context.provider.update(&new_state).await {
            tracing::error!(error = %err, "Provider update failed");
            return Ok(ReplyEnvelope::failure(envelope, err.to_entry()));
        }

        // Subscribers see the accepted baseline alongside the new state.
        new_state.attach_baseline(baseline);
        if let Some(entry) = self.publish_sync(envelope, SyncKind::Updated, &new_state).await? {
            return Ok(ReplyEnvelope::failure(envelope, entry));
        }
        Ok(ReplyEnvelope::success(envelope, DataArea::Empty))
    }

    async fn handle_delete(&self, envelope: &Envelope) -> Result<ReplyEnvelope, EscalatedFailure> {
        let record = match self.build_from(envelope, envelope.payload.require_delete_data()) {
            Ok(record) => record,
            Err(reply) => return Ok(reply),
        };

        if let Err(err) = self.context.provider.delete(&record).await {
            tracing::error!(error = %err, "Provider delete failed");
            return Ok(ReplyEnvelope::failure(envelope, err.to_entry()));
        }

        if let Some(entry) = self.publish_sync(envelope, SyncKind::Deleted, &record).await? {
            return Ok(ReplyEnvelope::failure(envelope, entry));
        }
        Ok(ReplyEnvelope::success(envelope, DataArea::Empty))
    }

    /// Build a record from a required payload fragment, converting absence
    /// and build failures into a `MALFORMED_REQUEST` reply.
    fn build_from(
        &self,
        envelope: &Envelope,
        fragment: Result<&serde_json::Value, steward_core::envelope::MissingFragment>,
    ) -> Result<R, ReplyEnvelope> {
        let fragment = fragment.map_err(|err| self.malformed(envelope, err.to_string()))?;
        self.context
            .builder
            .build(fragment)
            .map_err(|err| self.malformed(envelope, err.to_string()))
    }

    fn malformed(&self, envelope: &Envelope, description: String) -> ReplyEnvelope {
        ReplyEnvelope::failure(
            envelope,
            ErrorEntry::application(ErrorCode::MalformedRequest, description),
        )
    }

    /// Publish a sync event for a committed mutation.
    ///
    /// Returns `Ok(None)` on success or when no publisher is configured,
    /// `Ok(Some(entry))` when the failure should be answered in the reply,
    /// and `Err` when it must escalate past the reply path.
    async fn publish_sync(
        &self,
        envelope: &Envelope,
        kind: SyncKind,
        record: &R,
    ) -> Result<Option<ErrorEntry>, EscalatedFailure> {
        let Some(publisher) = &self.context.publisher else {
            return Ok(None);
        };

        let event = SyncEvent {
            object_type: envelope.object_type.clone(),
            record_id: Some(record.record_id().into_inner()),
            body: self.context.builder.to_wire(record),
            occurred_at: Utc::now(),
        };

        match publisher.publish(kind, &event).await {
            Ok(()) => Ok(None),
            Err(source) => {
                counter!(PUBLISH_FAILURES_COUNTER).increment(1);
                tracing::warn!(
                    kind = %kind,
                    object_type = %event.object_type,
                    error = %source,
                    "Sync publication failed after committed mutation"
                );
                match self.config.sync_failure_policy {
                    SyncFailurePolicy::Escalate => Err(EscalatedFailure::PublishAfterCommit {
                        action: envelope.action.clone(),
                        object_type: envelope.object_type.clone(),
                        source,
                    }),
                    SyncFailurePolicy::FailReply => Ok(Some(ErrorEntry::system(
                        ErrorCode::PublishFailed,
                        source.to_string(),
                    ))),
                }
            }
        }
    }
}
