//! End-to-end dispatcher behavior over in-memory doubles.
//!
//! Covers the routing preconditions, each action's happy path, the baseline
//! decision table as seen through Update requests, side-effect ordering, and
//! the post-commit publish-failure policies.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use steward_core::envelope::{Action, DataArea, Envelope, ErrorCode, ErrorKind, ReplyStatus};
use steward_core::provider::ProviderError;
use steward_core::publisher::{PublishError, SyncKind};
use steward_core::transport::TransportError;
use steward_runtime::dispatcher::{EscalatedFailure, SyncFailurePolicy};
use steward_testing::{envelope, wire_record, Harness};

/// Capture dispatcher tracing in test output on `RUST_LOG=debug` runs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn assert_error_reply(reply: &steward_core::envelope::ReplyEnvelope, code: ErrorCode) {
    assert_eq!(reply.control.status, ReplyStatus::Failure);
    let errors = reply.errors();
    assert_eq!(errors.len(), 1, "expected exactly one error entry");
    assert_eq!(errors[0].code, code);
}

fn update_envelope(baseline: serde_json::Value, new_state: serde_json::Value) -> Envelope {
    let mut request = envelope(Action::Update, "Account");
    request.payload.baseline_data = Some(baseline);
    request.payload.new_data = Some(new_state);
    request
}

// ---------------------------------------------------------------------------
// Routing preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn object_type_guard_rejects_every_action() {
    init_tracing();
    let harness = Harness::new("Account");
    for action in Action::ALL {
        let request = envelope(action, "VirtualPrivateCloud");
        let reply = harness.dispatcher.dispatch(&request).await.unwrap();
        assert_error_reply(&reply, ErrorCode::UnsupportedMessageObject);
    }
    // The guard fires before action parsing, so unknown actions too.
    let request = envelope("Reconcile", "VirtualPrivateCloud");
    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::UnsupportedMessageObject);
    assert!(harness.provider.calls().is_empty());
}

#[tokio::test]
async fn invalid_auth_id_is_rejected() {
    let harness = Harness::new("Account");
    for bad in [
        "not-an-email/127.0.0.1",
        "user@example.edu/999.999.999.999",
        "user@example.edu",
    ] {
        let mut request = envelope(Action::Query, "Account");
        request.auth_user_id = bad.to_string();
        let reply = harness.dispatcher.dispatch(&request).await.unwrap();
        assert_error_reply(&reply, ErrorCode::InvalidAuthUserId);
    }
    assert!(harness.provider.calls().is_empty());
}

#[tokio::test]
async fn harness_sentinel_principal_is_accepted() {
    let harness = Harness::new("Account");
    let mut request = envelope(Action::Query, "Account");
    request.auth_user_id = "provisioning-harness/127.0.0.1".to_string();
    request.payload.query_spec = Some(serde_json::json!({}));
    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert!(reply.control.status.is_success());
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let harness = Harness::new("Account");
    let request = envelope("Reconcile", "Account");
    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::UnsupportedMessageAction);
}

#[tokio::test]
async fn test_id_round_trips_in_replies() {
    let harness = Harness::new("Account");
    let request = envelope(Action::Query, "Account").with_test_id("corr-77");
    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_eq!(reply.control.test_id.as_deref(), Some("corr-77"));
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[tokio::test]
async fn query_without_spec_is_malformed() {
    let harness = Harness::new("Account");
    let request = envelope(Action::Query, "Account");
    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::MalformedRequest);
}

#[tokio::test]
async fn query_with_non_object_spec_is_malformed() {
    let harness = Harness::new("Account");
    let mut request = envelope(Action::Query, "Account");
    request.payload.query_spec = Some(serde_json::json!("owner = team-a"));
    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::MalformedRequest);
}

#[tokio::test]
async fn query_returns_provider_records_in_order() {
    let harness = Harness::new("Account");
    harness.provider.set_query_records(vec![
        steward_testing::TestRecord::new("acct-2", "team-b"),
        steward_testing::TestRecord::new("acct-1", "team-a"),
    ]);
    let mut request = envelope(Action::Query, "Account");
    request.payload.query_spec = Some(serde_json::json!({"owner": "team-a"}));

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert!(reply.control.status.is_success());
    let DataArea::Objects(objects) = &reply.data else {
        panic!("expected objects data area");
    };
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0]["recordId"], "acct-2");
    assert_eq!(objects[1]["recordId"], "acct-1");
}

#[tokio::test]
async fn query_provider_failure_becomes_error_reply() {
    let harness = Harness::new("Account");
    harness
        .provider
        .fail_query(ProviderError::system("ERR_DIR", "directory down"));
    let mut request = envelope(Action::Query, "Account");
    request.payload.query_spec = Some(serde_json::json!({}));

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::ProviderFailure);
    assert_eq!(reply.errors()[0].kind, ErrorKind::System);
}

// ---------------------------------------------------------------------------
// Create / Generate / Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_mutates_then_publishes_then_replies_empty() {
    let harness = Harness::new("Account");
    let mut request = envelope(Action::Create, "Account");
    request.payload.new_data = Some(wire_record("acct-1", "team-a"));

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert!(reply.control.status.is_success());
    assert_eq!(reply.data, DataArea::Empty);
    assert_eq!(
        harness.log.entries(),
        vec!["provider.create(acct-1)", "publisher.created"]
    );
    let events = harness.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, SyncKind::Created);
    assert_eq!(events[0].1.record_id.as_deref(), Some("acct-1"));
}

#[tokio::test]
async fn create_without_new_data_is_malformed() {
    let harness = Harness::new("Account");
    let request = envelope(Action::Create, "Account");
    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::MalformedRequest);
    assert!(harness.provider.calls().is_empty());
    assert!(harness.publisher.events().is_empty());
}

#[tokio::test]
async fn create_provider_failure_skips_publication() {
    let harness = Harness::new("Account");
    harness
        .provider
        .fail_create(ProviderError::system("ERR_STORE", "store down"));
    let mut request = envelope(Action::Create, "Account");
    request.payload.new_data = Some(wire_record("acct-1", "team-a"));

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::ProviderFailure);
    assert!(harness.publisher.events().is_empty());
}

#[tokio::test]
async fn generate_stamps_requestor_and_replies_with_object() {
    let harness = Harness::new("Account");
    let mut request = envelope(Action::Generate, "Account");
    request.payload.new_data = Some(wire_record("acct-1", "team-a"));

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert!(reply.control.status.is_success());
    let DataArea::Objects(objects) = &reply.data else {
        panic!("expected the generated object in the reply");
    };
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["requestedBy"], "user@example.edu");

    // The published event carries the stamped record too.
    let events = harness.publisher.events();
    assert_eq!(events[0].0, SyncKind::Created);
    assert_eq!(events[0].1.body["requestedBy"], "user@example.edu");
}

#[tokio::test]
async fn delete_mutates_then_publishes() {
    let harness = Harness::new("Account");
    let mut request = envelope(Action::Delete, "Account");
    request.payload.delete_data = Some(wire_record("acct-1", "team-a"));

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert!(reply.control.status.is_success());
    assert_eq!(
        harness.log.entries(),
        vec!["provider.delete(acct-1)", "publisher.deleted"]
    );
}

// ---------------------------------------------------------------------------
// Update and the baseline decision table
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_with_matching_baseline_proceeds_in_order() {
    init_tracing();
    let harness = Harness::new("Account");
    // Authoritative current state equals the supplied baseline.
    harness
        .opener
        .push_records(vec![wire_record("acct-1", "team-a")]);
    let request = update_envelope(
        wire_record("acct-1", "team-a"),
        wire_record("acct-1", "team-b"),
    );

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert!(reply.control.status.is_success());
    assert_eq!(reply.data, DataArea::Empty);
    // Exactly one mutation, then exactly one publication.
    assert_eq!(
        harness.log.entries(),
        vec!["provider.update(acct-1)", "publisher.updated"]
    );

    // The published new state carries the accepted baseline.
    let events = harness.publisher.events();
    assert_eq!(events[0].0, SyncKind::Updated);
    assert_eq!(events[0].1.body["owner"], "team-b");
    assert_eq!(events[0].1.body["baseline"]["owner"], "team-a");
}

#[tokio::test]
async fn update_equal_to_baseline_is_noop_rejected() {
    let harness = Harness::new("Account");
    harness
        .opener
        .push_records(vec![wire_record("acct-1", "team-a")]);
    let request = update_envelope(
        wire_record("acct-1", "team-a"),
        wire_record("acct-1", "team-a"),
    );

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::NoOpRejected);
    assert!(harness.provider.calls().is_empty());
    assert!(harness.publisher.events().is_empty());
}

#[tokio::test]
async fn update_with_no_current_record_is_stale() {
    let harness = Harness::new("Account");
    harness.opener.push_records(Vec::new());
    let request = update_envelope(
        wire_record("acct-1", "team-a"),
        wire_record("acct-1", "team-b"),
    );

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::BaselineStale);
    assert!(harness.provider.calls().is_empty());
}

#[tokio::test]
async fn update_with_diverged_current_record_is_conflict() {
    let harness = Harness::new("Account");
    harness
        .opener
        .push_records(vec![wire_record("acct-1", "team-changed")]);
    let request = update_envelope(
        wire_record("acct-1", "team-a"),
        wire_record("acct-1", "team-b"),
    );

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::BaselineConflict);
    assert!(harness.provider.calls().is_empty());
}

#[tokio::test]
async fn update_with_duplicate_current_records_is_ambiguous() {
    let harness = Harness::new("Account");
    harness.opener.push_records(vec![
        wire_record("acct-1", "team-a"),
        wire_record("acct-1", "team-a"),
    ]);
    let request = update_envelope(
        wire_record("acct-1", "team-a"),
        wire_record("acct-1", "team-b"),
    );

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::AmbiguousBaseline);
    assert_eq!(reply.errors()[0].kind, ErrorKind::System);
    assert!(harness.provider.calls().is_empty());
}

#[tokio::test]
async fn update_missing_baseline_is_malformed() {
    let harness = Harness::new("Account");
    let mut request = envelope(Action::Update, "Account");
    request.payload.new_data = Some(wire_record("acct-1", "team-b"));
    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::MalformedRequest);
}

#[tokio::test]
async fn update_missing_new_state_is_malformed() {
    let harness = Harness::new("Account");
    let mut request = envelope(Action::Update, "Account");
    request.payload.baseline_data = Some(wire_record("acct-1", "team-a"));
    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::MalformedRequest);
}

#[tokio::test]
async fn update_read_timeout_becomes_query_failed_reply() {
    let harness = Harness::new("Account");
    harness.opener.push_hang();
    let request = update_envelope(
        wire_record("acct-1", "team-a"),
        wire_record("acct-1", "team-b"),
    );

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::QueryFailed);
    // The timed-out lease still went back to the pool.
    assert_eq!(harness.pool.leased_count(), 0);
    assert!(harness.provider.calls().is_empty());
}

#[tokio::test]
async fn update_pool_exhaustion_becomes_error_reply() {
    let harness = Harness::new("Account");
    harness.opener.fail_next_opens(1);
    let request = update_envelope(
        wire_record("acct-1", "team-a"),
        wire_record("acct-1", "team-b"),
    );

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::PoolExhausted);
    assert!(harness.provider.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Publish-failure policy
// ---------------------------------------------------------------------------

fn broker_failure() -> PublishError {
    PublishError::Transport {
        object_type: "Account".to_string(),
        reason: "broker unreachable".to_string(),
    }
}

#[tokio::test]
async fn publish_failure_escalates_by_default() {
    let harness = Harness::new("Account");
    harness.publisher.fail_with(broker_failure());
    let mut request = envelope(Action::Create, "Account");
    request.payload.new_data = Some(wire_record("acct-1", "team-a"));

    let escalated = harness.dispatcher.dispatch(&request).await.unwrap_err();
    let EscalatedFailure::PublishAfterCommit { action, source, .. } = escalated;
    assert_eq!(action, "Create");
    assert_eq!(source, broker_failure());
    // The mutation itself committed before the failure.
    assert_eq!(harness.provider.calls(), vec!["provider.create(acct-1)"]);
}

#[tokio::test]
async fn publish_failure_can_fail_the_reply_instead() {
    let harness = Harness::with_policy("Account", SyncFailurePolicy::FailReply);
    harness.publisher.fail_with(broker_failure());
    let mut request = envelope(Action::Create, "Account");
    request.payload.new_data = Some(wire_record("acct-1", "team-a"));

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert_error_reply(&reply, ErrorCode::PublishFailed);
    assert_eq!(reply.errors()[0].kind, ErrorKind::System);
    assert_eq!(harness.provider.calls(), vec!["provider.create(acct-1)"]);
}

#[tokio::test]
async fn missing_publisher_skips_publication() {
    let harness = Harness::without_publisher("Account");
    let mut request = envelope(Action::Create, "Account");
    request.payload.new_data = Some(wire_record("acct-1", "team-a"));

    let reply = harness.dispatcher.dispatch(&request).await.unwrap();
    assert!(reply.control.status.is_success());
    assert_eq!(harness.log.entries(), vec!["provider.create(acct-1)"]);
}
