//! Sanity tests for the in-memory doubles themselves.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use steward_core::provider::{Provider, ProviderError};
use steward_core::publisher::{PublishError, SyncEvent, SyncKind, SyncPublisher};
use steward_core::record::{ProvisionedRecord, QuerySpec, RecordBuilder, RecordId};
use steward_core::transport::{
    ChannelOpener, RequestChannel, StoreReply, StoreRequest, TransportError,
};
use steward_testing::{wire_record, CallLog, RecordingPublisher, ScriptedOpener, StubProvider, TestRecord, TestRecordBuilder};

#[tokio::test]
async fn scripted_opener_channels_share_one_script() {
    let opener = ScriptedOpener::new();
    opener.push_records(vec![wire_record("acct-1", "team-a")]);
    opener.push_failure(TransportError::Exchange("boom".to_string()));

    let mut first = opener.open().await.unwrap();
    let mut second = opener.open().await.unwrap();
    assert_eq!(opener.opened_count(), 2);

    let spec = QuerySpec::by_record_id("Account", &RecordId::new("acct-1"));
    let reply = first
        .exchange(StoreRequest::Query(spec.clone()))
        .await
        .unwrap();
    assert!(matches!(reply, StoreReply::Records(records) if records.len() == 1));

    let err = second
        .exchange(StoreRequest::Query(spec.clone()))
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Exchange("boom".to_string()));

    // Script exhausted: a further exchange fails loudly.
    assert!(first.exchange(StoreRequest::Query(spec)).await.is_err());
}

#[tokio::test]
async fn scripted_opener_can_fail_opens() {
    let opener = ScriptedOpener::new();
    opener.fail_next_opens(1);
    assert!(opener.open().await.is_err());
    assert!(opener.open().await.is_ok());
}

#[tokio::test]
async fn stub_provider_records_calls_in_order() {
    let log = CallLog::new();
    let provider = StubProvider::new(log.clone());
    let record = TestRecord::new("acct-1", "team-a");

    provider.create(&record).await.unwrap();
    provider.delete(&record).await.unwrap();

    assert_eq!(
        provider.calls(),
        vec!["provider.create(acct-1)", "provider.delete(acct-1)"]
    );
}

#[tokio::test]
async fn stub_provider_injected_failure_is_returned() {
    let provider = StubProvider::new(CallLog::new());
    provider.fail_update(ProviderError::system("ERR_STORE", "store down"));
    let err = provider
        .update(&TestRecord::new("acct-1", "team-a"))
        .await
        .unwrap_err();
    assert_eq!(err.code, "ERR_STORE");
}

#[tokio::test]
async fn recording_publisher_captures_and_fails() {
    let publisher = RecordingPublisher::new(CallLog::new());
    let event = SyncEvent {
        object_type: "Account".to_string(),
        record_id: Some("acct-1".to_string()),
        body: wire_record("acct-1", "team-a"),
        occurred_at: steward_core::Utc::now(),
    };

    publisher.publish(SyncKind::Created, &event).await.unwrap();
    assert_eq!(publisher.events().len(), 1);

    publisher.fail_with(PublishError::Transport {
        object_type: "Account".to_string(),
        reason: "broker gone".to_string(),
    });
    assert!(publisher.publish(SyncKind::Deleted, &event).await.is_err());
    // The failed publication captured nothing.
    assert_eq!(publisher.events().len(), 1);
}

#[test]
fn builder_round_trips_record_fields() {
    let builder = TestRecordBuilder;
    let record = TestRecord::new("acct-9", "team-x");
    let rebuilt = builder.build(&builder.to_wire(&record)).unwrap();
    assert_eq!(rebuilt, record);
}

#[test]
fn builder_rejects_missing_record_id() {
    let builder = TestRecordBuilder;
    let err = builder
        .build(&serde_json::json!({"owner": "team-x"}))
        .unwrap_err();
    assert!(err.reason.contains("recordId"));
}

#[test]
fn stamp_and_baseline_mutators() {
    let mut record = TestRecord::new("acct-1", "team-a");
    record.stamp_requestor("user@example.edu");
    assert_eq!(record.requested_by.as_deref(), Some("user@example.edu"));

    let baseline = TestRecord::new("acct-1", "team-before");
    record.attach_baseline(baseline.clone());
    assert_eq!(record.baseline.as_deref(), Some(&baseline));
    assert_eq!(record.record_id(), RecordId::new("acct-1"));
}
