//! In-memory doubles for the command core's external collaborators.
//!
//! Everything here is synchronous under the hood (futures resolve
//! immediately) and deterministic, so tests can script exact transport
//! behavior: canned replies, injected failures, exchanges that never
//! complete. A shared [`CallLog`] records cross-collaborator ordering.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use crate::record::TestRecord;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use steward_core::provider::{Provider, ProviderError, ProviderFuture};
use steward_core::publisher::{PublishError, SyncEvent, SyncKind, SyncPublisher};
use steward_core::record::QuerySpec;
use steward_core::transport::{
    ChannelOpener, RequestChannel, StoreReply, StoreRequest, TransportError,
};

/// Shared, ordered record of collaborator invocations.
///
/// Both [`StubProvider`] and [`RecordingPublisher`] append to the same log,
/// so tests can assert that a mutation strictly precedes its publication.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    /// All entries, in invocation order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

/// One scripted transport behavior.
#[derive(Debug)]
pub enum ScriptItem {
    /// Answer the exchange with this reply.
    Reply(StoreReply),
    /// Fail the exchange with this error.
    Fail(TransportError),
    /// Never answer; the caller's deadline fires.
    Hang,
}

/// Transport double: an opener whose channels pop replies off a shared
/// script.
///
/// All channels opened by one `ScriptedOpener` drain the same queue, so a
/// test scripts the transport as a whole rather than per channel. An
/// exhausted script fails the exchange, which usually means the test
/// forgot a step.
#[derive(Clone, Default)]
pub struct ScriptedOpener {
    script: Arc<Mutex<VecDeque<ScriptItem>>>,
    opened: Arc<AtomicUsize>,
    fail_opens: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<StoreRequest>>>,
}

impl ScriptedOpener {
    /// An opener with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, reply: StoreReply) {
        self.script.lock().unwrap().push_back(ScriptItem::Reply(reply));
    }

    /// Queue records for the next query exchange.
    pub fn push_records(&self, records: Vec<serde_json::Value>) {
        self.push_reply(StoreReply::Records(records));
    }

    /// Queue a transport failure.
    pub fn push_failure(&self, error: TransportError) {
        self.script.lock().unwrap().push_back(ScriptItem::Fail(error));
    }

    /// Queue an exchange that never completes.
    pub fn push_hang(&self) {
        self.script.lock().unwrap().push_back(ScriptItem::Hang);
    }

    /// Make the next `count` opens fail with a connection error.
    pub fn fail_next_opens(&self, count: usize) {
        self.fail_opens.store(count, Ordering::SeqCst);
    }

    /// How many channels were opened.
    #[must_use]
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Every request exchanged over any channel, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<StoreRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChannelOpener for ScriptedOpener {
    fn open(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn RequestChannel>, TransportError>> + Send + '_>>
    {
        Box::pin(async {
            let remaining = self.fail_opens.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_opens.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::ConnectionFailed(
                    "scripted open failure".to_string(),
                ));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedChannel {
                script: Arc::clone(&self.script),
                requests: Arc::clone(&self.requests),
            }) as Box<dyn RequestChannel>)
        })
    }
}

/// A channel draining its opener's shared script.
pub struct ScriptedChannel {
    script: Arc<Mutex<VecDeque<ScriptItem>>>,
    requests: Arc<Mutex<Vec<StoreRequest>>>,
}

impl RequestChannel for ScriptedChannel {
    fn exchange(
        &mut self,
        request: StoreRequest,
    ) -> Pin<Box<dyn Future<Output = Result<StoreReply, TransportError>> + Send + '_>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            let item = self.script.lock().unwrap().pop_front();
            match item {
                Some(ScriptItem::Reply(reply)) => Ok(reply),
                Some(ScriptItem::Fail(error)) => Err(error),
                Some(ScriptItem::Hang) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                None => Err(TransportError::Exchange(
                    "transport script exhausted".to_string(),
                )),
            }
        })
    }
}

/// Provider double with per-operation canned failures and a call log.
///
/// Defaults: queries answer with the configured record set (initially
/// empty), `generate` echoes its requisition, mutations succeed.
#[derive(Clone, Default)]
pub struct StubProvider {
    log: CallLog,
    query_records: Arc<Mutex<Vec<TestRecord>>>,
    fail_query: Arc<Mutex<Option<ProviderError>>>,
    fail_generate: Arc<Mutex<Option<ProviderError>>>,
    fail_create: Arc<Mutex<Option<ProviderError>>>,
    fail_update: Arc<Mutex<Option<ProviderError>>>,
    fail_delete: Arc<Mutex<Option<ProviderError>>>,
}

impl StubProvider {
    /// A stub wired to the given call log.
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Set the records every query answers with.
    pub fn set_query_records(&self, records: Vec<TestRecord>) {
        *self.query_records.lock().unwrap() = records;
    }

    /// Fail all queries with `error`.
    pub fn fail_query(&self, error: ProviderError) {
        *self.fail_query.lock().unwrap() = Some(error);
    }

    /// Fail all generates with `error`.
    pub fn fail_generate(&self, error: ProviderError) {
        *self.fail_generate.lock().unwrap() = Some(error);
    }

    /// Fail all creates with `error`.
    pub fn fail_create(&self, error: ProviderError) {
        *self.fail_create.lock().unwrap() = Some(error);
    }

    /// Fail all updates with `error`.
    pub fn fail_update(&self, error: ProviderError) {
        *self.fail_update.lock().unwrap() = Some(error);
    }

    /// Fail all deletes with `error`.
    pub fn fail_delete(&self, error: ProviderError) {
        *self.fail_delete.lock().unwrap() = Some(error);
    }

    /// Entries this stub wrote to the shared log.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.log
            .entries()
            .into_iter()
            .filter(|entry| entry.starts_with("provider."))
            .collect()
    }

    fn scripted_failure(slot: &Mutex<Option<ProviderError>>) -> Option<ProviderError> {
        slot.lock().unwrap().clone()
    }
}

impl Provider<TestRecord> for StubProvider {
    fn query(&self, spec: &QuerySpec) -> ProviderFuture<'_, Vec<TestRecord>> {
        self.log.record(format!("provider.query({})", spec.object_type));
        let failure = Self::scripted_failure(&self.fail_query);
        let records = self.query_records.lock().unwrap().clone();
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => Ok(records),
            }
        })
    }

    fn generate(&self, requisition: TestRecord) -> ProviderFuture<'_, TestRecord> {
        self.log
            .record(format!("provider.generate({})", requisition.id));
        let failure = Self::scripted_failure(&self.fail_generate);
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => Ok(requisition),
            }
        })
    }

    fn create<'a>(&'a self, record: &'a TestRecord) -> ProviderFuture<'a, ()> {
        self.log.record(format!("provider.create({})", record.id));
        let failure = Self::scripted_failure(&self.fail_create);
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }

    fn update<'a>(&'a self, record: &'a TestRecord) -> ProviderFuture<'a, ()> {
        self.log.record(format!("provider.update({})", record.id));
        let failure = Self::scripted_failure(&self.fail_update);
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }

    fn delete<'a>(&'a self, record: &'a TestRecord) -> ProviderFuture<'a, ()> {
        self.log.record(format!("provider.delete({})", record.id));
        let failure = Self::scripted_failure(&self.fail_delete);
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }
}

/// Publisher double capturing events, with an optional injected failure.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    log: CallLog,
    events: Arc<Mutex<Vec<(SyncKind, SyncEvent)>>>,
    failure: Arc<Mutex<Option<PublishError>>>,
}

impl RecordingPublisher {
    /// A publisher wired to the given call log.
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Fail every publish with `error`.
    pub fn fail_with(&self, error: PublishError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Captured events, in publication order.
    #[must_use]
    pub fn events(&self) -> Vec<(SyncKind, SyncEvent)> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncPublisher for RecordingPublisher {
    fn publish(
        &self,
        kind: SyncKind,
        event: &SyncEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        let event = event.clone();
        Box::pin(async move {
            if let Some(error) = self.failure.lock().unwrap().clone() {
                self.log.record(format!("publisher.{kind}.failed"));
                return Err(error);
            }
            self.log.record(format!("publisher.{kind}"));
            self.events.lock().unwrap().push((kind, event));
            Ok(())
        })
    }
}
