//! Redpanda sync-event publisher for Steward.
//!
//! This crate provides a production [`SyncPublisher`] implementation over
//! rdkafka (Kafka-compatible client). After a command commits a mutation,
//! the dispatcher hands the sync event here; the event lands on a per-object-
//! kind topic where downstream subscribers (inventory caches, audit feeds,
//! ticketing hooks) pick it up.
//!
//! # Why Redpanda?
//!
//! - **Kafka-compatible**: standard Kafka protocol, works with any
//!   Kafka-compatible system
//! - **Vendor swappable**: Redpanda, Apache Kafka, AWS MSK, Azure Event Hubs
//! - **Simpler operations**: easier to deploy and operate than Kafka
//!
//! # Topic Naming Convention
//!
//! Topics follow the pattern `{prefix}{object-type}-sync`, lowercased:
//! - `account-sync`: Account create/update/delete notifications
//! - `virtualprivatecloud-sync`: VPC notifications
//!
//! The record identity is used as the message key, so notifications for the
//! same record stay ordered within their partition.
//!
//! # Delivery Semantics
//!
//! At-least-once: the producer awaits broker acknowledgement before
//! reporting success, and the dispatcher surfaces any failure (there is no
//! fire-and-forget dropping of errors). Subscribers must tolerate duplicate
//! notifications.
//!
//! # Example
//!
//! ```no_run
//! use steward_redpanda::RedpandaSyncPublisher;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = RedpandaSyncPublisher::builder()
//!     .brokers("localhost:9092")
//!     .producer_acks("all")
//!     .compression("lz4")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use steward_core::publisher::{PublishError, SyncEvent, SyncKind, SyncPublisher};
use thiserror::Error;

/// Errors from constructing a publisher.
#[derive(Error, Debug, Clone)]
pub enum PublisherConfigError {
    /// Broker addresses were not supplied or the producer rejected them.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Wire form of a sync event on the topic.
///
/// The record body travels as a JSON string rather than a nested value so
/// the bincode frame round-trips regardless of the record's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEventWire {
    /// `created` | `updated` | `deleted`.
    pub kind: String,
    /// Object kind of the affected record.
    pub object_type: String,
    /// Identity of the affected record, when known.
    pub record_id: Option<String>,
    /// JSON-encoded record body.
    pub body_json: String,
    /// Unix epoch milliseconds of the observed mutation.
    pub occurred_at_ms: i64,
}

impl SyncEventWire {
    /// Encode a sync event for the topic.
    #[must_use]
    pub fn from_event(kind: SyncKind, event: &SyncEvent) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            object_type: event.object_type.clone(),
            record_id: event.record_id.clone(),
            body_json: event.body.to_string(),
            occurred_at_ms: event.occurred_at.timestamp_millis(),
        }
    }
}

/// Topic an event of the given object type lands on.
#[must_use]
pub fn sync_topic(prefix: &str, object_type: &str) -> String {
    format!("{prefix}{}-sync", object_type.to_lowercase())
}

/// Redpanda-backed sync publisher.
///
/// Producer sends are awaited through broker acknowledgement within the
/// configured timeout, so a returned `Ok` means the broker has the event.
pub struct RedpandaSyncPublisher {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    topic_prefix: String,
}

impl RedpandaSyncPublisher {
    /// Create a publisher with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherConfigError::ConnectionFailed`] if the producer
    /// cannot be created from the given brokers.
    pub fn new(brokers: &str) -> Result<Self, PublisherConfigError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the publisher.
    #[must_use]
    pub fn builder() -> RedpandaSyncPublisherBuilder {
        RedpandaSyncPublisherBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for configuring a [`RedpandaSyncPublisher`].
#[derive(Default)]
pub struct RedpandaSyncPublisherBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    topic_prefix: Option<String>,
}

impl RedpandaSyncPublisherBuilder {
    /// Set the broker addresses (comma-separated, e.g. "localhost:9092").
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1", or "all".
    ///
    /// Default: "1"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a prefix applied to every sync topic (e.g. `"steward."`).
    ///
    /// Default: no prefix
    #[must_use]
    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = Some(prefix.into());
        self
    }

    /// Build the [`RedpandaSyncPublisher`].
    ///
    /// # Errors
    ///
    /// Returns [`PublisherConfigError::ConnectionFailed`] if brokers are not
    /// set or the producer cannot be created.
    pub fn build(self) -> Result<RedpandaSyncPublisher, PublisherConfigError> {
        let brokers = self.brokers.ok_or_else(|| {
            PublisherConfigError::ConnectionFailed("Brokers not configured".to_string())
        })?;

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .set(
                "compression.type",
                self.compression.as_deref().unwrap_or("none"),
            );

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            PublisherConfigError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            acks = self.producer_acks.as_deref().unwrap_or("1"),
            compression = self.compression.as_deref().unwrap_or("none"),
            "RedpandaSyncPublisher created successfully"
        );

        Ok(RedpandaSyncPublisher {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            topic_prefix: self.topic_prefix.unwrap_or_default(),
        })
    }
}

impl SyncPublisher for RedpandaSyncPublisher {
    fn publish(
        &self,
        kind: SyncKind,
        event: &SyncEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        // Clone data before moving into async block
        let topic = sync_topic(&self.topic_prefix, &event.object_type);
        let wire = SyncEventWire::from_event(kind, event);
        let object_type = event.object_type.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let payload =
                bincode::serialize(&wire).map_err(|e| PublishError::Transport {
                    object_type: object_type.clone(),
                    reason: format!("Failed to serialize sync event: {e}"),
                })?;

            // Key by record identity so notifications for the same record
            // stay ordered within their partition.
            let key = wire
                .record_id
                .clone()
                .unwrap_or_else(|| wire.object_type.clone());

            let record = FutureRecord::to(&topic).payload(&payload).key(&key);

            let send_result = self.producer.send(record, Timeout::After(timeout)).await;

            match send_result {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        kind = %wire.kind,
                        "Sync event published successfully"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        error = %kafka_error,
                        "Failed to publish sync event"
                    );
                    Err(PublishError::Transport {
                        object_type,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }
}
