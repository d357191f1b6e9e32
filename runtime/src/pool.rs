//! Bounded pool of reusable request channels.
//!
//! Opening an outbound channel to the directory service costs a connection
//! setup per channel. The [`ChannelPool`] amortizes that cost across
//! requests while guaranteeing exclusivity: a channel is only ever reachable
//! through a [`LeasedChannel`], and at most one lease per channel exists at
//! a time.
//!
//! # Lease lifecycle
//!
//! - [`ChannelPool::lease`] waits for capacity (bounded by the configured
//!   lease wait), then hands out an idle channel or opens a fresh one.
//! - The lease is returned by dropping the [`LeasedChannel`]. Drop runs on
//!   every exit path (success, error return, panic unwind), so a lease is
//!   released exactly once and release itself can never fail. An explicit
//!   [`LeasedChannel::release`] is provided for code that wants to name the
//!   return point.
//!
//! # Example
//!
//! ```ignore
//! let pool = ChannelPool::new(opener, PoolConfig::default());
//! let mut lease = pool.lease().await?;
//! let reply = lease.exchange(request, Duration::from_secs(10)).await?;
//! // lease drops here; the channel is back in the pool
//! ```

use metrics::gauge;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use steward_core::transport::{
    ChannelOpener, RequestChannel, StoreReply, StoreRequest, TransportError,
};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Gauge tracking channels currently leased out of the pool.
pub const LEASED_GAUGE: &str = "steward_pool_leased_channels";

/// Errors from leasing a channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No channel became available within the configured lease wait.
    #[error("Pool exhausted: no channel available within {0:?}")]
    Exhausted(Duration),
    /// The transport could not produce a channel.
    #[error("Pool exhausted: transport cannot open a channel: {0}")]
    OpenFailed(#[from] TransportError),
}

/// Channel pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum channels open at once.
    pub capacity: usize,
    /// How long `lease()` waits for a free slot before failing.
    pub lease_wait: Duration,
    /// Request timeout stamped onto every lease, overriding the client
    /// default. `None` leaves the client default in force.
    pub request_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            lease_wait: Duration::from_secs(5),
            request_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder {
            capacity: None,
            lease_wait: None,
            request_timeout: None,
        }
    }
}

/// Builder for [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    capacity: Option<usize>,
    lease_wait: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl PoolConfigBuilder {
    /// Set the maximum number of channels open at once.
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set how long `lease()` waits for a free slot.
    #[must_use]
    pub const fn lease_wait(mut self, wait: Duration) -> Self {
        self.lease_wait = Some(wait);
        self
    }

    /// Set a request timeout applied to every lease from this pool.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> PoolConfig {
        let defaults = PoolConfig::default();
        PoolConfig {
            capacity: self.capacity.unwrap_or(defaults.capacity),
            lease_wait: self.lease_wait.unwrap_or(defaults.lease_wait),
            request_timeout: self.request_timeout.or(defaults.request_timeout),
        }
    }
}

/// State shared between the pool and its outstanding leases.
struct PoolShared {
    idle: Mutex<Vec<Box<dyn RequestChannel>>>,
    leased: AtomicUsize,
}

impl PoolShared {
    fn return_channel(&self, channel: Box<dyn RequestChannel>) {
        // A poisoned idle list just forfeits the channel; the permit release
        // restores capacity and a replacement is opened on the next lease.
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(channel);
        }
        let outstanding = self.leased.fetch_sub(1, Ordering::AcqRel) - 1;
        #[allow(clippy::cast_precision_loss)]
        gauge!(LEASED_GAUGE).set(outstanding as f64);
    }
}

/// Bounded pool of reusable request channels.
///
/// Cloning is cheap; clones share the same pool state.
#[derive(Clone)]
pub struct ChannelPool {
    opener: Arc<dyn ChannelOpener>,
    config: Arc<PoolConfig>,
    semaphore: Arc<Semaphore>,
    shared: Arc<PoolShared>,
}

impl ChannelPool {
    /// Create a pool over the given opener.
    #[must_use]
    pub fn new(opener: Arc<dyn ChannelOpener>, config: PoolConfig) -> Self {
        Self {
            opener,
            semaphore: Arc::new(Semaphore::new(config.capacity)),
            config: Arc::new(config),
            shared: Arc::new(PoolShared {
                idle: Mutex::new(Vec::new()),
                leased: AtomicUsize::new(0),
            }),
        }
    }

    /// Lease a channel exclusively.
    ///
    /// Waits up to the configured `lease_wait` for a free slot, then reuses
    /// an idle channel or opens a fresh one. The pool's `request_timeout`,
    /// when set, is stamped onto the lease.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Exhausted`] when no slot frees up in time.
    /// - [`PoolError::OpenFailed`] when the transport cannot open a channel;
    ///   the slot is released before returning.
    pub async fn lease(&self) -> Result<LeasedChannel, PoolError> {
        let permit = tokio::time::timeout(
            self.config.lease_wait,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| PoolError::Exhausted(self.config.lease_wait))?
        .map_err(|_| PoolError::Exhausted(self.config.lease_wait))?;

        let idle = self
            .shared
            .idle
            .lock()
            .ok()
            .and_then(|mut channels| channels.pop());
        let channel = match idle {
            Some(channel) => channel,
            // Permit drops on the error path, releasing the slot.
            None => self.opener.open().await?,
        };

        let outstanding = self.shared.leased.fetch_add(1, Ordering::AcqRel) + 1;
        #[allow(clippy::cast_precision_loss)]
        gauge!(LEASED_GAUGE).set(outstanding as f64);

        Ok(LeasedChannel {
            channel: Some(channel),
            _permit: Some(permit),
            shared: Arc::clone(&self.shared),
            request_timeout: self.config.request_timeout,
        })
    }

    /// Channels currently leased out.
    #[must_use]
    pub fn leased_count(&self) -> usize {
        self.shared.leased.load(Ordering::Acquire)
    }

    /// Channels sitting idle in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

/// An exclusively leased channel.
///
/// Dropping the lease returns the channel to the pool; this is the release
/// operation and it cannot fail or run twice.
pub struct LeasedChannel {
    channel: Option<Box<dyn RequestChannel>>,
    _permit: Option<OwnedSemaphorePermit>,
    shared: Arc<PoolShared>,
    request_timeout: Option<Duration>,
}

impl std::fmt::Debug for LeasedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeasedChannel")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl LeasedChannel {
    /// Pool-level request timeout stamped onto this lease, if any.
    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Perform one exchange with the given deadline.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] when no reply arrives within
    /// `deadline`, or the channel's own error when the exchange fails.
    pub async fn exchange(
        &mut self,
        request: StoreRequest,
        deadline: Duration,
    ) -> Result<StoreReply, TransportError> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| TransportError::Exchange("channel already released".to_string()))?;
        tokio::time::timeout(deadline, channel.exchange(request))
            .await
            .map_err(|_| TransportError::Timeout(deadline))?
    }

    /// Return the channel to the pool now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LeasedChannel {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.shared.return_channel(channel);
        }
        // The permit drops with self, freeing the capacity slot.
    }
}
