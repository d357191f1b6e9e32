//! Provider seam: the pluggable strategy that performs actual provisioning.
//!
//! A [`Provider`] implements the five operations behind the command verbs.
//! The real implementations live entirely outside this workspace (AWS calls,
//! database persistence); the core only dispatches into the trait and maps
//! [`ProviderError`]s onto failure replies.
//!
//! The original system instantiated providers reflectively from a configured
//! class name. Here resolution is a [`ProviderRegistry`]: object kinds are
//! mapped to factory functions at startup, and lookup failures are ordinary
//! errors instead of class-loading surprises.
//!
//! # Dyn Compatibility
//!
//! `Provider` uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so it can be held as `Arc<dyn Provider<R>>` by the dispatcher.

use crate::envelope::{ErrorCode, ErrorEntry, ErrorKind};
use crate::record::{ProvisionedRecord, QuerySpec};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Future type returned by provider operations.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Structured failure from a provider operation.
///
/// Carries the application/system classification and a stable code exactly as
/// the backing system reported them; the dispatcher copies all three fields
/// verbatim into the failure reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Provider {kind:?} failure [{code}]: {description}")]
pub struct ProviderError {
    /// Application (client-correctable) or system (backing-store) failure.
    pub kind: ErrorKind,
    /// Stable provider-assigned code.
    pub code: String,
    /// Human-readable description.
    pub description: String,
}

impl ProviderError {
    /// An [`ErrorKind::Application`] failure.
    pub fn application(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Application,
            code: code.into(),
            description: description.into(),
        }
    }

    /// An [`ErrorKind::System`] failure.
    pub fn system(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::System,
            code: code.into(),
            description: description.into(),
        }
    }

    /// Convert into a reply error entry, preserving kind and description.
    #[must_use]
    pub fn to_entry(&self) -> ErrorEntry {
        ErrorEntry {
            kind: self.kind,
            code: ErrorCode::ProviderFailure,
            description: format!("[{}] {}", self.code, self.description),
        }
    }
}

/// Pluggable provisioning strategy for one object kind.
///
/// Implementations must be `Send + Sync`; the dispatcher shares one provider
/// across concurrent requests.
pub trait Provider<R: ProvisionedRecord>: Send + Sync {
    /// Fetch records matching `spec`, in the order the backing store returns.
    fn query(&self, spec: &QuerySpec) -> ProviderFuture<'_, Vec<R>>;

    /// Produce and persist a record from a requisition.
    fn generate(&self, requisition: R) -> ProviderFuture<'_, R>;

    /// Persist a caller-supplied record.
    fn create<'a>(&'a self, record: &'a R) -> ProviderFuture<'a, ()>;

    /// Replace a record. The baseline conflict check has already passed.
    fn update<'a>(&'a self, record: &'a R) -> ProviderFuture<'a, ()>;

    /// Remove a record.
    fn delete<'a>(&'a self, record: &'a R) -> ProviderFuture<'a, ()>;
}

/// No provider factory is registered for an object kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No provider registered for object kind: {0}")]
pub struct UnknownObjectKind(pub String);

/// Factory producing a provider instance for one object kind.
pub type ProviderFactory<R> = Arc<dyn Fn() -> Arc<dyn Provider<R>> + Send + Sync>;

/// Startup-time mapping from object kind to provider factory.
///
/// # Example
///
/// ```ignore
/// let mut registry = ProviderRegistry::new();
/// registry.register("Account", || Arc::new(AccountProvider::from_env()));
/// let provider = registry.resolve("Account")?;
/// ```
pub struct ProviderRegistry<R: ProvisionedRecord> {
    factories: HashMap<String, ProviderFactory<R>>,
}

impl<R: ProvisionedRecord> ProviderRegistry<R> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for an object kind, replacing any previous one.
    pub fn register<F>(&mut self, object_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Provider<R>> + Send + Sync + 'static,
    {
        self.factories.insert(object_type.into(), Arc::new(factory));
    }

    /// Instantiate the provider for an object kind.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownObjectKind`] when no factory is registered.
    pub fn resolve(&self, object_type: &str) -> Result<Arc<dyn Provider<R>>, UnknownObjectKind> {
        self.factories
            .get(object_type)
            .map(|factory| factory())
            .ok_or_else(|| UnknownObjectKind(object_type.to_string()))
    }

    /// Object kinds with a registered factory.
    #[must_use]
    pub fn registered_kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl<R: ProvisionedRecord> Default for ProviderRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}
