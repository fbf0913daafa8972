//! Version registry client.
//!
//! The registry is a key-value table mapping component ids to the last
//! version issued. [`RegistryClient::next_version`] reserves the next version
//! with a read, a local increment, and a conditional write, so concurrent
//! packagers never hand out the same version twice.
//!
//! # Sub-modules
//!
//! - [`dynamodb`] - HTTP store speaking the DynamoDB JSON protocol.
//! - [`sigv4`] - AWS Signature V4 request signing.
//! - [`memory`] - In-memory store used by tests.

pub mod dynamodb;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod sigv4;

pub use dynamodb::DynamoDbStore;
#[cfg(any(test, feature = "test-support"))]
pub use memory::InMemoryVersionStore;

use crate::component_id::ComponentId;
use crate::error::{PackagerError, Result};
use crate::version::ComponentVersion;
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// Default table name.
pub const DEFAULT_TABLE: &str = "Extensions";

/// Failure reported by a [`VersionStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The request may succeed if repeated (transport error, 5xx, throttling).
    #[error("transient store failure: {0}")]
    Transient(String),
    /// The store refused the request.
    #[error("store rejected request: {0}")]
    Rejected(String),
}

/// Condition a version write is made under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// No entry exists for the id.
    Absent,
    /// The stored version is exactly this string.
    Equals(String),
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The condition held and the version was stored.
    Written,
    /// Another writer changed the entry first.
    Conflict,
}

/// Storage backend for the version table.
///
/// Implementations must be safe to share between the threads that reserve
/// versions concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait VersionStore {
    /// Create the version table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the table cannot be described or created.
    fn ensure_table(&self) -> std::result::Result<(), StoreError>;

    /// Strongly consistent read of the stored version string.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn read_version(&self, id: &ComponentId) -> std::result::Result<Option<String>, StoreError>;

    /// Store `version` for `id` if `precondition` holds.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails for any reason other than
    /// the precondition.
    fn write_version_if(
        &self,
        id: &ComponentId,
        version: &ComponentVersion,
        precondition: &Precondition,
    ) -> std::result::Result<WriteOutcome, StoreError>;
}

/// Retry bounds for registry calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per store call before giving up on transient failures.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled after each retry.
    pub initial_backoff: Duration,
    /// Read-compute-write cycles restarted after a lost conditional write.
    pub max_conflict_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_conflict_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// A policy with the default bounds and no sleeping between retries.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Reserves component versions against a [`VersionStore`].
#[derive(Debug)]
pub struct RegistryClient<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: VersionStore> RegistryClient<S> {
    /// Create a client over `store`.
    #[must_use]
    pub const fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Access the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Create the version table if needed. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::RegistryUnavailable`] or
    /// [`PackagerError::RegistryRejected`].
    pub fn ensure_table(&self) -> Result<()> {
        self.with_retries("CreateTable", || self.store.ensure_table())
    }

    /// Reserve and persist the next version for `id`.
    ///
    /// An absent entry yields [`ComponentVersion::seed`]; otherwise the stored
    /// version's last part is incremented. The value is written before it is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::CorruptVersion`] if the stored value cannot be
    /// parsed or incremented, [`PackagerError::RegistryContention`] if other
    /// writers keep winning, and the errors of [`Self::ensure_table`] for
    /// store failures.
    pub fn next_version(&self, id: &ComponentId) -> Result<ComponentVersion> {
        let max_writes = self.retry.max_conflict_retries.saturating_add(1);
        for write in 1..=max_writes {
            let stored = self.with_retries("GetItem", || self.store.read_version(id))?;
            debug!("registry holds {stored:?} for {id}");
            let (next, precondition) = match stored {
                None => (ComponentVersion::seed(), Precondition::Absent),
                Some(raw) => (next_after(id, &raw)?, Precondition::Equals(raw)),
            };

            match self.with_retries("PutItem", || {
                self.store.write_version_if(id, &next, &precondition)
            })? {
                WriteOutcome::Written => {
                    info!("reserved version {next} for {id}");
                    return Ok(next);
                }
                WriteOutcome::Conflict => {
                    warn!("version write for {id} lost to another writer ({write}/{max_writes})");
                }
            }
        }
        Err(PackagerError::RegistryContention {
            id: id.clone(),
            attempts: max_writes,
        })
    }

    fn with_retries<T>(
        &self,
        operation: &'static str,
        mut call: impl FnMut() -> std::result::Result<T, StoreError>,
    ) -> Result<T> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(StoreError::Rejected(reason)) => {
                    return Err(PackagerError::RegistryRejected { operation, reason });
                }
                Err(StoreError::Transient(reason)) if attempt >= max_attempts => {
                    return Err(PackagerError::RegistryUnavailable {
                        attempts: attempt,
                        reason,
                    });
                }
                Err(StoreError::Transient(reason)) => {
                    warn!("{operation} failed (attempt {attempt}/{max_attempts}): {reason}");
                    thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}

fn next_after(id: &ComponentId, raw: &str) -> Result<ComponentVersion> {
    let corrupt = |reason: String| PackagerError::CorruptVersion {
        id: id.clone(),
        value: raw.to_owned(),
        reason,
    };
    let current = raw
        .parse::<ComponentVersion>()
        .map_err(|e| corrupt(e.to_string()))?;
    current.next().map_err(|e| corrupt(e.to_string()))
}
