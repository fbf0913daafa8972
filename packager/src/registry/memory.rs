//! In-memory [`VersionStore`] with the same conditional-write semantics as
//! the remote table.
//!
//! Tests can seed versions, simulate a competing writer, and inject
//! transient failures.

use super::{Precondition, StoreError, VersionStore, WriteOutcome};
use crate::component_id::ComponentId;
use crate::version::ComponentVersion;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    table_exists: bool,
    versions: HashMap<String, String>,
    competitors: HashMap<String, VecDeque<String>>,
    transient_reads: u32,
    writes: usize,
    create_table_calls: usize,
}

/// Thread-safe in-memory version table.
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    state: Mutex<State>,
}

impl InMemoryVersionStore {
    /// Create an empty store whose table does not exist yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the stored version for `id`.
    #[must_use]
    pub fn with_version(self, id: &ComponentId, version: &str) -> Self {
        self.lock()
            .versions
            .insert(id.as_str().to_owned(), version.to_owned());
        self
    }

    /// Make another writer store `version` for `id` just before our next
    /// conditional write for it lands.
    pub fn queue_competing_write(&self, id: &ComponentId, version: &str) {
        self.lock()
            .competitors
            .entry(id.as_str().to_owned())
            .or_default()
            .push_back(version.to_owned());
    }

    /// Fail the next `count` reads with a transient error.
    pub fn fail_next_reads(&self, count: u32) {
        self.lock().transient_reads = count;
    }

    /// Current stored version for `id`.
    #[must_use]
    pub fn version(&self, id: &ComponentId) -> Option<String> {
        self.lock().versions.get(id.as_str()).cloned()
    }

    /// Number of successful version writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Whether the table has been created.
    #[must_use]
    pub fn table_exists(&self) -> bool {
        self.lock().table_exists
    }

    /// Number of `ensure_table` calls.
    #[must_use]
    pub fn create_table_calls(&self) -> usize {
        self.lock().create_table_calls
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VersionStore for InMemoryVersionStore {
    fn ensure_table(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.create_table_calls += 1;
        state.table_exists = true;
        Ok(())
    }

    fn read_version(&self, id: &ComponentId) -> Result<Option<String>, StoreError> {
        let mut state = self.lock();
        if state.transient_reads > 0 {
            state.transient_reads -= 1;
            return Err(StoreError::Transient("simulated outage".to_owned()));
        }
        Ok(state.versions.get(id.as_str()).cloned())
    }

    fn write_version_if(
        &self,
        id: &ComponentId,
        version: &ComponentVersion,
        precondition: &Precondition,
    ) -> Result<WriteOutcome, StoreError> {
        let mut state = self.lock();
        let key = id.as_str().to_owned();
        if let Some(competing) = state.competitors.get_mut(&key).and_then(VecDeque::pop_front) {
            state.versions.insert(key.clone(), competing);
        }

        let holds = match (precondition, state.versions.get(&key)) {
            (Precondition::Absent, None) => true,
            (Precondition::Equals(expected), Some(stored)) => expected == stored,
            _ => false,
        };
        if !holds {
            return Ok(WriteOutcome::Conflict);
        }
        state.versions.insert(key, version.to_string());
        state.writes += 1;
        Ok(WriteOutcome::Written)
    }
}
