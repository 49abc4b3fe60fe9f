//! The remote profiler registry.
//!
//! Owns the worker-scoped id counter and the map from [`ProfilingId`] to
//! profiling label. Both sit behind one mutex; every operation is a
//! constant-time map or counter access taken under that lock.
//!
//! # Lifecycle of a correlation entry
//!
//! 1. The initiating side allocates an id and saves its label.
//! 2. The id travels inside the request; the response carries it back.
//! 3. On receipt of the response the label is retrieved to attribute the
//!    remote events, then the entry is erased exactly once.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::config::{DuplicateKeyPolicy, ProfilerConfig};
use crate::current::{self, CurrentKeyGuard};
use crate::error::{contract_violation, ProfilerError, Result};
use crate::id::{LocalId, ProfilingId, WorkerId};

static GLOBAL: OnceLock<RemoteProfilerManager> = OnceLock::new();

/// Point-in-time counters for one registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Identity the registry allocates under
    pub worker_id: WorkerId,
    /// Local ids handed out so far
    pub ids_allocated: u64,
    /// Entries currently registered
    pub live_keys: usize,
    /// Successful saves, overwrites included
    pub saved: u64,
    /// Successful erases
    pub erased: u64,
    /// Saves that replaced an existing label
    pub overwritten: u64,
}

#[derive(Debug)]
struct RegistryState {
    next_local_id: LocalId,
    keys: HashMap<ProfilingId, String>,
    ids_allocated: u64,
    saved: u64,
    erased: u64,
    overwritten: u64,
}

/// Registry correlating globally-unique profiling ids with labels.
///
/// Construct one per process, either owned by the composition root and
/// shared via `Arc`, or installed process-wide with [`install`].
///
/// [`install`]: RemoteProfilerManager::install
#[derive(Debug)]
pub struct RemoteProfilerManager {
    config: ProfilerConfig,
    state: Mutex<RegistryState>,
}

impl RemoteProfilerManager {
    /// Create a registry seeded for the configured worker
    pub fn new(config: ProfilerConfig) -> Self {
        tracing::debug!(
            worker_id = %config.worker_id,
            policy = ?config.duplicate_key_policy,
            "Creating remote profiler registry"
        );
        Self {
            state: Mutex::new(RegistryState {
                next_local_id: config.worker_id.first_local_id(),
                keys: HashMap::new(),
                ids_allocated: 0,
                saved: 0,
                erased: 0,
                overwritten: 0,
            }),
            config,
        }
    }

    /// Create a registry with default settings for `worker_id`
    pub fn with_worker_id(worker_id: impl Into<WorkerId>) -> Self {
        Self::new(ProfilerConfig::new(worker_id))
    }

    /// Install the process-wide registry. Only the first call succeeds.
    pub fn install(config: ProfilerConfig) -> Result<&'static Self> {
        GLOBAL
            .set(Self::new(config))
            .map_err(|_| ProfilerError::AlreadyInstalled)?;
        let installed = Self::try_global()?;
        tracing::info!(worker_id = %installed.worker_id(), "Installed process-wide profiler registry");
        Ok(installed)
    }

    /// The process-wide registry, if installed
    pub fn try_global() -> Result<&'static Self> {
        GLOBAL.get().ok_or(ProfilerError::NotInstalled)
    }

    /// The process-wide registry.
    ///
    /// # Panics
    ///
    /// Panics if [`install`](Self::install) has not run yet.
    pub fn global() -> &'static Self {
        Self::try_global().unwrap_or_else(|e| contract_violation(e))
    }

    /// Configuration the registry was built with
    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Identity ids are allocated under
    pub fn worker_id(&self) -> WorkerId {
        self.config.worker_id
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // State is never left half-updated: panics only happen after the
        // guard is released.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate the next local id. Values strictly increase and already
    /// encode this worker in their high bits.
    pub fn next_local_id(&self) -> LocalId {
        let mut state = self.lock();
        let id = state.next_local_id;
        state.next_local_id = id.successor();
        state.ids_allocated += 1;
        id
    }

    /// Allocate the next globally-unique profiling id
    pub fn next_profiling_id(&self) -> ProfilingId {
        ProfilingId::new(self.worker_id(), self.next_local_id())
    }

    /// Register `key` under `id`, honoring the duplicate key policy
    pub fn try_save_key(&self, id: ProfilingId, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        let mut state = self.lock();
        if state.keys.contains_key(&id) {
            match self.config.duplicate_key_policy {
                DuplicateKeyPolicy::Reject => return Err(ProfilerError::DuplicateKey(id)),
                DuplicateKeyPolicy::Overwrite => {
                    tracing::warn!(id = %id, "Overwriting existing profiling key");
                    state.overwritten += 1;
                }
            }
        }
        tracing::debug!(id = %id, key = %key, "Saved profiling key");
        state.keys.insert(id, key);
        state.saved += 1;
        Ok(())
    }

    /// Register `key` under `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already registered and the policy is
    /// [`DuplicateKeyPolicy::Reject`].
    pub fn save_key(&self, id: ProfilingId, key: impl Into<String>) {
        if let Err(e) = self.try_save_key(id, key) {
            contract_violation(e);
        }
    }

    /// Look up the label registered under `id`
    pub fn try_retrieve_key(&self, id: ProfilingId) -> Result<String> {
        self.lock()
            .keys
            .get(&id)
            .cloned()
            .ok_or(ProfilerError::KeyNotFound(id))
    }

    /// Look up the label registered under `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never saved or has been erased.
    pub fn retrieve_key(&self, id: ProfilingId) -> String {
        self.try_retrieve_key(id).unwrap_or_else(|e| contract_violation(e))
    }

    /// Remove the entry for `id`, returning its label
    pub fn try_erase_key(&self, id: ProfilingId) -> Result<String> {
        let mut state = self.lock();
        let key = state
            .keys
            .remove(&id)
            .ok_or(ProfilerError::KeyNotFound(id))?;
        state.erased += 1;
        tracing::debug!(id = %id, "Erased profiling key");
        Ok(key)
    }

    /// Remove the entry for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never saved or has already been erased.
    pub fn erase_key(&self, id: ProfilingId) {
        if let Err(e) = self.try_erase_key(id) {
            contract_violation(e);
        }
    }

    /// Whether a label is registered under `id`
    pub fn contains_key(&self, id: ProfilingId) -> bool {
        self.lock().keys.contains_key(&id)
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    /// Whether no entries are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registry counters
    pub fn stats(&self) -> RegistryStats {
        let state = self.lock();
        RegistryStats {
            worker_id: self.worker_id(),
            ids_allocated: state.ids_allocated,
            live_keys: state.keys.len(),
            saved: state.saved,
            erased: state.erased,
            overwritten: state.overwritten,
        }
    }

    /// See [`current::set_current_key`]
    pub fn set_current_key(&self, key: impl Into<String>) {
        current::set_current_key(key)
    }

    /// See [`current::unset_current_key`]
    pub fn unset_current_key(&self) {
        current::unset_current_key()
    }

    /// See [`current::current_key`]
    pub fn current_key(&self) -> String {
        current::current_key()
    }

    /// See [`current::enter_current_key`]
    pub fn enter_current_key(&self, key: impl Into<String>) -> Result<CurrentKeyGuard> {
        current::enter_current_key(key)
    }
}
