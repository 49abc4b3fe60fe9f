//! Correlation values exchanged across the RPC boundary.
//!
//! The caller embeds a [`ProfilingContext`] in its request; the callee
//! makes the carried label current while it runs the operation and echoes
//! the id back with its response.

use serde::{Deserialize, Serialize};

use crate::current::{self, CurrentKeyGuard};
use crate::error::Result;
use crate::id::ProfilingId;
use crate::manager::RemoteProfilerManager;

/// Profiling identity embedded in request and response payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfilingContext {
    /// Globally-unique id of the profiled call
    pub id: ProfilingId,
    /// Label for the callee to record its events under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ProfilingContext {
    /// Context carrying only the id
    pub fn new(id: ProfilingId) -> Self {
        Self { id, label: None }
    }

    /// Attach a label for the callee
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Make the carried label current on this thread for the guard's lifetime.
    ///
    /// Returns `Ok(None)` when the context carries no label.
    pub fn enter(&self) -> Result<Option<CurrentKeyGuard>> {
        self.label
            .as_deref()
            .map(current::enter_current_key)
            .transpose()
    }
}

/// An outstanding profiled call on the initiating side.
///
/// Created by [`RemoteProfilerManager::begin_remote_call`] with its label
/// already saved. [`complete`](Self::complete) consumes the handle, so the
/// entry is retrieved and erased exactly once.
#[derive(Debug)]
#[must_use = "dropping a pending call leaves its entry in the registry"]
pub struct PendingRemoteCall<'a> {
    manager: &'a RemoteProfilerManager,
    id: ProfilingId,
}

impl PendingRemoteCall<'_> {
    /// Id of the call
    pub fn id(&self) -> ProfilingId {
        self.id
    }

    /// Outbound context for the request payload
    pub fn context(&self) -> ProfilingContext {
        ProfilingContext::new(self.id)
    }

    /// Outbound context that also ships the label to the callee
    pub fn context_with_label(&self) -> Result<ProfilingContext> {
        let label = self.manager.try_retrieve_key(self.id)?;
        Ok(ProfilingContext::new(self.id).with_label(label))
    }

    /// Attribute the response: return the saved label and erase the entry
    pub fn complete(self) -> Result<String> {
        let label = self.manager.try_erase_key(self.id)?;
        tracing::debug!(id = %self.id, label = %label, "Remote call attributed");
        Ok(label)
    }
}

impl RemoteProfilerManager {
    /// Allocate an id for an outgoing call and save its label
    pub fn begin_remote_call(&self, label: impl Into<String>) -> Result<PendingRemoteCall<'_>> {
        let id = self.next_profiling_id();
        self.try_save_key(id, label)?;
        Ok(PendingRemoteCall { manager: self, id })
    }
}
