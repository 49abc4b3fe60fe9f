//! Per-context "current profiling key" slot.
//!
//! The RPC layer sets the key around the scope where a remote operation
//! runs, and profiler code further down reads it without the label being
//! passed through every signature in between.
//!
//! Two slots exist:
//!
//! - a tokio task-local slot, opened by [`with_current_key`], for futures
//!   that may hop between worker threads;
//! - a thread-local slot for synchronous callers.
//!
//! Inside a task scope every operation acts on the task slot; elsewhere it
//! acts on the thread slot. The slot holds one key, not a stack: setting a
//! key while one is active is a contract violation.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{contract_violation, ProfilerError, Result};

/// Source of tokens telling apart successive keys in one slot
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
struct ActiveKey {
    token: u64,
    key: String,
}

type Slot = RefCell<Option<ActiveKey>>;

thread_local! {
    static THREAD_CURRENT_KEY: Slot = const { RefCell::new(None) };
}

tokio::task_local! {
    static TASK_CURRENT_KEY: Slot;
}

/// Run `f` against the slot of the current context
fn with_slot<R>(f: impl FnOnce(&Slot) -> R) -> R {
    if TASK_CURRENT_KEY.try_with(|_| ()).is_ok() {
        TASK_CURRENT_KEY.with(f)
    } else {
        THREAD_CURRENT_KEY.with(f)
    }
}

fn occupied() -> Option<String> {
    with_slot(|slot| slot.borrow().as_ref().map(|active| active.key.clone()))
}

fn activate(key: String) -> Result<u64> {
    with_slot(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(active) = slot.as_ref() {
            return Err(ProfilerError::CurrentKeyAlreadySet {
                current: active.key.clone(),
            });
        }
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(key = %key, "Current profiling key set");
        *slot = Some(ActiveKey { token, key });
        Ok(token)
    })
}

/// Set the current key for this context, failing if one is already active
pub fn try_set_current_key(key: impl Into<String>) -> Result<()> {
    activate(key.into()).map(|_| ())
}

/// Set the current key for this context.
///
/// Outside a [`with_current_key`] scope the key lives in the thread-local
/// slot. From async code that is the tokio worker thread, and the key stays
/// there across `.await`, visible to other tasks polled on that thread.
/// Async callers should use [`with_current_key`] instead.
///
/// # Panics
///
/// Panics if a key is already set and has not been cleared.
pub fn set_current_key(key: impl Into<String>) {
    if let Err(e) = try_set_current_key(key) {
        contract_violation(e);
    }
}

/// Clear this context's current key. Clearing an empty slot is a no-op.
pub fn unset_current_key() {
    with_slot(|slot| slot.borrow_mut().take());
}

/// The key active in this context, if any
pub fn try_current_key() -> Result<String> {
    occupied().ok_or(ProfilerError::CurrentKeyNotSet)
}

/// The key active in this context.
///
/// # Panics
///
/// Panics if no key is set.
pub fn current_key() -> String {
    try_current_key().unwrap_or_else(|e| contract_violation(e))
}

/// Whether a key is active in this context
pub fn has_current_key() -> bool {
    occupied().is_some()
}

/// Set the current key and clear it again when the guard drops.
///
/// The guard clears the slot on every exit path, unwinding included, so a
/// forgotten unset cannot leak a key into the next call on this thread.
/// A guard whose key was already replaced leaves the newer key alone.
pub fn enter_current_key(key: impl Into<String>) -> Result<CurrentKeyGuard> {
    let key = key.into();
    let token = activate(key.clone())?;
    Ok(CurrentKeyGuard {
        key,
        token,
        _not_send: PhantomData,
    })
}

/// Run `fut` with `key` as the current key of the enclosing task.
///
/// The key follows the future across await points and worker threads and
/// is gone once the future completes. Inside the scope it can be unset and
/// replaced like the thread-local key.
pub async fn with_current_key<F>(key: impl Into<String>, fut: F) -> Result<F::Output>
where
    F: Future,
{
    if let Some(current) = occupied() {
        return Err(ProfilerError::CurrentKeyAlreadySet { current });
    }
    let active = ActiveKey {
        token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
        key: key.into(),
    };
    Ok(TASK_CURRENT_KEY.scope(RefCell::new(Some(active)), fut).await)
}

/// Scoped ownership of the current key slot.
///
/// Not `Send`: the slot it clears belongs to the context that created it.
#[must_use = "the current key is cleared as soon as the guard is dropped"]
#[derive(Debug)]
pub struct CurrentKeyGuard {
    key: String,
    token: u64,
    _not_send: PhantomData<*const ()>,
}

impl CurrentKeyGuard {
    /// The key this guard installed
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for CurrentKeyGuard {
    fn drop(&mut self) {
        let released = with_slot(|slot| {
            let mut slot = slot.borrow_mut();
            let owned = slot
                .as_ref()
                .is_some_and(|active| active.token == self.token);
            if owned {
                *slot = None;
            }
            owned
        });
        tracing::trace!(key = %self.key, released, "Current profiling key guard dropped");
    }
}
