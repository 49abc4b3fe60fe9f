//! RPC profiling correlation registry.
//!
//! Correlates a profiling event recorded on the caller side of a remote
//! call with the events recorded on the callee side, even though the two
//! run in different processes and possibly on different threads.
//!
//! # Components
//!
//! ```text
//! RemoteProfilerManager
//!   ├─ id counter      seeded with worker << 48, so ids never collide across workers
//!   ├─ key registry    ProfilingId -> profiling label, behind one mutex
//!   └─ current key     per-thread / per-task label for code that is not handed it
//! ```
//!
//! # Usage
//!
//! 1. Build one [`RemoteProfilerManager`] per process from a [`ProfilerConfig`]
//!    carrying this worker's identity, or install it process-wide.
//! 2. On the caller, [`RemoteProfilerManager::begin_remote_call`] allocates
//!    an id and saves the label; embed [`PendingRemoteCall::context`] in the
//!    request.
//! 3. On the callee, [`ProfilingContext::enter`] makes the label current
//!    while the operation runs.
//! 4. When the response arrives, [`PendingRemoteCall::complete`] returns the
//!    label and erases the entry.
//!
//! ```rust
//! use rpc_profiler_core::{ProfilerConfig, RemoteProfilerManager};
//!
//! let manager = RemoteProfilerManager::new(ProfilerConfig::new(3u16));
//! let call = manager.begin_remote_call("rpc_async#aten::add").unwrap();
//! let request = call.context_with_label().unwrap();
//!
//! // callee side
//! {
//!     let _guard = request.enter().unwrap();
//!     assert_eq!(rpc_profiler_core::current_key(), "rpc_async#aten::add");
//! }
//!
//! assert_eq!(call.complete().unwrap(), "rpc_async#aten::add");
//! assert!(manager.is_empty());
//! ```

pub mod config;
pub mod correlation;
pub mod current;
pub mod error;
pub mod id;
pub mod manager;

pub use config::{DuplicateKeyPolicy, ProfilerConfig, ProfilerConfigBuilder};
pub use correlation::{PendingRemoteCall, ProfilingContext};
pub use current::{
    current_key, enter_current_key, has_current_key, set_current_key, try_current_key,
    try_set_current_key, unset_current_key, with_current_key, CurrentKeyGuard,
};
pub use error::{ProfilerError, Result};
pub use id::{LocalId, ProfilingId, WorkerId, LOCAL_ID_BITS, LOCAL_ID_MASK};
pub use manager::{RegistryStats, RemoteProfilerManager};
