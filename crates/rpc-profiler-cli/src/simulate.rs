//! In-process caller/callee correlation simulation
//!
//! Each simulated worker owns a registry and an inbox. Callers send
//! serialized [`ProfilingContext`] requests around a ring of workers; each
//! callee runs the operation with the shipped label current and echoes the
//! id back. A run is clean when every response correlates to its request
//! and every registry is empty afterwards.

use anyhow::{bail, Context, Result};
use rpc_profiler_core::{
    current_key, with_current_key, ProfilerConfig, ProfilingContext, RegistryStats,
    RemoteProfilerManager, WorkerId,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Inbox depth per simulated worker
const INBOX_CAPACITY: usize = 64;

/// Parameters of a simulation run
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Number of workers in the ring
    pub workers: u16,
    /// Calls each worker issues to its neighbour
    pub calls_per_worker: usize,
    /// Settings shared by every worker; worker ids count up from its `worker_id`
    pub base: ProfilerConfig,
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub workers: u16,
    pub calls_per_worker: usize,
    pub total_calls: usize,
    pub correlated: usize,
    pub mismatched: usize,
    pub unique_ids: usize,
    pub registries: Vec<RegistryStats>,
}

impl SimulationReport {
    /// Every call correlated and no registry kept an entry
    pub fn is_clean(&self) -> bool {
        self.mismatched == 0
            && self.correlated == self.total_calls
            && self.unique_ids == self.total_calls
            && self.registries.iter().all(|r| r.live_keys == 0)
    }
}

struct Request {
    payload: String,
    reply: oneshot::Sender<String>,
}

struct CallOutcome {
    id: u64,
    correlated: bool,
}

/// Run the simulation to completion
pub async fn run(options: SimulationOptions) -> Result<SimulationReport> {
    if options.workers == 0 {
        bail!("simulation needs at least one worker");
    }

    let registries = build_registries(&options)?;
    let mut inboxes = Vec::with_capacity(registries.len());
    let mut servers = Vec::with_capacity(registries.len());
    for registry in &registries {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        inboxes.push(tx);
        servers.push(tokio::spawn(serve(registry.worker_id(), rx)));
    }

    let mut callers = Vec::with_capacity(registries.len());
    for (index, registry) in registries.iter().enumerate() {
        let target = (index + 1) % registries.len();
        let peer = registries[target].worker_id();
        callers.push(tokio::spawn(call_peer(
            Arc::clone(registry),
            peer,
            inboxes[target].clone(),
            options.calls_per_worker,
        )));
    }
    drop(inboxes);

    let mut outcomes = Vec::new();
    for caller in callers {
        outcomes.extend(caller.await.context("caller task panicked")??);
    }
    for server in servers {
        server.await.context("server task panicked")??;
    }

    let unique_ids = outcomes.iter().map(|o| o.id).collect::<HashSet<_>>().len();
    let correlated = outcomes.iter().filter(|o| o.correlated).count();
    let report = SimulationReport {
        workers: options.workers,
        calls_per_worker: options.calls_per_worker,
        total_calls: usize::from(options.workers) * options.calls_per_worker,
        correlated,
        mismatched: outcomes.len() - correlated,
        unique_ids,
        registries: registries.iter().map(|r| r.stats()).collect(),
    };
    tracing::info!(
        total_calls = report.total_calls,
        correlated = report.correlated,
        mismatched = report.mismatched,
        "Simulation finished"
    );
    Ok(report)
}

fn build_registries(options: &SimulationOptions) -> Result<Vec<Arc<RemoteProfilerManager>>> {
    let first = u32::from(options.base.worker_id.get());
    (0..u32::from(options.workers))
        .map(|offset| {
            let worker_id = WorkerId::try_from(first + offset)
                .with_context(|| format!("worker {offset} exceeds the worker id range"))?;
            let config = ProfilerConfig {
                worker_id,
                ..options.base.clone()
            };
            Ok(Arc::new(RemoteProfilerManager::new(config)))
        })
        .collect()
}

async fn serve(worker_id: WorkerId, mut inbox: mpsc::Receiver<Request>) -> Result<()> {
    while let Some(request) = inbox.recv().await {
        let ctx: ProfilingContext =
            serde_json::from_str(&request.payload).context("malformed request payload")?;
        let label = ctx
            .label
            .clone()
            .context("request carried no profiling label")?;

        let recorded = with_current_key(label, async {
            tokio::task::yield_now().await;
            current_key()
        })
        .await?;
        tracing::trace!(worker_id = %worker_id, id = %ctx.id, label = %recorded, "Served remote call");

        let response = serde_json::to_string(&ProfilingContext::new(ctx.id).with_label(recorded))?;
        // A caller that went away has nothing left to attribute.
        let _ = request.reply.send(response);
    }
    Ok(())
}

async fn call_peer(
    registry: Arc<RemoteProfilerManager>,
    peer: WorkerId,
    inbox: mpsc::Sender<Request>,
    calls: usize,
) -> Result<Vec<CallOutcome>> {
    let mut outcomes = Vec::with_capacity(calls);
    for n in 0..calls {
        let label = format!(
            "rpc_async#op{n}(worker{} -> worker{peer})",
            registry.worker_id()
        );
        let call = registry.begin_remote_call(label)?;
        let payload = serde_json::to_string(&call.context_with_label()?)?;

        let (reply, response) = oneshot::channel();
        inbox
            .send(Request { payload, reply })
            .await
            .context("peer inbox closed")?;
        let response: ProfilingContext =
            serde_json::from_str(&response.await.context("peer dropped the call")?)?;

        let id = call.id();
        let saved = call.complete()?;
        let correlated = response.id == id && response.label.as_deref() == Some(saved.as_str());
        if !correlated {
            tracing::warn!(id = %id, expected = %saved, got = ?response.label, "Response did not correlate");
        }
        outcomes.push(CallOutcome {
            id: id.as_u64(),
            correlated,
        });
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(workers: u16, calls: usize) -> SimulationOptions {
        SimulationOptions {
            workers,
            calls_per_worker: calls,
            base: ProfilerConfig::new(0u16),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_simulation_is_clean() {
        let report = run(options(4, 25)).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.total_calls, 100);
        assert_eq!(report.registries.len(), 4);
        assert!(report.registries.iter().all(|r| r.erased == 25));
    }

    #[tokio::test]
    async fn test_single_worker_calls_itself() {
        let report = run(options(1, 10)).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.registries[0].ids_allocated, 10);
    }

    #[tokio::test]
    async fn test_rejects_zero_workers() {
        assert!(run(options(0, 10)).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_worker_range_overflow() {
        let opts = SimulationOptions {
            workers: 2,
            calls_per_worker: 1,
            base: ProfilerConfig::new(u16::MAX),
        };
        let err = run(opts).await.unwrap_err();
        assert!(err.to_string().contains("exceeds the worker id range"));
    }
}
