//! Constant-arrival-rate scheduler.
//!
//! Every plan entry gets `pool_size` workers. Worker `i` starts at `i / rate`
//! and fires every `pool_size / rate` seconds, so the pool as a whole starts
//! `rate` invocations per second while never running more than `pool_size`
//! at once.

use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info};

use crate::executor::ScenarioExecutor;
use crate::metrics::MetricsSink;
use crate::plan::{ExecutionPlan, PlanEntry};
use crate::scenario::ScenarioKind;

/// What one worker did before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub kind: ScenarioKind,
    pub task_id: usize,
    pub invocations: u64,

    /// Scheduled slots skipped because the previous invocation overran
    pub dropped: u64,

    /// The worker stopped early on a configuration error
    pub config_error: bool,
}

/// Number of whole slots of `interval` that lie in `[next_fire, now)`
/// and before `deadline`.
fn missed_slots(next_fire: Instant, now: Instant, deadline: Instant, interval: Duration) -> u64 {
    if now <= next_fire || interval.is_zero() {
        return 0;
    }
    let behind = now.min(deadline).saturating_duration_since(next_fire);
    (behind.as_secs_f64() / interval.as_secs_f64()).floor() as u64
}

/// Runs one worker of `entry` until its duration elapses.
pub async fn run_scenario_worker(
    executor: ScenarioExecutor,
    entry: PlanEntry,
    task_id: usize,
    start_time: Instant,
) -> WorkerSummary {
    let kind = entry.kind;
    let mut summary = WorkerSummary {
        kind,
        task_id,
        invocations: 0,
        dropped: 0,
        config_error: false,
    };

    let (Some(interval), Some(first_fire), Some(deadline)) = (
        entry.worker_interval(),
        entry
            .worker_offset(task_id)
            .and_then(|offset| start_time.checked_add(offset)),
        start_time.checked_add(entry.duration),
    ) else {
        error!(
            scenario = kind.name(),
            task_id,
            rate = entry.rate,
            pool_size = entry.pool_size,
            "Scenario cannot be paced, stopping worker"
        );
        executor.sink().record_config_error(kind);
        summary.config_error = true;
        return summary;
    };

    debug!(
        scenario = kind.name(),
        task_id,
        interval_ms = interval.as_millis() as u64,
        "Scenario worker starting"
    );

    // Absolute deadlines: a late wake-up shortens the next sleep instead of
    // shifting every later invocation.
    let mut next_fire = first_fire;

    loop {
        time::sleep_until(next_fire).await;

        if Instant::now() >= deadline {
            debug!(
                scenario = kind.name(),
                task_id,
                invocations = summary.invocations,
                "Scenario worker stopping after duration limit"
            );
            break;
        }

        // A slot past the representable range is past the deadline too.
        next_fire = next_fire.checked_add(interval).unwrap_or(deadline);

        match executor.execute(kind).await {
            Ok(_) => summary.invocations += 1,
            Err(e) => {
                error!(
                    scenario = kind.name(),
                    task_id,
                    error = %e,
                    "Configuration error, stopping worker"
                );
                summary.config_error = true;
                break;
            }
        }

        // An overrunning invocation catches up with one immediate fire;
        // the slots it fully covered are dropped, not queued.
        let missed = missed_slots(next_fire, Instant::now(), deadline, interval);
        if missed > 0 {
            next_fire = u32::try_from(missed)
                .ok()
                .and_then(|m| interval.checked_mul(m))
                .and_then(|skip| next_fire.checked_add(skip))
                .unwrap_or(deadline);
            summary.dropped += missed;
            executor.sink().record_dropped(kind, missed);
        }
    }

    summary
}

/// Spawns the workers of every plan entry and waits for all of them.
pub async fn run_plan(plan: &ExecutionPlan, executor: ScenarioExecutor) -> Vec<WorkerSummary> {
    let start_time = Instant::now();
    let mut handles: Vec<JoinHandle<WorkerSummary>> = Vec::new();

    for entry in &plan.entries {
        info!(
            scenario = entry.kind.name(),
            rate = entry.rate,
            pool_size = entry.pool_size,
            duration_secs = entry.duration.as_secs_f64(),
            "Starting scenario"
        );

        for task_id in 0..entry.pool_size {
            let executor = executor.clone();
            let entry = entry.clone();
            handles.push(tokio::spawn(async move {
                run_scenario_worker(executor, entry, task_id, start_time).await
            }));
        }
    }

    let summaries = join_workers(handles, executor.sink()).await;

    info!(
        workers = summaries.len(),
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "All scenario workers finished"
    );
    summaries
}

/// Waits for every worker. A worker that panicked has no summary; it is
/// counted in `sink` so the run cannot be judged healthy.
async fn join_workers(
    handles: Vec<JoinHandle<WorkerSummary>>,
    sink: &MetricsSink,
) -> Vec<WorkerSummary> {
    let mut summaries = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                error!(error = %e, "Worker task failed");
                sink.record_worker_failure();
            }
        }
    }
    summaries
}
