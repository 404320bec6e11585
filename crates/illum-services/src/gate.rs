//! Concurrency gate: bounds simultaneous calculations across all sessions.
//!
//! A call to [`ConcurrencyGate::run`] goes through four stages:
//!
//! 1. admission check against the session's snapshot (rejections never
//!    take a slot),
//! 2. wait for a slot, then for a worker to pick the run up, both bounded
//!    by the queue timeout,
//! 3. run the engine on the dedicated worker pool,
//! 4. wait for the result, bounded by the execution timeout measured from
//!    the moment the engine starts.
//!
//! The slot count and the worker pool size are the same number, so holding
//! a slot normally means a worker is available. On execution timeout the
//! cancel flag is raised and the slot is released immediately; a worker
//! running an engine that ignores the flag stays busy until the call
//! returns on its own. The next run then waits for that worker as part of
//! its queue time, never its execution time.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;

use illum_core::budget::{percent_of, CostEstimate};
use illum_core::config::ComputeSettings;
use illum_core::engine::{CalcResults, CancelFlag, EngineError};
use illum_core::{ModelState, ServiceError, SimulationEngine};

use crate::admission::AdmissionController;
use crate::session::short_id;

/// Predictions below this are treated as this for calibration.
const MIN_ESTIMATE_SECS: f64 = 0.1;
const CALIBRATION_HIGH: f64 = 2.0;
const CALIBRATION_LOW: f64 = 0.5;

/// One in-flight calculation, as reported by [`ConcurrencyGate::status`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub id: u64,
    /// Never serialized: status output is public.
    #[serde(skip_serializing)]
    pub session_id: String,
    /// Unix millis.
    pub started_at: u64,
    pub elapsed_ms: u64,
    pub estimated_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateStatus {
    pub max_concurrent: usize,
    pub available: usize,
    pub waiting: usize,
    pub in_flight: Vec<ExecutionRecord>,
}

/// A finished calculation and what it was admitted on.
#[derive(Debug, Clone)]
pub struct CalcOutcome {
    pub results: CalcResults,
    pub estimate: CostEstimate,
    pub elapsed: Duration,
}

struct InFlight {
    session_id: String,
    started_at_ms: u64,
    started: Instant,
    estimated_seconds: f64,
}

// ── Worker pool ───────────────────────────────────────────────────────────────

/// Blocking threads reserved for engine runs, separate from the runtime
/// that serves requests.
struct WorkerPool {
    runtime: Option<Runtime>,
}

impl WorkerPool {
    fn new(workers: usize) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name("illum-calc")
            .enable_time()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    fn spawn<F, R>(&self, f: F) -> Option<JoinHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.runtime.as_ref().map(|rt| rt.spawn_blocking(f))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // May run inside an async context; a plain drop would block there.
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}

// ── Gate ──────────────────────────────────────────────────────────────────────

struct GateInner {
    engine: Arc<dyn SimulationEngine>,
    admission: AdmissionController,
    slots: usize,
    semaphore: Arc<Semaphore>,
    pool: WorkerPool,
    queue_timeout: Duration,
    execution_timeout: Duration,
    waiting: AtomicUsize,
    in_flight: DashMap<u64, InFlight>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

impl ConcurrencyGate {
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        admission: AdmissionController,
        settings: &ComputeSettings,
    ) -> std::io::Result<Self> {
        Self::with_limits(
            engine,
            admission,
            settings.slots(),
            settings.queue_timeout(),
            settings.execution_timeout(),
        )
    }

    pub fn with_limits(
        engine: Arc<dyn SimulationEngine>,
        admission: AdmissionController,
        slots: usize,
        queue_timeout: Duration,
        execution_timeout: Duration,
    ) -> std::io::Result<Self> {
        let slots = slots.max(1);
        let pool = WorkerPool::new(slots)?;
        tracing::info!(
            max_concurrent = slots,
            queue_timeout_ms = queue_timeout.as_millis() as u64,
            execution_timeout_ms = execution_timeout.as_millis() as u64,
            "concurrency gate ready"
        );
        Ok(Self {
            inner: Arc::new(GateInner {
                engine,
                admission,
                slots,
                semaphore: Arc::new(Semaphore::new(slots)),
                pool,
                queue_timeout,
                execution_timeout,
                waiting: AtomicUsize::new(0),
                in_flight: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.inner.admission
    }

    /// Admit, queue, and run a calculation over `model`.
    ///
    /// Dropping the returned future (e.g. the client went away) releases the
    /// slot and raises the cancel flag.
    pub async fn run(
        &self,
        session_id: &str,
        model: Arc<ModelState>,
    ) -> Result<CalcOutcome, ServiceError> {
        let inner = &self.inner;
        let estimate = inner.admission.admit(&model, 0)?;

        let queued_at = Instant::now();
        let permit = {
            let _waiting = WaitingGuard::enter(&inner.waiting);
            let acquire = inner.semaphore.clone().acquire_owned();
            match tokio::time::timeout(inner.queue_timeout, acquire).await {
                Ok(Ok(permit)) => permit,
                // Closed semaphore: the gate is going away.
                Ok(Err(_)) | Err(_) => {
                    tracing::warn!(
                        session = short_id(session_id),
                        waited_secs = inner.queue_timeout.as_secs(),
                        "no calculation slot available"
                    );
                    return Err(ServiceError::QueueTimeout { slots: inner.slots });
                }
            }
        };

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let _record = RecordGuard::insert(
            &inner.in_flight,
            id,
            InFlight {
                session_id: session_id.to_string(),
                started_at_ms: now_ms(),
                started: Instant::now(),
                estimated_seconds: estimate.calc_time_seconds,
            },
        );

        tracing::info!(
            session = short_id(session_id),
            grid_points = estimate.total_grid_points,
            lamps = estimate.lamp_count,
            reflectance_passes = estimate.reflectance_passes,
            est_secs = estimate.calc_time_seconds,
            budget_percent = percent_of(
                estimate.budget_units as f64,
                inner.admission.max_budget_units() as f64
            ),
            "calculation starting"
        );

        let cancel = CancelFlag::new();
        let _cancel_on_exit = CancelOnDrop(cancel.clone());
        let engine = inner.engine.clone();
        let snapshot = model.clone();
        let (started_tx, started_rx) = oneshot::channel();
        let spawned = inner.pool.spawn(move || {
            let _ = started_tx.send(Instant::now());
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            engine.run(&snapshot, &cancel)
        });
        let Some(handle) = spawned else {
            return Err(ServiceError::EngineFailure("worker pool shut down".into()));
        };

        // A worker may still be held by an engine that overran its deadline.
        let remaining = inner.queue_timeout.saturating_sub(queued_at.elapsed());
        let started = match tokio::time::timeout(remaining, started_rx).await {
            Ok(Ok(at)) => at,
            Ok(Err(_)) => {
                return Err(ServiceError::EngineFailure("worker pool shut down".into()));
            }
            Err(_) => {
                tracing::warn!(
                    session = short_id(session_id),
                    waited_secs = inner.queue_timeout.as_secs(),
                    "no calculation worker became free"
                );
                return Err(ServiceError::QueueTimeout { slots: inner.slots });
            }
        };

        let deadline = inner.execution_timeout.saturating_sub(started.elapsed());
        let outcome = tokio::time::timeout(deadline, handle).await;
        let elapsed = started.elapsed();
        drop(permit);

        match outcome {
            Err(_) => {
                tracing::warn!(
                    session = short_id(session_id),
                    timeout_secs = inner.execution_timeout.as_secs(),
                    "calculation timed out, slot released"
                );
                Err(ServiceError::ExecutionTimeout {
                    secs: inner.execution_timeout.as_secs(),
                })
            }
            Ok(Err(join_err)) => {
                tracing::error!(session = short_id(session_id), error = %join_err, "engine panicked");
                Err(ServiceError::EngineFailure(join_err.to_string()))
            }
            Ok(Ok(Err(err))) => {
                tracing::error!(session = short_id(session_id), error = %err, "calculation failed");
                Err(ServiceError::EngineFailure(err.to_string()))
            }
            Ok(Ok(Ok(results))) => {
                log_calibration(session_id, &estimate, elapsed);
                Ok(CalcOutcome {
                    results,
                    estimate,
                    elapsed,
                })
            }
        }
    }

    pub fn status(&self) -> GateStatus {
        let inner = &self.inner;
        let mut in_flight: Vec<ExecutionRecord> = inner
            .in_flight
            .iter()
            .map(|entry| ExecutionRecord {
                id: *entry.key(),
                session_id: entry.session_id.clone(),
                started_at: entry.started_at_ms,
                elapsed_ms: entry.started.elapsed().as_millis() as u64,
                estimated_seconds: entry.estimated_seconds,
            })
            .collect();
        in_flight.sort_by_key(|r| r.id);
        GateStatus {
            max_concurrent: inner.slots,
            available: inner.semaphore.available_permits(),
            waiting: inner.waiting.load(Ordering::SeqCst),
            in_flight,
        }
    }
}

fn log_calibration(session_id: &str, estimate: &CostEstimate, elapsed: Duration) {
    let actual = elapsed.as_secs_f64();
    let ratio = actual / estimate.calc_time_seconds.max(MIN_ESTIMATE_SECS);
    tracing::info!(
        session = short_id(session_id),
        actual_secs = actual,
        est_secs = estimate.calc_time_seconds,
        ratio,
        "calculation complete"
    );
    if !(CALIBRATION_LOW..=CALIBRATION_HIGH).contains(&ratio) {
        tracing::warn!(
            ratio,
            grid_points = estimate.total_grid_points,
            lamps = estimate.lamp_count,
            "time estimate off by more than 2x, engine calibration may need adjusting"
        );
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct RecordGuard<'a> {
    map: &'a DashMap<u64, InFlight>,
    id: u64,
}

impl<'a> RecordGuard<'a> {
    fn insert(map: &'a DashMap<u64, InFlight>, id: u64, record: InFlight) -> Self {
        map.insert(id, record);
        Self { map, id }
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.id);
    }
}

struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
