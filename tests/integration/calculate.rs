use crate::*;

use std::sync::atomic::{AtomicUsize, Ordering};

use illum_core::engine::{CalcResults, CancelFlag, EngineError};
use illum_core::ModelState;
use reqwest::{Method, StatusCode};

#[tokio::test]
async fn test_calculate_returns_zone_statistics() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    let resp = daemon
        .authed(Method::POST, "/session/calculate", &id, &token)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await?;
    assert_eq!(body["success"], true);

    let zone = &body["zones"]["plane-1"];
    assert_eq!(zone["zone_id"], "plane-1");
    assert_eq!(zone["num_points"], json!([10, 10]));
    let min = zone["statistics"]["min"].as_f64().context("min")?;
    let max = zone["statistics"]["max"].as_f64().context("max")?;
    assert!(min > 0.0 && min <= max);

    assert_eq!(daemon.state.gate.status().available, 2);
    daemon.stop().await
}

/// Sleeps in small steps until `delay` passes or the caller gives up.
pub struct SlowEngine {
    delay: Duration,
    pub runs: AtomicUsize,
}

impl SlowEngine {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            runs: AtomicUsize::new(0),
        }
    }
}

impl SimulationEngine for SlowEngine {
    fn estimate_time_seconds(&self, _model: &ModelState) -> f64 {
        0.1
    }

    fn run(&self, _model: &ModelState, cancel: &CancelFlag) -> Result<CalcResults, EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let started = std::time::Instant::now();
        while started.elapsed() < self.delay {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(CalcResults::default())
    }
}

#[tokio::test]
async fn test_slow_calculation_times_out() -> Result<()> {
    let mut config = test_config();
    config.compute.execution_timeout_secs = 1;
    let engine = Arc::new(SlowEngine::new(Duration::from_secs(3)));
    let daemon = Daemon::start_with(config, engine.clone()).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    let resp = daemon
        .authed(Method::POST, "/session/calculate", &id, &token)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "execution_timeout");
    assert_eq!(engine.runs.load(Ordering::SeqCst), 1);

    // The slot comes back even though the engine thread may still be winding down.
    assert_eq!(daemon.state.gate.status().available, 2);
    daemon.stop().await
}

#[tokio::test]
async fn test_full_gate_queues_then_times_out() -> Result<()> {
    let mut config = test_config();
    config.compute.max_concurrent = 1;
    config.compute.queue_timeout_secs = 1;
    let engine = Arc::new(SlowEngine::new(Duration::from_secs(3)));
    let daemon = Daemon::start_with(config, engine.clone()).await?;
    let (id_a, token_a) = daemon.init_session(&small_model()).await?;
    let (id_b, token_b) = daemon.init_session(&small_model()).await?;

    let first = daemon
        .authed(Method::POST, "/session/calculate", &id_a, &token_a)
        .send();
    let first = tokio::spawn(first);

    // Give the first request time to take the only slot.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let status = daemon.state.gate.status();
    assert_eq!(status.available, 0);
    assert_eq!(status.in_flight.len(), 1);

    let second = daemon
        .authed(Method::POST, "/session/calculate", &id_b, &token_b)
        .send()
        .await?;
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = second.json().await?;
    assert_eq!(body["error"], "queue_timeout");

    let first = first.await??;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(engine.runs.load(Ordering::SeqCst), 1);

    daemon.stop().await
}
