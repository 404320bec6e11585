//! Illuminate integration test harness.
//!
//! Each test starts its own in-process API server on an ephemeral port
//! and talks to it over real HTTP:
//!
//!   cargo test --test integration
//!
//! Servers are shut down through the same broadcast channel the daemon
//! uses, so tests never share state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use illum_api::ApiState;
use illum_core::SimulationEngine;
use illum_core::config::IllumConfig;
use illum_services::ReferenceEngine;

mod budget;
mod calculate;
mod sessions;
mod status;

// ── Harness ───────────────────────────────────────────────────────────────────

/// A running server plus a client pointed at it.
pub struct Daemon {
    pub base: String,
    pub client: reqwest::Client,
    pub state: ApiState,
    handle: tokio::task::JoinHandle<Result<()>>,
}

impl Daemon {
    /// Start with the reference engine.
    pub async fn start(config: IllumConfig) -> Result<Self> {
        let engine = Arc::new(ReferenceEngine::new(config.budget.default_reflectance_passes));
        Self::start_with(config, engine).await
    }

    pub async fn start_with(config: IllumConfig, engine: Arc<dyn SimulationEngine>) -> Result<Self> {
        let state = ApiState::from_config(&config, engine).context("worker pool")?;
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let handle = tokio::spawn(illum_api::serve_on(listener, state.clone()));
        Ok(Self {
            base: format!("http://127.0.0.1:{port}/api/v1"),
            client: reqwest::Client::new(),
            state,
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Create a session, returning `(id, token)`.
    pub async fn create_session(&self) -> Result<(String, String)> {
        let resp: Value = self
            .client
            .post(self.url("/session/create"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let id = resp["session_id"].as_str().context("session_id")?.to_string();
        let token = resp["token"].as_str().context("token")?.to_string();
        Ok((id, token))
    }

    /// Request builder carrying the session headers.
    pub fn authed(
        &self,
        method: reqwest::Method,
        path: &str,
        id: &str,
        token: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("X-Session-ID", id)
            .bearer_auth(token)
    }

    /// Create a session and install `model` in it.
    pub async fn init_session(&self, model: &Value) -> Result<(String, String)> {
        let (id, token) = self.create_session().await?;
        let resp = self
            .authed(reqwest::Method::POST, "/session/init", &id, &token)
            .json(model)
            .send()
            .await?;
        anyhow::ensure!(resp.status().is_success(), "init failed: {}", resp.text().await?);
        Ok((id, token))
    }

    pub async fn stop(self) -> Result<()> {
        let _ = self.state.shutdown_tx.send(());
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .context("server did not stop")???;
        Ok(())
    }
}

/// Defaults with a small execution timeout and tokens required.
pub fn test_config() -> IllumConfig {
    let mut config = IllumConfig::default();
    config.compute.max_concurrent = 2;
    config.compute.queue_timeout_secs = 2;
    config.compute.execution_timeout_secs = 10;
    config
}

/// A 4 x 3 x 2.7 m room with one lamp and one 10 x 10 working plane.
pub fn small_model() -> Value {
    json!({
        "room": { "x": 4.0, "y": 3.0, "z": 2.7 },
        "lamps": [
            {
                "id": "lamp-1",
                "name": "Ceiling",
                "position": [2.0, 1.5, 2.6],
                "photometry": { "peak_intensity": 100.0 }
            }
        ],
        "zones": [ plane_zone("plane-1", 10, 10) ]
    })
}

pub fn plane_zone(id: &str, nx: u32, ny: u32) -> Value {
    json!({
        "id": id,
        "name": id,
        "bounds": { "kind": "plane", "x1": 0.0, "x2": 4.0, "y1": 0.0, "y2": 3.0, "height": 1.8 },
        "grid": { "num_x": nx, "num_y": ny }
    })
}
