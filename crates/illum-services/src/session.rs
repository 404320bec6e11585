//! Session store: per-client model state with idle eviction.
//!
//! One coarse mutex guards the id → session map. It is held only for map
//! operations and timestamp comparisons, never across a calculation or an
//! engine call. Each session guards its own model separately: readers take
//! an `Arc` snapshot, writers build a private copy and publish it with a
//! single pointer swap, so nobody observes a half-applied edit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use illum_core::config::SessionSettings;
use illum_core::{ModelState, ServiceError};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Log-safe prefix of a session id.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session {
    id: String,
    /// BLAKE3 of the issued credential. `None` for auto-created sessions.
    token_hash: Option<blake3::Hash>,
    created_at: Instant,
    created_at_ms: u64,
    last_access: Mutex<Instant>,
    model: RwLock<Option<Arc<ModelState>>>,
    /// Serializes read-modify-write cycles on the model.
    writer: Mutex<()>,
}

impl Session {
    fn new(id: String, token_hash: Option<blake3::Hash>) -> Self {
        let now = Instant::now();
        Self {
            id,
            token_hash,
            created_at: now,
            created_at_ms: now_ms(),
            last_access: Mutex::new(now),
            model: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn last_accessed(&self) -> Instant {
        *lock(&self.last_access)
    }

    fn touch(&self) {
        *lock(&self.last_access) = Instant::now();
    }

    pub fn has_credential(&self) -> bool {
        self.token_hash.is_some()
    }

    /// Compare a presented credential against the stored hash.
    pub fn verify_token(&self, token: &str) -> bool {
        match &self.token_hash {
            // blake3::Hash equality is constant-time.
            Some(stored) => *stored == blake3::hash(token.as_bytes()),
            None => false,
        }
    }

    /// Current model snapshot, if the session has been initialized.
    pub fn model(&self) -> Option<Arc<ModelState>> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn require_model(&self) -> Result<Arc<ModelState>, ServiceError> {
        self.model().ok_or(ServiceError::SessionNotInitialized)
    }

    /// Replace the whole model.
    pub fn install(&self, model: ModelState) {
        let _w = lock(&self.writer);
        self.publish(model);
    }

    /// Apply `f` to a private copy of the model and publish it only if `f`
    /// succeeds. On error the visible model is untouched.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&mut ModelState) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let _w = lock(&self.writer);
        let current = self.require_model()?;
        let mut draft = ModelState::clone(&current);
        let out = f(&mut draft)?;
        self.publish(draft);
        Ok(out)
    }

    fn publish(&self, model: ModelState) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(model));
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &short_id(&self.id))
            .field("has_credential", &self.has_credential())
            .field("initialized", &self.model().is_some())
            .finish()
    }
}

/// A freshly created session and the credential issued for it. The raw
/// token exists only here; the store keeps its hash.
pub struct NewSession {
    pub session: Arc<Session>,
    pub token: String,
}

/// Row in `SessionStore::list`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: u64,
    pub idle_secs: u64,
    pub initialized: bool,
    pub lamp_count: usize,
    pub zone_count: usize,
}

// ── Store ─────────────────────────────────────────────────────────────────────

struct Sweeper {
    handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
    settings: SessionSettings,
    sweeper: Arc<Mutex<Option<Sweeper>>>,
}

impl SessionStore {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            settings,
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Create a session with a fresh credential. Generates an id when none
    /// is supplied; a supplied id that is already live is refused.
    pub fn create(&self, id: Option<String>) -> Result<NewSession, ServiceError> {
        let token = generate_token();
        let mut sessions = lock(&self.sessions);
        let session = self.insert_locked(&mut sessions, id, Some(blake3::hash(token.as_bytes())))?;
        Ok(NewSession { session, token })
    }

    /// The live session under `id`, or a new one with a freshly issued
    /// credential. The token is `Some` only when this call created it.
    pub fn get_or_create(&self, id: &str) -> Result<(Arc<Session>, Option<String>), ServiceError> {
        let mut sessions = lock(&self.sessions);
        if let Some(session) = sessions.get(id) {
            session.touch();
            return Ok((session.clone(), None));
        }
        let token = generate_token();
        let session = self.insert_locked(
            &mut sessions,
            Some(id.to_string()),
            Some(blake3::hash(token.as_bytes())),
        )?;
        Ok((session, Some(token)))
    }

    /// Caller holds the map lock for the whole lookup-and-insert.
    fn insert_locked(
        &self,
        sessions: &mut HashMap<String, Arc<Session>>,
        id: Option<String>,
        token_hash: Option<blake3::Hash>,
    ) -> Result<Arc<Session>, ServiceError> {
        let id = id.unwrap_or_else(generate_id);
        if sessions.contains_key(&id) {
            return Err(ServiceError::SessionExists);
        }
        if sessions.len() >= self.settings.max_sessions {
            tracing::warn!(
                live = sessions.len(),
                max = self.settings.max_sessions,
                "session creation rejected: at capacity"
            );
            return Err(ServiceError::CapacityExceeded {
                max: self.settings.max_sessions,
            });
        }

        let session = Arc::new(Session::new(id.clone(), token_hash));
        sessions.insert(id, session.clone());
        tracing::info!(session = short_id(session.id()), "session created");
        Ok(session)
    }

    /// Look up a session and reset its idle clock. With `auto_create`, an
    /// unknown id is created on the spot without a credential.
    pub fn get(&self, id: &str, auto_create: bool) -> Result<Option<Arc<Session>>, ServiceError> {
        let mut sessions = lock(&self.sessions);
        if let Some(session) = sessions.get(id) {
            session.touch();
            return Ok(Some(session.clone()));
        }
        if !auto_create {
            return Ok(None);
        }
        self.insert_locked(&mut sessions, Some(id.to_string()), None)
            .map(Some)
    }

    /// `get` for operations that need an existing session.
    pub fn require(&self, id: &str) -> Result<Arc<Session>, ServiceError> {
        self.get(id, false)?.ok_or(ServiceError::SessionNotFound)
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = lock(&self.sessions).remove(id).is_some();
        if removed {
            tracing::info!(session = short_id(id), "session deleted");
        }
        removed
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> = lock(&self.sessions).values().cloned().collect();
        sessions
            .iter()
            .map(|s| {
                let model = s.model();
                SessionSummary {
                    session_id: s.id().to_string(),
                    created_at: s.created_at_ms(),
                    idle_secs: s.last_accessed().elapsed().as_secs(),
                    initialized: model.is_some(),
                    lamp_count: model.as_ref().map_or(0, |m| m.lamps.len()),
                    zone_count: model.as_ref().map_or(0, |m| m.zones.len()),
                }
            })
            .collect()
    }

    /// Evict every session idle for longer than the configured window.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// `sweep` against an explicit clock reading.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let idle = self.settings.idle_timeout();
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|id, s| {
            let expired = now.saturating_duration_since(s.last_accessed()) > idle;
            if expired {
                tracing::info!(session = short_id(id), "evicted idle session");
            }
            !expired
        });
        before - sessions.len()
    }

    /// Start the periodic idle sweep. Calling it again while running is a
    /// no-op. Must be called from within a tokio runtime.
    pub fn start_sweeper(&self) {
        let mut slot = lock(&self.sweeper);
        if slot.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let store = self.clone();
        let period = self.settings.sweep_interval();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = store.sweep();
                        if evicted > 0 {
                            tracing::info!(evicted, live = store.len(), "idle sweep");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!("session sweeper stopped");
        });

        *slot = Some(Sweeper {
            handle,
            shutdown_tx,
        });
        tracing::info!(
            interval_secs = period.as_secs(),
            idle_timeout_secs = self.settings.idle_timeout_secs,
            "session sweeper started"
        );
    }

    /// Stop the sweep and wait for it to exit. No-op if not running.
    pub async fn stop_sweeper(&self) {
        let sweeper = lock(&self.sweeper).take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.shutdown_tx.send(());
            let _ = sweeper.handle.await;
        }
    }

    pub fn sweeper_running(&self) -> bool {
        lock(&self.sweeper).is_some()
    }
}

fn generate_id() -> String {
    let mut b = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut b);
    // RFC 4122 version 4 layout.
    b[6] = (b[6] & 0x0f) | 0x40;
    b[8] = (b[8] & 0x3f) | 0x80;
    let h = hex::encode(b);
    format!("{}-{}-{}-{}-{}", &h[..8], &h[8..12], &h[12..16], &h[16..20], &h[20..])
}

fn generate_token() -> String {
    let mut b = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut b);
    hex::encode(b)
}
