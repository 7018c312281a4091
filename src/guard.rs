//! Session guard for the shared Telegram connection.
//!
//! The guard owns the only connection handle in the process. Every request
//! goes through [`SessionGuard::ensure_ready`], which probes the cached handle
//! and, when it is missing or dead, runs a single connect-and-authenticate
//! sequence while every other caller waits on the same attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Reasons a caller could not obtain a ready connection.
///
/// None of these are fatal: the next call to `ensure_ready` retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Telegram client startup timed out after {}s", .0.as_secs())]
    ConnectTimeout(Duration),

    #[error("Telegram authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Telegram transport error: {0}")]
    Transport(String),
}

/// Operations the guard needs from the underlying client library.
#[async_trait]
pub trait SessionBackend: Send + Sync + 'static {
    /// Cheap to clone; clones refer to the same live connection.
    type Handle: Clone + Send + Sync + 'static;

    async fn connect(&self) -> Result<Self::Handle, SessionError>;

    /// Transport-level check that must not touch the network.
    fn is_alive(&self, _handle: &Self::Handle) -> bool {
        true
    }

    async fn is_authorized(&self, handle: &Self::Handle) -> Result<bool, SessionError>;

    async fn authenticate(&self, handle: &Self::Handle) -> Result<(), SessionError>;

    async fn disconnect(&self, handle: Self::Handle);
}

#[derive(Debug, Clone)]
pub enum ReadinessState<H> {
    Uninitialized,
    Initializing,
    Ready(H),
    Failed(SessionError),
}

impl<H> ReadinessState<H> {
    pub fn phase(&self) -> ReadinessPhase {
        match self {
            ReadinessState::Uninitialized => ReadinessPhase::Uninitialized,
            ReadinessState::Initializing => ReadinessPhase::Initializing,
            ReadinessState::Ready(_) => ReadinessPhase::Ready,
            ReadinessState::Failed(_) => ReadinessPhase::Failed,
        }
    }
}

/// The state tag without its payload, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessPhase {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl ReadinessPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessPhase::Uninitialized => "uninitialized",
            ReadinessPhase::Initializing => "initializing",
            ReadinessPhase::Ready => "ready",
            ReadinessPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ReadinessPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GuardConfig {
    /// Upper bound on how long one caller waits for a ready handle.
    pub startup_timeout: Duration,
    /// Upper bound on the liveness probe of a cached handle.
    pub probe_timeout: Duration,
    /// Upper bound on each of connect and authenticate inside one attempt,
    /// so a stalled attempt releases the transition lock.
    pub connect_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

struct Inner<B: SessionBackend> {
    backend: B,
    config: GuardConfig,
    // Serializes check-and-repair. Never held while a request uses the handle.
    transition: Mutex<()>,
    // Never held across an await.
    state: RwLock<ReadinessState<B::Handle>>,
    // Number of completed connect attempts, bumped under `transition`.
    attempts: AtomicU64,
}

/// Coordinates the single process-wide connection.
pub struct SessionGuard<B: SessionBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: SessionBackend> Clone for SessionGuard<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SessionBackend> SessionGuard<B> {
    pub fn new(backend: B, config: GuardConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                transition: Mutex::new(()),
                state: RwLock::new(ReadinessState::Uninitialized),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn config(&self) -> GuardConfig {
        self.inner.config
    }

    /// Current phase. Does not wait for an in-flight attempt.
    pub fn phase(&self) -> ReadinessPhase {
        match self.inner.state.read() {
            Ok(state) => state.phase(),
            Err(poisoned) => poisoned.into_inner().phase(),
        }
    }

    /// Returns a connected, authorized handle, establishing or repairing the
    /// connection first when needed.
    ///
    /// The check-and-repair step runs on its own task, so a caller that gives
    /// up after `startup_timeout` does not cancel the attempt other callers
    /// are waiting on.
    pub async fn ensure_ready(&self) -> Result<B::Handle, SessionError> {
        let inner = Arc::clone(&self.inner);
        let observed = inner.attempts.load(Ordering::Acquire);
        let attempt = tokio::spawn(async move { inner.check_and_repair(observed).await });

        let limit = self.inner.config.startup_timeout;
        match timeout(limit, attempt).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => {
                log::error!("ensure_ready: readiness task failed: {}", join_error);
                Err(SessionError::Transport(format!(
                    "readiness check aborted: {join_error}"
                )))
            }
            Err(_) => {
                log::warn!(
                    "ensure_ready: gave up after {:?}, attempt continues in background",
                    limit
                );
                Err(SessionError::ConnectTimeout(limit))
            }
        }
    }

    /// Eager startup hook: starts connecting in the background.
    pub fn warm_up(&self) -> JoinHandle<()> {
        let guard = self.clone();
        tokio::spawn(async move {
            log::info!("warm_up: establishing Telegram connection at startup");
            match guard.ensure_ready().await {
                Ok(_) => log::info!("warm_up: Telegram client ready"),
                Err(e) => log::error!(
                    "warm_up: Telegram client not ready, will retry on next request: {}",
                    e
                ),
            }
        })
    }

    /// Disconnects the current handle and forgets it.
    pub async fn shutdown(&self) {
        let _transition = self.inner.transition.lock().await;
        let previous = self.inner.replace_state(ReadinessState::Uninitialized);
        match previous {
            ReadinessState::Ready(handle) => {
                log::info!("shutdown: disconnecting Telegram client");
                self.inner.backend.disconnect(handle).await;
            }
            _ => log::info!("shutdown: no active Telegram client to disconnect"),
        }
    }
}

impl<B: SessionBackend> Inner<B> {
    fn snapshot(&self) -> ReadinessState<B::Handle> {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace_state(&self, next: ReadinessState<B::Handle>) -> ReadinessState<B::Handle> {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *state, next)
    }

    async fn check_and_repair(&self, observed: u64) -> Result<B::Handle, SessionError> {
        let _transition = self.transition.lock().await;

        // An attempt that finished while we queued for the lock answers for us.
        let settled_while_waiting = self.attempts.load(Ordering::Acquire) != observed;

        let stale = match self.snapshot() {
            ReadinessState::Ready(handle) => {
                if settled_while_waiting || self.probe(&handle).await {
                    return Ok(handle);
                }
                log::warn!("ensure_ready: liveness probe failed, discarding connection");
                Some(handle)
            }
            ReadinessState::Failed(error) if settled_while_waiting => return Err(error),
            _ => None,
        };

        self.replace_state(ReadinessState::Initializing);
        if let Some(handle) = stale {
            self.backend.disconnect(handle).await;
        }

        let outcome = self.establish().await;
        match &outcome {
            Ok(handle) => {
                self.replace_state(ReadinessState::Ready(handle.clone()));
            }
            Err(error) => {
                self.replace_state(ReadinessState::Failed(error.clone()));
            }
        }
        self.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn establish(&self) -> Result<B::Handle, SessionError> {
        let limit = self.config.connect_timeout;

        log::info!("ensure_ready: connecting to Telegram");
        let connected = match timeout(limit, self.backend.connect()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::Transport(format!(
                "connect timed out after {:?}",
                limit
            ))),
        };
        let handle = match connected {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("ensure_ready: connect failed: {}", e);
                return Err(e);
            }
        };

        let authenticated = match timeout(limit, self.backend.authenticate(&handle)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::Transport(format!(
                "authentication timed out after {:?}",
                limit
            ))),
        };
        if let Err(e) = authenticated {
            log::error!("ensure_ready: authentication failed: {}", e);
            self.backend.disconnect(handle).await;
            return Err(e);
        }

        log::info!("ensure_ready: Telegram connection established");
        Ok(handle)
    }

    async fn probe(&self, handle: &B::Handle) -> bool {
        if !self.backend.is_alive(handle) {
            log::warn!("probe: transport is closed");
            return false;
        }

        match timeout(self.config.probe_timeout, self.backend.is_authorized(handle)).await {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) => {
                log::warn!("probe: session is no longer authorized");
                false
            }
            Ok(Err(e)) => {
                log::warn!("probe: authorization check failed: {}", e);
                false
            }
            Err(_) => {
                log::warn!(
                    "probe: authorization check timed out after {:?}",
                    self.config.probe_timeout
                );
                false
            }
        }
    }
}
