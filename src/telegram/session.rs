use super::login::interactive_login;
use super::run_telegram_request;
use super::utils::{build_client, decode_session, encode_session, read_session_file, write_session_file};
use crate::config::Credentials;
use crate::guard::{SessionBackend, SessionError};
use async_trait::async_trait;
use grammers_client::Client;
use grammers_mtsender::SenderPoolHandle;
#[allow(deprecated)]
use grammers_session::storages::TlSession;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

const CONNECTIVITY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the persisted Telegram session comes from.
#[derive(Debug, Clone)]
pub enum SessionSource {
    /// Base64 string produced by the `login` command.
    Inline(String),
    /// Raw session file, created on first successful login.
    File(PathBuf),
}

struct PoolParts {
    handle: SenderPoolHandle,
    task: JoinHandle<()>,
}

/// A live client plus the sender-pool runner that performs its I/O.
#[derive(Clone)]
pub struct TelegramHandle {
    pub client: Client,
    pool: Arc<Mutex<Option<PoolParts>>>,
}

impl TelegramHandle {
    fn is_running(&self) -> bool {
        match self.pool.lock() {
            Ok(pool) => pool.as_ref().is_some_and(|parts| !parts.task.is_finished()),
            Err(_) => false,
        }
    }

    fn stop(&self) {
        let parts = match self.pool.lock() {
            Ok(mut pool) => pool.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(parts) = parts {
            parts.handle.quit();
            parts.task.abort();
        }
        self.client.disconnect();
    }
}

/// grammers-backed implementation of the guard's backend.
pub struct GrammersBackend {
    credentials: Credentials,
    #[allow(deprecated)]
    session: Arc<TlSession>,
    session_file: Option<PathBuf>,
    dc_address: String,
}

impl GrammersBackend {
    #[allow(deprecated)]
    pub fn new(
        credentials: Credentials,
        source: SessionSource,
        dc_address: impl Into<String>,
    ) -> Result<Self, String> {
        let (session, session_file) = match source {
            SessionSource::Inline(data) => {
                log::info!("GrammersBackend: using session string from configuration");
                (decode_session(&data)?, None)
            }
            SessionSource::File(path) if path.exists() => {
                log::info!("GrammersBackend: loading session file {}", path.display());
                (read_session_file(&path)?, Some(path))
            }
            SessionSource::File(path) => {
                log::info!(
                    "GrammersBackend: no session file at {}, starting a fresh session",
                    path.display()
                );
                (TlSession::new(), Some(path))
            }
        };

        Ok(Self {
            credentials,
            session: Arc::new(session),
            session_file,
            dc_address: dc_address.into(),
        })
    }

    /// Base64 form of the current session, for `TELEGRAM_SESSION`.
    pub fn export_session(&self) -> String {
        encode_session(&self.session)
    }

    pub fn session_file(&self) -> Option<&Path> {
        self.session_file.as_deref()
    }

    fn persist_session(&self) {
        let Some(path) = self.session_file.as_deref() else {
            return;
        };

        match write_session_file(path, &self.session) {
            Ok(()) => log::info!("persist_session: session saved to {}", path.display()),
            Err(e) => log::warn!(
                "persist_session: failed to save session to {}: {}",
                path.display(),
                e
            ),
        }
    }

    async fn log_signed_in_user(&self, client: &Client) {
        match run_telegram_request("authenticate.get_me", || async { client.get_me().await }).await {
            Ok(me) => log::info!(
                "authenticate: signed in as id={} username={:?}",
                me.raw.id(),
                me.username()
            ),
            Err(e) => log::warn!("authenticate: get_me failed after sign-in: {}", e),
        }
    }
}

pub(crate) async fn ensure_basic_connectivity(addr: &str) -> Result<(), SessionError> {
    // Fail fast when the network is clearly down instead of letting the
    // sender pool retry in the background.
    match timeout(CONNECTIVITY_CHECK_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(SessionError::Transport(format!(
            "connectivity check to {addr} failed: {e}"
        ))),
        Err(_) => Err(SessionError::Transport(format!(
            "connectivity check to {addr} timed out"
        ))),
    }
}

#[async_trait]
impl SessionBackend for GrammersBackend {
    type Handle = TelegramHandle;

    async fn connect(&self) -> Result<TelegramHandle, SessionError> {
        ensure_basic_connectivity(&self.dc_address).await?;

        let built = build_client(Arc::clone(&self.session), self.credentials.api_id);
        log::info!("connect: sender pool started");

        Ok(TelegramHandle {
            client: built.client,
            pool: Arc::new(Mutex::new(Some(PoolParts {
                handle: built.pool_handle,
                task: built.pool_task,
            }))),
        })
    }

    fn is_alive(&self, handle: &TelegramHandle) -> bool {
        handle.is_running()
    }

    async fn is_authorized(&self, handle: &TelegramHandle) -> Result<bool, SessionError> {
        super::health::check_authorized(&handle.client).await
    }

    async fn authenticate(&self, handle: &TelegramHandle) -> Result<(), SessionError> {
        if self.is_authorized(handle).await? {
            log::info!("authenticate: stored session is authorized");
            self.log_signed_in_user(&handle.client).await;
            self.persist_session();
            return Ok(());
        }

        if !self.credentials.interactive {
            return Err(SessionError::AuthenticationFailed(
                "session is not authorized; run the `login` command to create one".to_string(),
            ));
        }

        let phone = self.credentials.phone.as_deref().ok_or_else(|| {
            SessionError::AuthenticationFailed(
                "session is not authorized and no phone number is configured".to_string(),
            )
        })?;

        interactive_login(&handle.client, phone, &self.credentials.api_hash).await?;
        self.log_signed_in_user(&handle.client).await;
        self.persist_session();
        Ok(())
    }

    async fn disconnect(&self, handle: TelegramHandle) {
        log::info!("disconnect: stopping sender pool");
        handle.stop();
    }
}
