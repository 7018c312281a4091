//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};

use crate::guard::GuardConfig;
use crate::telegram::SessionSource;

pub const DEFAULT_SESSION_FILE: &str = "anon_session.session";
pub const DEFAULT_DC_ADDRESS: &str = "149.154.167.51:443";

/// HTTP service exposing read-only Telegram lookups over a user session.
#[derive(Parser, Debug)]
#[command(name = "telegram-api-service", version)]
#[command(about = "HTTP service exposing read-only Telegram lookups over a user session")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub telegram: TelegramArgs,

    #[command(flatten)]
    pub server: ServerArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Sign in interactively and print the session string
    Login,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}

#[derive(Args, Debug, Clone)]
pub struct TelegramArgs {
    /// Telegram API id from my.telegram.org
    #[arg(long, env = "TELEGRAM_API_ID", global = true)]
    pub api_id: Option<i32>,

    /// Telegram API hash from my.telegram.org
    #[arg(long, env = "TELEGRAM_API_HASH", global = true, hide_env_values = true)]
    pub api_hash: Option<String>,

    /// Phone number used by the `login` command
    #[arg(long, env = "TELEGRAM_PHONE_NUMBER", global = true)]
    pub phone: Option<String>,

    /// Base64 session string; takes precedence over the session file
    #[arg(long, env = "TELEGRAM_SESSION", global = true, hide_env_values = true)]
    pub session: Option<String>,

    /// Session file, created on first successful login
    #[arg(long, env = "TELEGRAM_SESSION_FILE", global = true, default_value = DEFAULT_SESSION_FILE)]
    pub session_file: PathBuf,

    /// Upper bound on how long a request waits for the client to become ready
    #[arg(long, env = "TELEGRAM_STARTUP_TIMEOUT_SECS", global = true, default_value_t = 90)]
    pub startup_timeout_secs: u64,

    /// Upper bound on the liveness probe of a cached connection
    #[arg(long, env = "TELEGRAM_PROBE_TIMEOUT_SECS", global = true, default_value_t = 3)]
    pub probe_timeout_secs: u64,

    /// Upper bound on each of connect and sign-in check within one attempt
    #[arg(long, env = "TELEGRAM_CONNECT_TIMEOUT_SECS", global = true, default_value_t = 60)]
    pub connect_timeout_secs: u64,

    /// Telegram endpoint used for the pre-connect reachability check
    #[arg(long, env = "TELEGRAM_DC_ADDRESS", global = true, default_value = DEFAULT_DC_ADDRESS)]
    pub dc_address: String,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", global = true, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP server to
    #[arg(long, env = "PORT", global = true, default_value_t = 8080)]
    pub port: u16,
}

/// Validated Telegram credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: Option<String>,
    /// Whether sign-in may prompt on the terminal.
    pub interactive: bool,
}

impl TelegramArgs {
    pub fn credentials(&self, interactive: bool) -> Result<Credentials, String> {
        let api_id = self
            .api_id
            .ok_or_else(|| "TELEGRAM_API_ID is required".to_string())?;
        if api_id <= 0 {
            return Err(format!("TELEGRAM_API_ID must be positive, got {api_id}"));
        }

        let api_hash = self
            .api_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| "TELEGRAM_API_HASH is required".to_string())?
            .to_string();

        let phone = self
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        if interactive && phone.is_none() {
            return Err("TELEGRAM_PHONE_NUMBER is required for login".to_string());
        }

        Ok(Credentials {
            api_id,
            api_hash,
            phone,
            interactive,
        })
    }

    /// Inline session string first, then the session file.
    pub fn session_source(&self) -> SessionSource {
        match self.session.as_deref().map(str::trim) {
            Some(data) if !data.is_empty() => SessionSource::Inline(data.to_string()),
            _ => SessionSource::File(self.session_file.clone()),
        }
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            start_time: Instant::now(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("0.0.0.0", 8080)
    }
}

impl From<&ServerArgs> for ServerConfig {
    fn from(args: &ServerArgs) -> Self {
        Self::new(args.host.clone(), args.port)
    }
}
