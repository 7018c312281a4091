use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

// ===== Modules =====

pub mod utils;
mod entities;
mod health;
mod login;
mod session;

pub use session::{GrammersBackend, SessionSource, TelegramHandle};

// ===== Models =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
    Channel,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    pub link: Option<String>,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: i32,
    pub text: String,
    pub date: Option<String>,
    pub sender_id: Option<i64>,
    pub sender_name: String,
    pub is_channel_post: bool,
    pub views: Option<i32>,
    pub replies: i32,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub is_bot: bool,
}

/// How a caller names a chat or user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Id(i64),
    Username(String),
}

impl EntityRef {
    /// All-digit input (optionally negative, Bot API style) is an id,
    /// anything else a username with any leading `@` removed. A `-` that
    /// does not start an id is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(digits) = trimmed.strip_prefix('-') {
            // A leading sign only ever starts a Bot API style id.
            if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
                return None;
            }
            return trimmed.parse::<i64>().ok().map(EntityRef::Id);
        }
        if trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            if let Ok(id) = trimmed.parse::<i64>() {
                return Some(EntityRef::Id(id));
            }
        }

        let username = trimmed.trim_start_matches('@');
        if username.is_empty() {
            return None;
        }
        Some(EntityRef::Username(username.to_string()))
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Id(id) => write!(f, "{}", id),
            EntityRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Entity not found or could not be resolved: {0}")]
    NotFound(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("Telegram request failed: {0}")]
    Telegram(String),
}

impl QueryError {
    pub(crate) fn telegram(error: impl std::fmt::Display) -> Self {
        QueryError::Telegram(error.to_string())
    }
}

/// Read-only queries served over a ready connection.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Dialogs whose title or username contains `keyword`, plus a direct
    /// lookup when the keyword is an `@username` or a numeric id.
    async fn search_entities(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<EntitySummary>, QueryError>;

    /// Newest-first history, starting below `offset_id` when it is non-zero.
    async fn get_messages(
        &self,
        entity: &EntityRef,
        limit: usize,
        offset_id: i32,
    ) -> Result<Vec<MessageSummary>, QueryError>;

    async fn get_members(
        &self,
        entity: &EntityRef,
        limit: usize,
    ) -> Result<Vec<MemberSummary>, QueryError>;
}

// ===== Request pacing =====

static TELEGRAM_LAST_REQUEST_AT: Lazy<Mutex<Option<Instant>>> = Lazy::new(|| Mutex::new(None));

const TELEGRAM_REQUEST_DELAY_MS: u64 = 350;
const TELEGRAM_FLOOD_WAIT_RETRY_LIMIT: usize = 3;

pub(crate) fn parse_flood_wait_seconds(message: &str) -> Option<u64> {
    let upper = message.to_uppercase();
    if !upper.contains("FLOOD_WAIT") {
        return None;
    }

    if let Some(value_pos) = upper.find("VALUE:") {
        let suffix = &upper[value_pos + "VALUE:".len()..];
        let digits: String = suffix
            .chars()
            .skip_while(|ch| !ch.is_ascii_digit())
            .take_while(|ch| ch.is_ascii_digit())
            .collect();
        if let Ok(seconds) = digits.parse::<u64>() {
            return Some(seconds.max(1));
        }
    }

    if let Some(wait_pos) = upper.find("FLOOD_WAIT_") {
        let suffix = &upper[wait_pos + "FLOOD_WAIT_".len()..];
        let digits: String = suffix
            .chars()
            .take_while(|ch| ch.is_ascii_digit())
            .collect();
        if let Ok(seconds) = digits.parse::<u64>() {
            return Some(seconds.max(1));
        }
    }

    Some(1)
}

async fn wait_for_telegram_request_slot() {
    let mut last_request_at = TELEGRAM_LAST_REQUEST_AT.lock().await;
    if let Some(previous) = *last_request_at {
        let min_delay = Duration::from_millis(TELEGRAM_REQUEST_DELAY_MS);
        let elapsed = previous.elapsed();
        if elapsed < min_delay {
            tokio::time::sleep(min_delay - elapsed).await;
        }
    }

    *last_request_at = Some(Instant::now());
}

/// Runs one Telegram call, pacing calls process-wide and sleeping through
/// short flood waits.
pub(crate) async fn run_telegram_request<T, E, F, Fut>(
    operation_name: &str,
    mut request_fn: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut flood_wait_retries = 0usize;

    loop {
        wait_for_telegram_request_slot().await;

        match request_fn().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                let error_message = error.to_string();
                let Some(wait_seconds) = parse_flood_wait_seconds(&error_message) else {
                    return Err(error);
                };

                if flood_wait_retries >= TELEGRAM_FLOOD_WAIT_RETRY_LIMIT {
                    log::warn!(
                        "{} hit Telegram flood wait ({}s) and retries were exhausted",
                        operation_name,
                        wait_seconds
                    );
                    return Err(error);
                }

                flood_wait_retries += 1;
                log::warn!(
                    "{} hit Telegram flood wait ({}s), retry {}/{}",
                    operation_name,
                    wait_seconds,
                    flood_wait_retries,
                    TELEGRAM_FLOOD_WAIT_RETRY_LIMIT
                );

                tokio::time::sleep(Duration::from_secs(wait_seconds.max(1))).await;
            }
        }
    }
}
