//! In-memory stand-ins for the Telegram backend, shared by guard and API tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::guard::{SessionBackend, SessionError};
use crate::telegram::{
    Directory, EntityKind, EntityRef, EntitySummary, MemberSummary, MessageSummary, QueryError,
};

pub struct FakeBackend {
    pub connects: AtomicUsize,
    pub authentications: AtomicUsize,
    pub probes: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_auth: AtomicBool,
    connect_delay: Duration,
    probe_delay: Mutex<Duration>,
    auth_delay: Mutex<Duration>,
    next_id: AtomicU64,
    current: AtomicU64,
    dead: Mutex<HashSet<u64>>,
    revoked: Mutex<HashSet<u64>>,
    directory: Arc<FakeDirectory>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            connects: AtomicUsize::new(0),
            authentications: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            fail_auth: AtomicBool::new(false),
            connect_delay: Duration::ZERO,
            probe_delay: Mutex::new(Duration::ZERO),
            auth_delay: Mutex::new(Duration::ZERO),
            next_id: AtomicU64::new(0),
            current: AtomicU64::new(0),
            dead: Mutex::new(HashSet::new()),
            revoked: Mutex::new(HashSet::new()),
            directory: Arc::new(FakeDirectory::sample()),
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Closes the transport of the most recently connected handle.
    pub fn drop_connection(&self) {
        let id = self.current.load(Ordering::SeqCst);
        self.dead.lock().unwrap().insert(id);
    }

    /// Makes the most recently connected handle report itself unauthorized.
    pub fn revoke_authorization(&self) {
        let id = self.current.load(Ordering::SeqCst);
        self.revoked.lock().unwrap().insert(id);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock().unwrap() = delay;
    }

    pub fn set_auth_delay(&self, delay: Duration) {
        *self.auth_delay.lock().unwrap() = delay;
    }
}

#[derive(Debug, Clone)]
pub struct FakeHandle {
    pub id: u64,
    directory: Arc<FakeDirectory>,
}

#[async_trait]
impl SessionBackend for FakeBackend {
    type Handle = FakeHandle;

    async fn connect(&self) -> Result<FakeHandle, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.connect_delay).await;

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("connection refused".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.store(id, Ordering::SeqCst);
        Ok(FakeHandle {
            id,
            directory: Arc::clone(&self.directory),
        })
    }

    fn is_alive(&self, handle: &FakeHandle) -> bool {
        !self.dead.lock().unwrap().contains(&handle.id)
    }

    async fn is_authorized(&self, handle: &FakeHandle) -> Result<bool, SessionError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.probe_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        Ok(!self.revoked.lock().unwrap().contains(&handle.id))
    }

    async fn authenticate(&self, _handle: &FakeHandle) -> Result<(), SessionError> {
        self.authentications.fetch_add(1, Ordering::SeqCst);
        let delay = *self.auth_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(SessionError::AuthenticationFailed(
                "session is not authorized".to_string(),
            ));
        }
        Ok(())
    }

    async fn disconnect(&self, _handle: FakeHandle) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Canned chats, messages and members.
#[derive(Debug)]
pub struct FakeDirectory {
    entities: Vec<EntitySummary>,
    messages: Vec<(i64, MessageSummary)>,
    members: Vec<(i64, MemberSummary)>,
}

fn entity(id: i64, title: &str, username: Option<&str>, kind: EntityKind) -> EntitySummary {
    EntitySummary {
        id,
        title: title.to_string(),
        username: username.map(str::to_string),
        link: username.map(|u| format!("https://t.me/{}", u)),
        is_public: kind != EntityKind::User,
        kind,
    }
}

fn news_post(id: i32) -> MessageSummary {
    let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, id as u32).unwrap();
    MessageSummary {
        id,
        text: format!("Release notes #{}", id),
        date: Some(date.to_rfc3339()),
        sender_id: Some(2),
        sender_name: "Rust News".to_string(),
        is_channel_post: true,
        views: Some(100 + id),
        replies: 0,
        link: Some(format!("https://t.me/rustnews/{}", id)),
    }
}

fn member(id: i64, first_name: &str, username: Option<&str>, is_bot: bool) -> MemberSummary {
    MemberSummary {
        id,
        first_name: Some(first_name.to_string()),
        last_name: None,
        username: username.map(str::to_string),
        phone: None,
        status: if is_bot { "Unknown" } else { "recently" }.to_string(),
        is_bot,
    }
}

impl FakeDirectory {
    pub fn sample() -> Self {
        Self {
            entities: vec![
                entity(1, "Rust Lang", Some("rustlang"), EntityKind::Group),
                entity(2, "Rust News", Some("rustnews"), EntityKind::Channel),
                entity(3, "Alice", None, EntityKind::User),
            ],
            messages: [30, 29, 28].into_iter().map(|id| (2, news_post(id))).collect(),
            members: vec![
                (1, member(10, "Ferris", Some("ferris"), false)),
                (1, member(11, "Corro", None, false)),
                (1, member(12, "Helper", Some("helper_bot"), true)),
            ],
        }
    }

    fn resolve(&self, entity: &EntityRef) -> Result<&EntitySummary, QueryError> {
        self.entities
            .iter()
            .find(|e| match entity {
                EntityRef::Id(id) => e.id == *id,
                EntityRef::Username(name) => e
                    .username
                    .as_deref()
                    .is_some_and(|u| u.eq_ignore_ascii_case(name)),
            })
            .ok_or_else(|| QueryError::NotFound(entity.to_string()))
    }
}

#[async_trait]
impl Directory for FakeHandle {
    async fn search_entities(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<EntitySummary>, QueryError> {
        let needle = keyword.trim_start_matches('@').to_lowercase();
        Ok(self
            .directory
            .entities
            .iter()
            .filter(|e| {
                e.title.to_lowercase().contains(&needle)
                    || e.username.as_deref().is_some_and(|u| u.contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_messages(
        &self,
        entity: &EntityRef,
        limit: usize,
        offset_id: i32,
    ) -> Result<Vec<MessageSummary>, QueryError> {
        let chat = self.directory.resolve(entity)?;
        Ok(self
            .directory
            .messages
            .iter()
            .filter(|(chat_id, msg)| *chat_id == chat.id && (offset_id == 0 || msg.id < offset_id))
            .map(|(_, msg)| msg.clone())
            .take(limit)
            .collect())
    }

    async fn get_members(
        &self,
        entity: &EntityRef,
        limit: usize,
    ) -> Result<Vec<MemberSummary>, QueryError> {
        let chat = self.directory.resolve(entity)?;
        if chat.kind != EntityKind::Group {
            return Err(QueryError::Unsupported(
                "Cannot fetch members from this entity type".to_string(),
            ));
        }
        Ok(self
            .directory
            .members
            .iter()
            .filter(|(chat_id, _)| *chat_id == chat.id)
            .map(|(_, m)| m.clone())
            .take(limit)
            .collect())
    }
}
