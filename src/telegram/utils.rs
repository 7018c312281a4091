use super::EntityKind;
use grammers_client::grammers_tl_types as tl;
use grammers_client::types::Peer;
use grammers_client::Client;
use grammers_mtsender::{SenderPool, SenderPoolHandle};
#[allow(deprecated)]
use grammers_session::storages::TlSession;
use grammers_session::defs::{PeerAuth, PeerRef};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

use base64::Engine;
use chrono::{DateTime, Utc};

// ===== Session encoding =====

#[allow(deprecated)]
pub fn encode_session(session: &TlSession) -> String {
    let bytes = session.save();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[allow(deprecated)]
pub fn decode_session(session_data: &str) -> Result<TlSession, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(session_data.trim())
        .map_err(|e| format!("Failed to decode session data: {e}"))?;

    TlSession::load(&bytes).map_err(|e| format!("Failed to load TlSession: {e}"))
}

#[allow(deprecated)]
pub fn read_session_file(path: &Path) -> Result<TlSession, String> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read session file {}: {e}", path.display()))?;

    TlSession::load(&bytes)
        .map_err(|e| format!("Failed to load session file {}: {e}", path.display()))
}

#[allow(deprecated)]
pub fn write_session_file(path: &Path, session: &TlSession) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, session.save())
}

// ===== Client construction =====

pub struct BuiltClient {
    pub client: Client,
    pub pool_handle: SenderPoolHandle,
    pub pool_task: JoinHandle<()>,
}

#[allow(deprecated)]
pub fn build_client(session: Arc<TlSession>, api_id: i32) -> BuiltClient {
    let pool = SenderPool::new(Arc::clone(&session), api_id);

    // Client::new connects "logically", but needs the runner to actually do I/O.
    let client = Client::new(&pool);

    let SenderPool { runner, handle, .. } = pool;

    let pool_task = tokio::spawn(runner.run());

    BuiltClient {
        client,
        pool_handle: handle,
        pool_task,
    }
}

// ===== Peer helpers =====

/// Kind and visibility for a channel-backed chat, from its raw flags.
pub(crate) fn classify_channel(broadcast: bool, megagroup: bool, gigagroup: bool) -> (EntityKind, bool) {
    let kind = if megagroup || gigagroup {
        EntityKind::Group
    } else if broadcast {
        EntityKind::Channel
    } else {
        EntityKind::Unknown
    };
    (kind, broadcast || megagroup || gigagroup)
}

pub(crate) fn classify_peer(peer: &Peer) -> (EntityKind, bool) {
    match peer {
        Peer::User(_) => (EntityKind::User, false),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(channel) => {
                classify_channel(channel.broadcast, channel.megagroup, channel.gigagroup)
            }
            _ => (EntityKind::Group, false),
        },
        Peer::Channel(channel) => classify_channel(
            channel.raw.broadcast,
            channel.raw.megagroup,
            channel.raw.gigagroup,
        ),
    }
}

/// Bare id of a channel or megagroup, used for private message links.
pub(crate) fn channel_bare_id(peer: &Peer) -> Option<i64> {
    match peer {
        Peer::Channel(_) => Some(peer.id().bare_id()),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(_) => Some(peer.id().bare_id()),
            _ => None,
        },
        Peer::User(_) => None,
    }
}

pub(crate) fn peer_ref(peer: &Peer) -> PeerRef {
    let access_hash = match peer {
        Peer::User(user) => match &user.raw {
            tl::enums::User::User(u) => u.access_hash,
            _ => None,
        },
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(channel) => channel.access_hash,
            _ => None,
        },
        Peer::Channel(channel) => channel.raw.access_hash,
    };

    PeerRef {
        id: peer.id(),
        auth: access_hash.map(PeerAuth::from_hash).unwrap_or_default(),
    }
}

pub(crate) fn entity_link(username: Option<&str>) -> Option<String> {
    match username {
        Some(name) if !name.is_empty() => Some(format!("https://t.me/{}", name)),
        _ => None,
    }
}

/// Public chats link by username; private channels and megagroups through
/// `t.me/c/`; anything else has no shareable link.
pub(crate) fn message_link(
    username: Option<&str>,
    channel_id: Option<i64>,
    message_id: i32,
) -> Option<String> {
    match (username, channel_id) {
        (Some(name), _) if !name.is_empty() => Some(format!("https://t.me/{}/{}", name, message_id)),
        (_, Some(channel_id)) => Some(format!("https://t.me/c/{}/{}", channel_id, message_id)),
        _ => None,
    }
}

/// Short snake_case label for a user's last-seen status.
pub(crate) fn status_label(status: Option<&tl::enums::UserStatus>) -> &'static str {
    match status {
        Some(tl::enums::UserStatus::Empty) => "empty",
        Some(tl::enums::UserStatus::Online(_)) => "online",
        Some(tl::enums::UserStatus::Offline(_)) => "offline",
        Some(tl::enums::UserStatus::Recently(_)) => "recently",
        Some(tl::enums::UserStatus::LastWeek(_)) => "last_week",
        Some(tl::enums::UserStatus::LastMonth(_)) => "last_month",
        None => "Unknown",
    }
}

/// RFC 3339 with an explicit `+00:00` offset.
pub(crate) fn message_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339()
}

pub(crate) fn full_name(first_name: Option<&str>, last_name: Option<&str>) -> String {
    let mut name = first_name.unwrap_or_default().to_string();
    if let Some(last) = last_name.filter(|l| !l.is_empty()) {
        if !name.is_empty() {
            name.push(' ');
        }
        name.push_str(last);
    }
    name
}
