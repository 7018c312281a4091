use super::session::TelegramHandle;
use super::utils::{
    channel_bare_id, classify_peer, entity_link, full_name, message_date, message_link, peer_ref,
    status_label,
};
use super::{
    run_telegram_request, Directory, EntityKind, EntityRef, EntitySummary, MemberSummary,
    MessageSummary, QueryError,
};
use async_trait::async_trait;
use grammers_client::grammers_tl_types as tl;
use grammers_client::types::{Message, Peer, User};
use grammers_client::Client;

const UNSUPPORTED_MEMBERS: &str = "Cannot fetch members from this entity type (must be a group you are a member of with permission) or it's a private chat";

fn matches_keyword(title: &str, username: Option<&str>, needle: &str) -> bool {
    title.to_lowercase().contains(needle)
        || username.is_some_and(|u| u.to_lowercase().contains(needle))
}

/// `@name` and numeric keywords get a direct lookup unless the dialog scan
/// already returned that exact entity.
fn wants_direct_lookup(keyword: &str, results: &[EntitySummary]) -> bool {
    let is_handle = keyword.starts_with('@');
    let is_numeric = !keyword.is_empty() && keyword.chars().all(|ch| ch.is_ascii_digit());
    if !is_handle && !is_numeric {
        return false;
    }

    let bare = keyword.trim_start_matches('@');
    !results.iter().any(|r| {
        r.username.as_deref().is_some_and(|u| u.eq_ignore_ascii_case(bare)) || r.id.to_string() == bare
    })
}

fn summarize_peer(peer: &Peer) -> EntitySummary {
    let (kind, is_public) = classify_peer(peer);
    let username = peer.username().map(|u| u.to_string());
    EntitySummary {
        id: peer.id().bare_id(),
        title: peer.name().map(|n| n.to_string()).unwrap_or_default(),
        link: entity_link(username.as_deref()),
        username,
        kind,
        is_public,
    }
}

fn summarize_user(user: &User) -> MemberSummary {
    let (is_bot, status) = match &user.raw {
        tl::enums::User::User(u) => (
            u.bot,
            status_label(u.status.as_ref()).to_string(),
        ),
        _ => (false, "Unknown".to_string()),
    };

    MemberSummary {
        id: user.raw.id(),
        first_name: user.first_name().map(|s| s.to_string()),
        last_name: user.last_name().map(|s| s.to_string()),
        username: user.username().map(|s| s.to_string()),
        phone: user.phone().map(|s| s.to_string()),
        status,
        is_bot,
    }
}

fn summarize_message(message: &Message, chat: &Peer) -> MessageSummary {
    let chat_title = chat.name().map(|n| n.to_string());
    let (sender_id, sender_name) = match message.sender() {
        Some(sender) => {
            let name = match &sender {
                Peer::User(user) => full_name(user.first_name(), user.last_name()),
                _ => String::new(),
            };
            let name = if name.is_empty() {
                chat_title.clone().unwrap_or_else(|| "Channel/Group".to_string())
            } else {
                name
            };
            (Some(sender.id().bare_id()), name)
        }
        None => (None, "Unknown".to_string()),
    };

    let username = chat.username().map(|u| u.to_string());

    MessageSummary {
        id: message.id(),
        text: message.text().to_string(),
        date: Some(message_date(message.date())),
        sender_id,
        sender_name,
        is_channel_post: message.post(),
        views: message.view_count(),
        replies: message.reply_count().unwrap_or(0),
        link: message_link(username.as_deref(), channel_bare_id(chat), message.id()),
    }
}

async fn find_in_dialogs(client: &Client, id: i64) -> Result<Option<Peer>, QueryError> {
    let mut dialogs = client.iter_dialogs();
    while let Some(dialog) = dialogs.next().await.map_err(QueryError::telegram)? {
        let peer = dialog.peer();
        if peer.id().bare_id() == id || peer.id().bot_api_dialog_id() == id {
            return Ok(Some(peer.clone()));
        }
    }
    Ok(None)
}

async fn resolve(client: &Client, entity: &EntityRef) -> Result<Option<Peer>, QueryError> {
    match entity {
        EntityRef::Username(name) => run_telegram_request("resolve.resolve_username", || async {
            client.resolve_username(name).await
        })
        .await
        .map_err(QueryError::telegram),
        EntityRef::Id(id) => find_in_dialogs(client, *id).await,
    }
}

async fn resolve_required(client: &Client, entity: &EntityRef) -> Result<Peer, QueryError> {
    resolve(client, entity)
        .await?
        .ok_or_else(|| QueryError::NotFound(entity.to_string()))
}

#[async_trait]
impl Directory for TelegramHandle {
    async fn search_entities(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<EntitySummary>, QueryError> {
        let needle = keyword.to_lowercase();
        let mut results = Vec::new();

        let mut dialogs = self.client.iter_dialogs();
        while results.len() < limit {
            let Some(dialog) = dialogs.next().await.map_err(QueryError::telegram)? else {
                break;
            };
            let peer = dialog.peer();
            let title = peer.name().unwrap_or_default().to_string();
            let username = peer.username().map(|u| u.to_string());
            if matches_keyword(&title, username.as_deref(), &needle) {
                results.push(summarize_peer(peer));
            }
        }

        if wants_direct_lookup(keyword, &results) {
            if let Some(entity) = EntityRef::parse(keyword) {
                match resolve(&self.client, &entity).await {
                    Ok(Some(peer)) => results.push(summarize_peer(&peer)),
                    Ok(None) => log::info!("search_entities: no direct match for '{}'", keyword),
                    Err(e) => log::warn!(
                        "search_entities: could not resolve entity '{}' directly: {}",
                        keyword,
                        e
                    ),
                }
            }
        }

        log::info!(
            "search_entities: keyword='{}' returned {} result(s)",
            keyword,
            results.len()
        );
        Ok(results)
    }

    async fn get_messages(
        &self,
        entity: &EntityRef,
        limit: usize,
        offset_id: i32,
    ) -> Result<Vec<MessageSummary>, QueryError> {
        let chat = resolve_required(&self.client, entity).await?;

        let mut messages_iter = self.client.iter_messages(peer_ref(&chat));
        if offset_id > 0 {
            messages_iter = messages_iter.offset_id(offset_id);
        }

        let mut messages = Vec::new();
        while messages.len() < limit {
            let Some(message) = messages_iter.next().await.map_err(QueryError::telegram)? else {
                break;
            };
            messages.push(summarize_message(&message, &chat));
        }

        log::info!(
            "get_messages: entity={} offset_id={} returned {} message(s)",
            entity,
            offset_id,
            messages.len()
        );
        Ok(messages)
    }

    async fn get_members(
        &self,
        entity: &EntityRef,
        limit: usize,
    ) -> Result<Vec<MemberSummary>, QueryError> {
        let chat = resolve_required(&self.client, entity).await?;

        let (kind, _) = classify_peer(&chat);
        if kind != EntityKind::Group {
            return Err(QueryError::Unsupported(UNSUPPORTED_MEMBERS.to_string()));
        }

        let mut participants = self.client.iter_participants(peer_ref(&chat));
        let mut members = Vec::new();
        while members.len() < limit {
            let Some(participant) = participants.next().await.map_err(QueryError::telegram)? else {
                break;
            };
            members.push(summarize_user(&participant.user));
        }

        log::info!(
            "get_members: entity={} returned {} member(s)",
            entity,
            members.len()
        );
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: i64, username: Option<&str>) -> EntitySummary {
        EntitySummary {
            id,
            title: "Some chat".to_string(),
            username: username.map(|u| u.to_string()),
            link: entity_link(username),
            kind: EntityKind::Channel,
            is_public: true,
        }
    }

    #[test]
    fn test_matches_keyword_title_and_username() {
        assert!(matches_keyword("Rust Language", None, "rust"));
        assert!(matches_keyword("Programming", Some("RustLang"), "rustlang"));
        assert!(!matches_keyword("Python", Some("py"), "rust"));
    }

    #[test]
    fn test_plain_keyword_skips_direct_lookup() {
        assert!(!wants_direct_lookup("rust", &[]));
        assert!(!wants_direct_lookup("", &[]));
    }

    #[test]
    fn test_handle_keyword_wants_direct_lookup() {
        assert!(wants_direct_lookup("@durov", &[]));
        assert!(wants_direct_lookup("@durov", &[summary(1, Some("telegram"))]));
        assert!(!wants_direct_lookup("@durov", &[summary(1, Some("Durov"))]));
    }

    #[test]
    fn test_numeric_keyword_wants_direct_lookup() {
        assert!(wants_direct_lookup("777000", &[]));
        assert!(!wants_direct_lookup("777000", &[summary(777000, None)]));
    }
}
