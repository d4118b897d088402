use std::sync::Arc;

use tracing::debug;

use hearth_db::Database;
use hearth_gateway::{Delivery, Session, SessionRegistry};
use hearth_types::api::{ChannelsPack, MessagesPack, OutgoingMessage, UsersPack};
use hearth_types::events::ServerEvent;
use hearth_types::models::{ChatKind, GROUP_CHAT_ID, SavedMessage, UserId};

use crate::error::ApiError;

/// Persists chat messages and works out who receives them.
///
/// Nothing here touches a socket: every operation returns the deliveries
/// the gateway should seal and send.
pub struct MessageRouter {
    db: Arc<Database>,
    sessions: SessionRegistry,
}

impl MessageRouter {
    pub fn new(db: Arc<Database>, sessions: SessionRegistry) -> Self {
        Self { db, sessions }
    }

    pub fn route(&self, sender: &Session, msg: OutgoingMessage) -> Result<Vec<Delivery>, ApiError> {
        if msg.text.trim().is_empty() {
            debug!("{} sent an empty message, ignoring", sender.user.username);
            return Ok(Vec::new());
        }

        let sender_id = sender.user.id;
        match ChatKind::classify(sender_id, msg.chat_id) {
            ChatKind::Group => {
                let saved = self.db.add_message(sender_id, GROUP_CHAT_ID, &msg.text)?;
                let everyone = self.sessions.all();
                debug!("group message {} -> {} sessions", saved.id, everyone.len());
                Ok(message_to(&everyone, &saved))
            }

            ChatKind::Notes => {
                let saved = self.db.add_message(sender_id, sender_id, &msg.text)?;
                Ok(message_to(&self.sessions.sessions_for_user(sender_id), &saved))
            }

            ChatKind::Private { peer_id } => self.route_private(sender_id, peer_id, &msg.text),
        }
    }

    fn route_private(&self, sender_id: UserId, peer_id: UserId, text: &str) -> Result<Vec<Delivery>, ApiError> {
        if self.db.get_user_by_id(peer_id)?.is_none() {
            return Err(ApiError::UnknownRecipient(peer_id));
        }

        let saved = self.db.add_message(sender_id, peer_id, text)?;

        // Both rows are committed before anyone is told about the channel.
        let known = self.db.channel_exists(sender_id, peer_id)? && self.db.channel_exists(peer_id, sender_id)?;
        let created = !known && self.db.add_channel_pair(sender_id, peer_id)?;

        let peer_sessions = self.sessions.sessions_for_user(peer_id);
        let mut deliveries = Vec::new();

        if created && !peer_sessions.is_empty() {
            let channels = self.db.channels_for(peer_id)?;
            debug!("new channel {} <-> {}, refreshing peer sidebar", sender_id, peer_id);
            deliveries.extend(peer_sessions.iter().map(|s| {
                Delivery::to_session(
                    s,
                    ServerEvent::GetChannels(ChannelsPack {
                        channels: channels.clone(),
                    }),
                )
            }));
        }

        deliveries.extend(message_to(&peer_sessions, &saved));
        deliveries.extend(message_to(&self.sessions.sessions_for_user(sender_id), &saved));
        debug!("private message {} {} -> {} ({} deliveries)", saved.id, sender_id, peer_id, deliveries.len());
        Ok(deliveries)
    }

    /// History of one chat, as seen by the caller.
    pub fn history(&self, caller: &Session, chat_id: UserId) -> Result<Delivery, ApiError> {
        let messages = self.db.messages_for_chat(caller.user.id, chat_id)?;
        Ok(Delivery::to_session(
            caller,
            ServerEvent::GetMessages(MessagesPack { chat_id, messages }),
        ))
    }

    pub fn channels(&self, caller: &Session) -> Result<Delivery, ApiError> {
        let channels = self.db.channels_for(caller.user.id)?;
        Ok(Delivery::to_session(
            caller,
            ServerEvent::GetChannels(ChannelsPack { channels }),
        ))
    }

    pub fn users(&self, caller: &Session) -> Result<Delivery, ApiError> {
        let users = self.db.list_users()?;
        Ok(Delivery::to_session(caller, ServerEvent::GetUsers(UsersPack { users })))
    }
}

fn message_to(sessions: &[Session], saved: &SavedMessage) -> Vec<Delivery> {
    sessions
        .iter()
        .map(|s| Delivery::to_session(s, ServerEvent::Message(saved.clone())))
        .collect()
}
