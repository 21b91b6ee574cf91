#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;

use std::sync::Arc;

use eyre::{Context, Result};

use crate::config::constants::{
    ACTIVE_CONVERSATION_KEY, CHAT_PREFERENCES_KEY, CONVERSATION_KEY_PREFIX,
    MAX_RECENT_CONVERSATIONS, RECENT_CONVERSATIONS_KEY,
};
use crate::models::{ChatMessage, ChatPreferences, ConversationState};
use crate::storage::ArcStore;

pub fn conversation_key(conversation_id: &str) -> String {
    format!("{}{}", CONVERSATION_KEY_PREFIX, conversation_id)
}

/// Owns every conversation transcript kept on the client, the active
/// conversation pointer, the recency list and the chat preferences.
///
/// Malformed persisted data never raises: it is logged and read back as
/// empty or default. Errors returned from here come from the store itself.
pub struct ConversationStateManager {
    store: ArcStore,
}

pub type ArcConversations = Arc<ConversationStateManager>;

impl ConversationStateManager {
    pub fn new(store: ArcStore) -> Self {
        Self { store }
    }

    pub async fn get_active_conversation_id(&self) -> Result<Option<String>> {
        self.store
            .get(ACTIVE_CONVERSATION_KEY)
            .await
            .wrap_err("reading active conversation")
    }

    pub async fn set_active_conversation_id(&self, conversation_id: &str) -> Result<()> {
        self.store
            .set(ACTIVE_CONVERSATION_KEY, conversation_id)
            .await
            .wrap_err("writing active conversation")
    }

    /// Most recent first. A corrupted list reads as empty.
    pub async fn get_recent_conversations(&self) -> Result<Vec<String>> {
        let stored = match self
            .store
            .get(RECENT_CONVERSATIONS_KEY)
            .await
            .wrap_err("reading recent conversations")?
        {
            Some(stored) => stored,
            None => return Ok(vec![]),
        };

        match serde_json::from_str::<Vec<String>>(&stored) {
            Ok(recent) => Ok(recent),
            Err(err) => {
                log::error!("Error parsing recent conversations: {}", err);
                Ok(vec![])
            }
        }
    }

    pub async fn add_recent_conversation(&self, conversation_id: &str) -> Result<()> {
        let mut recent = self.get_recent_conversations().await?;
        recent.retain(|id| id != conversation_id);
        recent.insert(0, conversation_id.to_string());
        recent.truncate(MAX_RECENT_CONVERSATIONS);
        self.write_recent_conversations(&recent).await
    }

    pub async fn get_chat_preferences(&self) -> Result<ChatPreferences> {
        let stored = match self
            .store
            .get(CHAT_PREFERENCES_KEY)
            .await
            .wrap_err("reading chat preferences")?
        {
            Some(stored) => stored,
            None => return Ok(ChatPreferences::default()),
        };

        match serde_json::from_str::<ChatPreferences>(&stored) {
            Ok(preferences) => Ok(preferences),
            Err(err) => {
                log::error!("Error parsing chat preferences: {}", err);
                Ok(ChatPreferences::default())
            }
        }
    }

    pub async fn set_chat_preferences(&self, preferences: &ChatPreferences) -> Result<()> {
        let value =
            serde_json::to_string(preferences).wrap_err("serializing chat preferences")?;
        self.store
            .set(CHAT_PREFERENCES_KEY, &value)
            .await
            .wrap_err("writing chat preferences")
    }

    /// Persist `state` and move `conversation_id` to the head of the recency
    /// list. Every save counts as use.
    pub async fn save_conversation_state(
        &self,
        conversation_id: &str,
        state: &ConversationState,
    ) -> Result<()> {
        let value = serde_json::to_string(state)
            .wrap_err(format!("serializing conversation {}", conversation_id))?;
        self.store
            .set(&conversation_key(conversation_id), &value)
            .await
            .wrap_err(format!("writing conversation {}", conversation_id))?;
        self.add_recent_conversation(conversation_id).await
    }

    pub async fn load_conversation_state(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationState>> {
        let stored = match self
            .store
            .get(&conversation_key(conversation_id))
            .await
            .wrap_err(format!("reading conversation {}", conversation_id))?
        {
            Some(stored) => stored,
            None => return Ok(None),
        };

        match serde_json::from_str::<ConversationState>(&stored) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                log::error!(
                    "Error parsing conversation state for {}: {}",
                    conversation_id,
                    err
                );
                Ok(None)
            }
        }
    }

    pub async fn create_new_conversation(&self) -> Result<ConversationState> {
        let conversation_id = uuid::Uuid::new_v4().to_string();
        let state = ConversationState::new(&conversation_id);
        self.save_conversation_state(&conversation_id, &state)
            .await?;
        log::debug!("Created conversation {}", conversation_id);
        Ok(state)
    }

    /// Load the conversation, or create and save an empty one under the given
    /// id. Used for conversations whose id was assigned by the server.
    pub async fn ensure_conversation(&self, conversation_id: &str) -> Result<ConversationState> {
        if let Some(state) = self.load_conversation_state(conversation_id).await? {
            return Ok(state);
        }
        let state = ConversationState::new(conversation_id);
        self.save_conversation_state(conversation_id, &state)
            .await?;
        log::debug!("Created local state for conversation {}", conversation_id);
        Ok(state)
    }

    /// Move the messages of `old_id` to the end of `new_id` and drop `old_id`.
    /// Used once the server has assigned its own id to a conversation that
    /// was only known locally. A missing `old_id` is a no-op.
    pub async fn rekey_conversation(&self, old_id: &str, new_id: &str) -> Result<()> {
        if old_id == new_id {
            return Ok(());
        }
        let Some(old) = self.load_conversation_state(old_id).await? else {
            return Ok(());
        };

        let mut state = self
            .load_conversation_state(new_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(new_id));
        for mut message in old.into_messages() {
            message.set_conversation_id(new_id);
            state.append_message(message);
        }

        self.clear_conversation(old_id).await?;
        self.save_conversation_state(new_id, &state).await?;
        log::debug!("Conversation {} is now {}", old_id, new_id);
        Ok(())
    }

    /// Append `message` to an existing conversation. An unknown conversation
    /// is logged and the message is dropped without touching the store.
    pub async fn add_message_to_conversation(
        &self,
        conversation_id: &str,
        message: ChatMessage,
    ) -> Result<()> {
        let mut state = match self.load_conversation_state(conversation_id).await? {
            Some(state) => state,
            None => {
                log::error!("Conversation {} not found", conversation_id);
                return Ok(());
            }
        };

        state.append_message(message);
        self.save_conversation_state(conversation_id, &state).await
    }

    pub async fn get_conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ChatMessage>> {
        Ok(self
            .load_conversation_state(conversation_id)
            .await?
            .map(ConversationState::into_messages)
            .unwrap_or_default())
    }

    /// States of the conversations in the recency list, most recent first.
    /// Ids without a readable state are skipped.
    pub async fn recent_conversation_states(&self) -> Result<Vec<ConversationState>> {
        let mut states = vec![];
        for id in self.get_recent_conversations().await? {
            match self.load_conversation_state(&id).await? {
                Some(state) => states.push(state),
                None => log::warn!("Recent conversation {} has no stored state", id),
            }
        }
        Ok(states)
    }

    /// Remove one conversation. The active pointer is cleared as well when
    /// it names the removed conversation.
    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<()> {
        self.store
            .remove(&conversation_key(conversation_id))
            .await
            .wrap_err(format!("removing conversation {}", conversation_id))?;

        let mut recent = self.get_recent_conversations().await?;
        recent.retain(|id| id != conversation_id);
        self.write_recent_conversations(&recent).await?;

        if self.get_active_conversation_id().await?.as_deref() == Some(conversation_id) {
            self.store
                .remove(ACTIVE_CONVERSATION_KEY)
                .await
                .wrap_err("removing active conversation")?;
        }
        Ok(())
    }

    /// Remove every conversation, including ones that dropped out of the
    /// recency list, then the recency list, active pointer and preferences.
    pub async fn clear_all_conversations(&self) -> Result<()> {
        let mut keys = self
            .get_recent_conversations()
            .await?
            .iter()
            .map(|id| conversation_key(id))
            .collect::<Vec<_>>();

        let stored = self
            .store
            .keys(CONVERSATION_KEY_PREFIX)
            .await
            .wrap_err("listing conversations")?;
        for key in stored {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        for key in &keys {
            self.store
                .remove(key)
                .await
                .wrap_err(format!("removing {}", key))?;
        }

        for key in [
            ACTIVE_CONVERSATION_KEY,
            RECENT_CONVERSATIONS_KEY,
            CHAT_PREFERENCES_KEY,
        ] {
            self.store
                .remove(key)
                .await
                .wrap_err(format!("removing {}", key))?;
        }
        log::debug!("Cleared {} conversations", keys.len());
        Ok(())
    }

    async fn write_recent_conversations(&self, recent: &[String]) -> Result<()> {
        let value = serde_json::to_string(recent).wrap_err("serializing recent conversations")?;
        self.store
            .set(RECENT_CONVERSATIONS_KEY, &value)
            .await
            .wrap_err("writing recent conversations")
    }
}
