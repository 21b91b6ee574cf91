#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

/// Transcript of a single conversation as persisted in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    conversation_id: String,
    messages: Vec<ChatMessage>,
    is_active: bool,
    last_active: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: vec![],
            is_active: false,
            last_active: Utc::now(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn with_last_active(mut self, timestamp: DateTime<Utc>) -> Self {
        self.last_active = timestamp;
        self
    }

    /// Append at the end of the transcript and bump `last_active`.
    pub fn append_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.last_active = Utc::now();
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
