#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use std::fmt::Display;

use chrono::{DateTime, Utc};
use eyre::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// Client-local delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    id: String,
    content: String,
    sender: Sender,
    timestamp: DateTime<Utc>,
    conversation_id: String,
    status: MessageStatus,
}

impl ChatMessage {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
            conversation_id: String::new(),
            status: match sender {
                Sender::User => MessageStatus::Sending,
                Sender::Assistant => MessageStatus::Delivered,
            },
        }
    }

    /// A message typed by the user, waiting to be sent.
    pub fn new_user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Sender::User, content).with_conversation_id(conversation_id)
    }

    /// A reply received from the assistant.
    pub fn new_assistant(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, content).with_conversation_id(conversation_id)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    pub fn set_conversation_id(&mut self, conversation_id: impl Into<String>) {
        self.conversation_id = conversation_id.into();
    }

    /// Move the message to `next`. Only a message that is still sending may
    /// change status; terminal messages are left untouched.
    pub fn transition(&mut self, next: MessageStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            bail!(
                "invalid status transition for message {}: {} -> {}",
                self.id,
                self.status,
                next
            );
        }
        self.status = next;
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }
}

impl MessageStatus {
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Sending, MessageStatus::Sent)
                | (MessageStatus::Sending, MessageStatus::Error)
        )
    }
}

impl Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

impl Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}
