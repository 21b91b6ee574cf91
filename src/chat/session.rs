#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use eyre::{Context, Result, bail};

use crate::conversation::ArcConversations;
use crate::models::{ChatMessage, MessageStatus, Sender};
use crate::transport::ArcTransport;

/// Words in an assistant reply that mean the task list was modified.
const TASK_CHANGE_MARKERS: [&str; 2] = ["added", "created"];

/// Result of one successful exchange.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub conversation_id: String,
    pub reply: ChatMessage,
    /// The reply reports a task change; task views should refresh.
    pub tasks_changed: bool,
}

/// One user's conversation with the assistant: the transcript on screen,
/// the conversation it belongs to, and the plumbing to extend it.
pub struct ChatSession {
    user_id: String,
    transport: ArcTransport,
    conversations: ArcConversations,
    conversation_id: Option<String>,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(
        user_id: impl Into<String>,
        transport: ArcTransport,
        conversations: ArcConversations,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            transport,
            conversations,
            conversation_id: None,
            messages: vec![],
        }
    }

    /// Pick up the active conversation, if any, with its stored messages.
    pub async fn resume(self) -> Result<Self> {
        match self.conversations.get_active_conversation_id().await? {
            Some(id) => self.open(&id).await,
            None => Ok(self),
        }
    }

    /// Continue `conversation_id` with its stored messages. The active
    /// pointer is left alone until a message is sent.
    pub async fn open(mut self, conversation_id: &str) -> Result<Self> {
        self.messages = self
            .conversations
            .get_conversation_messages(conversation_id)
            .await?;
        log::debug!(
            "Opened conversation {} with {} messages",
            conversation_id,
            self.messages.len()
        );
        self.conversation_id = Some(conversation_id.to_string());
        Ok(self)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Send `text` and wait for the reply. The user message stays in the
    /// transcript either way; on failure it is marked as errored and the
    /// transport error is returned inside the report.
    pub async fn send(&mut self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            bail!("message is empty");
        }

        let remote_id = self.remote_conversation_id().map(str::to_string);
        let mut message = ChatMessage::new(Sender::User, text);
        if let Some(id) = &self.conversation_id {
            message.set_conversation_id(id);
        }
        self.messages.push(message.clone());
        let index = self.messages.len() - 1;

        let reply = match self
            .transport
            .send_message(&self.user_id, text, remote_id.as_deref())
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                log::error!("Sending chat message failed: {}", err);
                self.messages[index].transition(MessageStatus::Error)?;
                return Err(err.into());
            }
        };

        let conversation_id = reply.conversation_id;
        message.transition(MessageStatus::Sent)?;
        self.messages[index] = message.clone();
        for earlier in self.messages.iter_mut() {
            earlier.set_conversation_id(&conversation_id);
        }
        message.set_conversation_id(&conversation_id);
        self.messages.push(reply.message.clone());

        if remote_id.is_none() {
            if let Some(local_id) = &self.conversation_id {
                self.conversations
                    .rekey_conversation(local_id, &conversation_id)
                    .await
                    .wrap_err("adopting server conversation id")?;
            }
        }
        self.conversations
            .set_active_conversation_id(&conversation_id)
            .await?;
        self.conversations
            .ensure_conversation(&conversation_id)
            .await?;
        self.conversations
            .add_message_to_conversation(&conversation_id, message)
            .await
            .wrap_err("saving user message")?;
        self.conversations
            .add_message_to_conversation(&conversation_id, reply.message.clone())
            .await
            .wrap_err("saving assistant message")?;

        if !reply.tool_calls.is_empty() {
            log::debug!(
                "Assistant called tools: {}",
                reply
                    .tool_calls
                    .iter()
                    .map(|call| call.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        self.conversation_id = Some(conversation_id.clone());
        Ok(SendOutcome {
            conversation_id,
            tasks_changed: mentions_task_change(reply.message.content()),
            reply: reply.message,
        })
    }

    /// The id to send to the server: only conversations the server has
    /// answered in. A conversation created locally has no such message yet,
    /// so the server is asked to open a new one.
    fn remote_conversation_id(&self) -> Option<&str> {
        let confirmed = self
            .messages
            .iter()
            .any(|m| matches!(m.status(), MessageStatus::Sent | MessageStatus::Delivered));
        if confirmed {
            self.conversation_id.as_deref()
        } else {
            None
        }
    }

    /// Forget the current conversation; the next message starts a new one
    /// on the server.
    pub fn start_new_conversation(&mut self) {
        self.conversation_id = None;
        self.messages.clear();
    }

    /// Replace the local transcript of the current conversation with the
    /// server's copy. Returns the number of messages received.
    pub async fn sync_history(&mut self) -> Result<usize> {
        let Some(conversation_id) = self.conversation_id.clone() else {
            bail!("no active conversation to sync");
        };

        let state = self
            .transport
            .get_conversation_history(&self.user_id, &conversation_id)
            .await?;
        self.conversations
            .save_conversation_state(&conversation_id, &state)
            .await?;

        self.messages = state.into_messages();
        Ok(self.messages.len())
    }
}

fn mentions_task_change(reply: &str) -> bool {
    let reply = reply.to_lowercase();
    TASK_CHANGE_MARKERS
        .iter()
        .any(|marker| reply.contains(marker))
}
