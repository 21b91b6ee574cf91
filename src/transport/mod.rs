pub mod chat_api;
pub mod error;

pub use chat_api::{ChatApi, ChatReply, ToolCall};
pub use error::ChatApiError;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::ConversationState;

/// Remote chat endpoint as seen by the chat session.
#[async_trait]
pub trait ChatTransport {
    /// Send one user message. `conversation_id` is `None` for the first
    /// message of a conversation; the server assigns the id.
    async fn send_message(
        &self,
        user_id: &str,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatReply, ChatApiError>;

    async fn get_conversation_history(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationState, ChatApiError>;
}

pub type ArcTransport = Arc<dyn ChatTransport + Send + Sync>;
