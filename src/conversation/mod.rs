pub mod manager;

pub use manager::{ArcConversations, ConversationStateManager, conversation_key};
