pub mod conversation;
pub mod message;
pub mod preferences;

pub use conversation::ConversationState;
pub use message::{ChatMessage, MessageStatus, Sender};
pub use preferences::ChatPreferences;
