/// Max number of conversation ids kept in the recency list
pub const MAX_RECENT_CONVERSATIONS: usize = 10;

pub const ACTIVE_CONVERSATION_KEY: &str = "active_conversation_id";

pub const RECENT_CONVERSATIONS_KEY: &str = "recent_conversations";

pub const CHAT_PREFERENCES_KEY: &str = "chat_preferences";

pub const CONVERSATION_KEY_PREFIX: &str = "conversation_";

/// Single storage key for the cached bearer credential
pub const AUTH_TOKEN_KEY: &str = "auth_token";

pub const DEFAULT_THEME: &str = "dark";

pub const DEFAULT_USER_ID: &str = "guest";

pub const CHAT_ENDPOINT: &str = "http://localhost:8000";

pub const SESSION_ENDPOINT: &str = "http://localhost:3000/api/auth/session";

pub const LOG_FILE_PATH: &str = "/tmp/taskchat.log";

pub const STORE_FILE_PATH: &str = "${HOME}/.local/share/taskchat/store.db";
