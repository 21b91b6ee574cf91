use super::constants::*;

pub(crate) fn user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

pub(crate) fn chat_endpoint() -> String {
    CHAT_ENDPOINT.to_string()
}

pub(crate) fn session_endpoint() -> String {
    SESSION_ENDPOINT.to_string()
}

pub(crate) fn token_key() -> String {
    AUTH_TOKEN_KEY.to_string()
}

pub(crate) fn log_level() -> Option<String> {
    Some("info".to_string())
}

pub(crate) fn log_file_path() -> String {
    LOG_FILE_PATH.to_string()
}

pub(crate) fn store_file_path() -> Option<String> {
    Some(STORE_FILE_PATH.to_string())
}
