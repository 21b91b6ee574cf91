use std::time;

use serde::{Deserialize, Serialize};

use super::constants::{
    AUTH_TOKEN_KEY, CHAT_ENDPOINT, DEFAULT_USER_ID, LOG_FILE_PATH, SESSION_ENDPOINT,
    STORE_FILE_PATH,
};
use super::defaults::*;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Configuration {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GeneralConfig {
    #[serde(default)]
    pub verbose: bool,

    #[serde(default = "user_id")]
    pub user_id: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogConfig {
    #[serde(default = "log_level")]
    pub level: Option<String>,

    #[serde(default)]
    pub filters: Option<Vec<LogFilter>>,

    #[serde(default)]
    pub file: LogFile,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFilter {
    #[serde(default)]
    pub module: Option<String>,

    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFile {
    /// An empty path sends the log to stderr
    #[serde(default = "log_file_path")]
    pub path: String,

    #[serde(default)]
    pub append: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub enum StorageConfig {
    #[serde(rename = "memory")]
    Memory,

    #[serde(rename = "sqlite")]
    Sqlite(SqliteStorage),
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SqliteStorage {
    /// `None` keeps the database in memory
    #[serde(default = "store_file_path")]
    pub path: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChatConfig {
    #[serde(default = "chat_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub timeout_secs: Option<u16>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AuthConfig {
    #[serde(default = "session_endpoint")]
    pub session_endpoint: String,

    #[serde(default = "token_key")]
    pub token_key: String,

    #[serde(default)]
    pub timeout_secs: Option<u16>,
}

impl ChatConfig {
    pub fn timeout(&self) -> Option<time::Duration> {
        self.timeout_secs
            .map(|secs| time::Duration::from_secs(secs as u64))
    }
}

impl AuthConfig {
    pub fn timeout(&self) -> Option<time::Duration> {
        self.timeout_secs
            .map(|secs| time::Duration::from_secs(secs as u64))
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            log: LogConfig::default(),
            storage: StorageConfig::default(),
            chat: ChatConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            user_id: DEFAULT_USER_ID.to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Some("info".to_string()),
            file: LogFile::default(),
            filters: None,
        }
    }
}

impl Default for LogFile {
    fn default() -> Self {
        Self {
            path: LOG_FILE_PATH.to_string(),
            append: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Sqlite(SqliteStorage::default())
    }
}

impl Default for SqliteStorage {
    fn default() -> Self {
        Self {
            path: Some(STORE_FILE_PATH.to_string()),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: CHAT_ENDPOINT.to_string(),
            timeout_secs: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_endpoint: SESSION_ENDPOINT.to_string(),
            token_key: AUTH_TOKEN_KEY.to_string(),
            timeout_secs: None,
        }
    }
}
