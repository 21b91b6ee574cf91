use serde::{Deserialize, Serialize};

use crate::config::constants::DEFAULT_THEME;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPreferences {
    pub theme: String,
    pub notifications: bool,
}

impl Default for ChatPreferences {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
            notifications: true,
        }
    }
}
