#[cfg(test)]
#[path = "command_test.rs"]
mod tests;

use clap::{Parser, Subcommand};
use eyre::{Context, Result};

use crate::config::{self, Configuration, load_configuration, lookup_config_path};

#[derive(Debug, Parser)]
#[command(
    version,
    about,
    long_about = r#"A terminal client for the task assistant chat

Default configuration file location looks up in the following order:
    * $XDG_CONFIG_HOME/taskchat/config.toml
    * $HOME/.config/taskchat/config.toml
    * $HOME/.taskchat.toml
"#,
    disable_version_flag = true
)]
pub struct Command {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Show the version
    #[arg(short, long)]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Commands {
    /// Send one message in the active conversation and print the reply
    Send {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Chat interactively. `/new` starts a new conversation, `/quit` exits
    Chat,

    /// Create an empty conversation and make it active
    New,

    /// List recent conversations
    List,

    /// Print a conversation transcript, the active one by default
    Show { id: Option<String> },

    /// Make a conversation active
    Use { id: String },

    /// Delete one conversation
    Clear { id: String },

    /// Delete every conversation and reset preferences
    ClearAll,

    /// Show or update chat preferences
    Prefs {
        #[arg(long)]
        theme: Option<String>,

        #[arg(long, value_name = "BOOL")]
        notifications: Option<bool>,
    },

    /// Store an auth token obtained elsewhere
    Login { token: String },

    /// Drop the cached auth token
    Logout,

    /// Show whether requests will be authenticated
    Whoami,

    /// Replace a local transcript with the server's copy
    Sync { id: Option<String> },
}

impl Command {
    pub fn new() -> Command {
        Self::parse()
    }

    pub fn get_config(&self) -> Result<Configuration> {
        let config_path = self
            .config
            .clone()
            .unwrap_or_else(|| lookup_config_path().unwrap_or_default());

        if config_path.is_empty() {
            // No config path is specified just use the default config
            return Ok(Configuration::default());
        }
        load_configuration(config_path.as_str()).wrap_err("loading configuration")
    }

    /// The subcommand to run; a bare invocation starts an interactive chat.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Chat)
    }

    pub fn version(&self) -> bool {
        self.version
    }

    pub fn print_version(&self) {
        println!("{}", config::version())
    }
}
