#[cfg(test)]
#[path = "handlers_test.rs"]
mod tests;

use std::io::Write;
use std::sync::Arc;

use chrono::Local;
use eyre::{Context as _, Result, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::auth::{ArcTokenCache, TokenCache};
use crate::chat::ChatSession;
use crate::cli::Commands;
use crate::config::Configuration;
use crate::conversation::{ArcConversations, ConversationStateManager};
use crate::models::{ChatMessage, MessageStatus};
use crate::storage::new_store;
use crate::transport::{ArcTransport, ChatApi, ChatApiError};

/// Everything a command needs, built once from the configuration.
pub struct Context {
    pub user_id: String,
    pub conversations: ArcConversations,
    pub auth: ArcTokenCache,
    pub transport: ArcTransport,
}

impl Context {
    pub async fn from_config(config: &Configuration) -> Result<Self> {
        let store = new_store(&config.storage)
            .await
            .wrap_err("initializing store")?;
        let auth = Arc::new(TokenCache::new(store.clone())?.from_config(&config.auth));
        let transport: ArcTransport =
            Arc::new(ChatApi::new(auth.clone()).from_config(&config.chat));

        Ok(Self {
            user_id: config.general.user_id.clone(),
            conversations: Arc::new(ConversationStateManager::new(store)),
            auth,
            transport,
        })
    }

    fn session(&self) -> ChatSession {
        ChatSession::new(
            &self.user_id,
            self.transport.clone(),
            self.conversations.clone(),
        )
    }
}

/// Text for the user: the friendly transport message when there is one,
/// otherwise the whole error chain.
pub fn describe_error(err: &eyre::Report) -> String {
    match err.downcast_ref::<ChatApiError>() {
        Some(api_err) => api_err.user_message(),
        None => format!("{:#}", err),
    }
}

/// Run `command`. `input` is only read by the interactive chat.
pub async fn run<R, W>(command: Commands, ctx: &Context, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    match command {
        Commands::Send { message } => send(ctx, &message.join(" "), out).await,
        Commands::Chat => chat(ctx, input, out).await,
        Commands::New => {
            let state = ctx.conversations.create_new_conversation().await?;
            ctx.conversations
                .set_active_conversation_id(state.conversation_id())
                .await?;
            writeln!(out, "{}", state.conversation_id())?;
            Ok(())
        }
        Commands::List => list(ctx, out).await,
        Commands::Show { id } => show(ctx, id, out).await,
        Commands::Use { id } => {
            if ctx.conversations.load_conversation_state(&id).await?.is_none() {
                bail!("conversation {} not found", id);
            }
            ctx.conversations.set_active_conversation_id(&id).await?;
            writeln!(out, "Switched to conversation {}", id)?;
            Ok(())
        }
        Commands::Clear { id } => {
            ctx.conversations.clear_conversation(&id).await?;
            writeln!(out, "Cleared conversation {}", id)?;
            Ok(())
        }
        Commands::ClearAll => {
            ctx.conversations.clear_all_conversations().await?;
            writeln!(out, "Cleared all conversations")?;
            Ok(())
        }
        Commands::Prefs {
            theme,
            notifications,
        } => prefs(ctx, theme, notifications, out).await,
        Commands::Login { token } => {
            ctx.auth.set_token(token.trim()).await?;
            writeln!(out, "Logged in")?;
            Ok(())
        }
        Commands::Logout => {
            ctx.auth.clear_token().await;
            writeln!(out, "Logged out")?;
            Ok(())
        }
        Commands::Whoami => {
            if ctx.auth.is_authenticated().await {
                writeln!(out, "Authenticated as {}", ctx.user_id)?;
            } else {
                writeln!(out, "Not logged in")?;
            }
            Ok(())
        }
        Commands::Sync { id } => sync(ctx, id, out).await,
    }
}

async fn send<W: Write>(ctx: &Context, text: &str, out: &mut W) -> Result<()> {
    let mut session = ctx.session().resume().await?;
    let outcome = session.send(text).await?;

    writeln!(out, "{}", outcome.reply.content())?;
    if outcome.tasks_changed {
        writeln!(out, "(task list updated)")?;
    }
    Ok(())
}

async fn chat<R, W>(ctx: &Context, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut session = ctx.session().resume().await?;
    if let Some(id) = session.conversation_id() {
        writeln!(out, "Continuing conversation {}", id)?;
        for message in session.messages() {
            print_message(message, out)?;
        }
    }

    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await.wrap_err("reading input")? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                session.start_new_conversation();
                writeln!(out, "Started a new conversation")?;
            }
            text => match session.send(text).await {
                Ok(outcome) => {
                    print_message(&outcome.reply, out)?;
                    if outcome.tasks_changed {
                        writeln!(out, "(task list updated)")?;
                    }
                }
                Err(err) => writeln!(out, "Error: {}", describe_error(&err))?,
            },
        }
    }
    Ok(())
}

async fn list<W: Write>(ctx: &Context, out: &mut W) -> Result<()> {
    let states = ctx.conversations.recent_conversation_states().await?;
    if states.is_empty() {
        writeln!(out, "No conversations")?;
        return Ok(());
    }

    let active = ctx.conversations.get_active_conversation_id().await?;
    for state in states {
        let marker = if active.as_deref() == Some(state.conversation_id()) {
            "*"
        } else {
            " "
        };
        writeln!(
            out,
            "{} {}  {}  {} messages",
            marker,
            state.conversation_id(),
            state
                .last_active()
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M"),
            state.len()
        )?;
    }
    Ok(())
}

async fn show<W: Write>(ctx: &Context, id: Option<String>, out: &mut W) -> Result<()> {
    let id = match id {
        Some(id) => id,
        None => match ctx.conversations.get_active_conversation_id().await? {
            Some(id) => id,
            None => bail!("no active conversation"),
        },
    };

    let Some(state) = ctx.conversations.load_conversation_state(&id).await? else {
        bail!("conversation {} not found", id);
    };
    for message in state.messages() {
        print_message(message, out)?;
    }
    Ok(())
}

async fn prefs<W: Write>(
    ctx: &Context,
    theme: Option<String>,
    notifications: Option<bool>,
    out: &mut W,
) -> Result<()> {
    let mut preferences = ctx.conversations.get_chat_preferences().await?;
    if theme.is_some() || notifications.is_some() {
        if let Some(theme) = theme {
            preferences.theme = theme;
        }
        if let Some(notifications) = notifications {
            preferences.notifications = notifications;
        }
        ctx.conversations
            .set_chat_preferences(&preferences)
            .await?;
    }

    writeln!(out, "theme: {}", preferences.theme)?;
    writeln!(
        out,
        "notifications: {}",
        if preferences.notifications { "on" } else { "off" }
    )?;
    Ok(())
}

async fn sync<W: Write>(ctx: &Context, id: Option<String>, out: &mut W) -> Result<()> {
    let session = ctx.session();
    let mut session = match id {
        Some(id) => session.open(&id).await?,
        None => session.resume().await?,
    };

    let count = session.sync_history().await?;
    writeln!(
        out,
        "Synced {} messages for conversation {}",
        count,
        session.conversation_id().unwrap_or_default()
    )?;
    Ok(())
}

fn print_message<W: Write>(message: &ChatMessage, out: &mut W) -> Result<()> {
    let failed = if message.status() == MessageStatus::Error {
        " (not sent)"
    } else {
        ""
    };
    writeln!(
        out,
        "[{}] {}: {}{}",
        message.timestamp().with_timezone(&Local).format("%H:%M"),
        message.sender(),
        message.content(),
        failed
    )?;
    Ok(())
}
