#[cfg(test)]
#[path = "chat_api_test.rs"]
mod tests;

use std::fmt::Display;
use std::time;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::ArcTokenCache;
use crate::config::ChatConfig;
use crate::config::constants::CHAT_ENDPOINT;
use crate::models::{ChatMessage, ConversationState, MessageStatus, Sender};
use crate::transport::error::{classify, is_json};
use crate::transport::{ChatApiError, ChatTransport};

/// Client for the task assistant chat endpoint. Every request goes through
/// the shared token cache.
pub struct ChatApi {
    endpoint: String,
    timeout: Option<time::Duration>,
    auth: ArcTokenCache,
}

/// A validated reply from the chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub conversation_id: String,
    pub message: ChatMessage,
    pub user_id: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Option<String>,
}

#[async_trait]
impl ChatTransport for ChatApi {
    async fn send_message(
        &self,
        user_id: &str,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatReply, ChatApiError> {
        let url = self.url(&["api", user_id, "chat"])?;
        let body = SendMessageRequest {
            message: message.to_string(),
            conversation_id: conversation_id.map(WireId::parse),
            user_id: user_id.to_string(),
        };

        log::debug!(
            "Sending chat message to {} (conversation: {:?})",
            url,
            conversation_id
        );

        let mut req = self.auth.request(Method::POST, url.as_str()).json(&body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let res = self.auth.make_authenticated_request(req).await?;
        let reply = read_json::<SendMessageResponse>(res).await?;
        reply.into_reply()
    }

    async fn get_conversation_history(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationState, ChatApiError> {
        let url = self.url(&["api", user_id, "chat", conversation_id])?;

        let mut req = self.auth.request(Method::GET, url.as_str());
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let res = self.auth.make_authenticated_request(req).await?;
        let history = read_json::<HistoryResponse>(res).await?;
        history.into_state()
    }
}

impl ChatApi {
    pub fn new(auth: ArcTokenCache) -> Self {
        Self {
            endpoint: CHAT_ENDPOINT.to_string(),
            timeout: None,
            auth,
        }
    }

    pub fn from_config(mut self, cfg: &ChatConfig) -> Self {
        self.endpoint = cfg.endpoint.clone();
        self.timeout = cfg.timeout();
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Append percent-encoded `segments` to the endpoint, which may or may
    /// not end with a slash.
    fn url(&self, segments: &[&str]) -> Result<Url, ChatApiError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|err| ChatApiError::InvalidEndpoint(format!("{}: {}", self.endpoint, err)))?;
        url.path_segments_mut()
            .map_err(|_| ChatApiError::InvalidEndpoint(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, ChatApiError> {
    let status = res.status();
    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = res.text().await?;

    if !status.is_success() || !is_json(content_type.as_deref()) {
        log::error!("Chat endpoint answered {}: {}", status, body);
        return Err(classify(status, content_type.as_deref(), &body));
    }

    serde_json::from_str::<T>(&body).map_err(|err| {
        log::error!("Unexpected chat response {}: {}", body, err);
        ChatApiError::InvalidResponse(err.to_string())
    })
}

/// Accepts RFC 3339 and offset-less ISO 8601 (read as UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ts| ts.and_utc())
}

fn timestamp_or_now(raw: Option<&str>) -> DateTime<Utc> {
    match raw {
        Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
            log::warn!("Unparseable timestamp {:?}, using current time", raw);
            Utc::now()
        }),
        None => Utc::now(),
    }
}

/// Conversation id as it travels on the wire. Servers backed by an integer
/// primary key send numbers; local ids are kept as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    fn parse(id: &str) -> Self {
        id.parse::<i64>()
            .map(WireId::Number)
            .unwrap_or_else(|_| WireId::Text(id.to_string()))
    }
}

impl Default for WireId {
    fn default() -> Self {
        WireId::Text(String::new())
    }
}

impl Display for WireId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireId::Number(id) => write!(f, "{}", id),
            WireId::Text(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct SendMessageRequest {
    message: String,
    conversation_id: Option<WireId>,
    user_id: String,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct SendMessageResponse {
    conversation_id: WireId,
    response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCallResponse>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct ToolCallResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: FunctionResponse,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct HistoryResponse {
    conversation_id: WireId,
    messages: Vec<HistoryMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    content: String,
    sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl SendMessageResponse {
    fn into_reply(self) -> Result<ChatReply, ChatApiError> {
        let conversation_id = self.conversation_id.to_string();
        if conversation_id.is_empty() {
            return Err(ChatApiError::InvalidResponse(
                "missing conversation_id".to_string(),
            ));
        }

        let mut message = ChatMessage::new_assistant(&conversation_id, self.response)
            .with_timestamp(timestamp_or_now(self.timestamp.as_deref()));
        if let Some(id) = self.message_id.filter(|id| !id.is_empty()) {
            message = message.with_id(id);
        }

        Ok(ChatReply {
            conversation_id,
            message,
            user_id: self.user_id,
            tool_calls: self
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
        })
    }
}

impl HistoryResponse {
    fn into_state(self) -> Result<ConversationState, ChatApiError> {
        let conversation_id = self.conversation_id.to_string();
        if conversation_id.is_empty() {
            return Err(ChatApiError::InvalidResponse(
                "missing conversation_id".to_string(),
            ));
        }

        let messages = self
            .messages
            .into_iter()
            .map(|msg| {
                let mut message = ChatMessage::new(msg.sender, msg.content)
                    .with_conversation_id(&conversation_id)
                    .with_timestamp(timestamp_or_now(msg.timestamp.as_deref()))
                    .with_status(MessageStatus::Delivered);
                if let Some(id) = msg.message_id.filter(|id| !id.is_empty()) {
                    message = message.with_id(id);
                }
                message
            })
            .collect::<Vec<_>>();

        let last_active = self
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| messages.last().map(|m| m.timestamp()))
            .unwrap_or_else(Utc::now);

        Ok(ConversationState::new(&conversation_id)
            .with_messages(messages)
            .with_last_active(last_active))
    }
}
