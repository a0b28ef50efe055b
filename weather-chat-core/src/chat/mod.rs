//! Boundary to the chat-completion service.
//!
//! Messages and tool declarations use the OpenAI wire shape, which DeepSeek and
//! most hosted models accept. [`ChatClient`] is the seam the resolver and the
//! summary streamer talk through, so tests can swap in a scripted fake.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Config;

pub mod openai;

pub use openai::OpenAiChatClient;

/// Incremental text deltas from a streamed completion, in upstream order.
pub type TextStream = BoxStream<'static, Result<String, ChatError>>;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("failed to reach chat service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode chat service response: {0}")]
    Decode(String),

    #[error("chat stream failed: {0}")]
    Stream(String),

    #[error("chat service returned no choices")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User { content: content.into() }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Tool { tool_call_id: tool_call_id.into(), content: content.into() }
    }

    /// Tool calls requested by an assistant message; empty for every other role.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            ChatMessage::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

/// A callable operation advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl Serialize for ToolDeclaration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
        .serialize(serializer)
    }
}

/// Message transcript of a single request. Append-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// First tool call of the most recent assistant message, if any.
    pub fn pending_tool_call(&self) -> Option<&ToolCall> {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m, ChatMessage::Assistant { .. }))
            .and_then(|m| m.tool_calls().first())
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One non-streaming completion, offering `tools` to the model.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDeclaration],
    ) -> Result<ChatMessage, ChatError>;

    /// Streamed completion without tools. The returned stream owns its connection.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, ChatError>;
}

/// Construct the chat client from config, sharing the given HTTP client.
pub fn chat_client_from_config(
    config: &Config,
    http: Client,
) -> anyhow::Result<Arc<dyn ChatClient>> {
    let api_key = config.chat_api_key()?;

    Ok(Arc::new(OpenAiChatClient::new(http, &config.chat, api_key)))
}
