//! Turns a free-text question into one of the two weather lookups.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::{
    chat::{ChatClient, ChatError, ChatMessage, Conversation, ToolDeclaration},
    model::{Operation, ResolvedIntent},
};

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("the model answered without calling a weather lookup")]
    NoToolCall,

    #[error("the model called an unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("invalid lookup arguments: {0}")]
    BadArguments(String),

    #[error(transparent)]
    Upstream(#[from] ChatError),
}

/// Declarations of the two lookups, in the order they are offered to the model.
pub fn weather_tools() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: Operation::RangeDays.as_str().to_string(),
            description: "Get the daily weather for a location over a range of dates. \
                          Use this when the user asks about several days or a date span."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City or place name, e.g. Paris or Tokyo"
                    },
                    "start_date": {
                        "type": "string",
                        "description": "First day of the range, formatted YYYY-MM-DD"
                    },
                    "end_date": {
                        "type": "string",
                        "description": "Last day of the range (inclusive), formatted YYYY-MM-DD"
                    }
                },
                "required": ["location", "start_date", "end_date"]
            }),
        },
        ToolDeclaration {
            name: Operation::TodayHours.as_str().to_string(),
            description: "Get the hour-by-hour weather for a location on a single day."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City or place name, e.g. Paris or Tokyo"
                    },
                    "start_date": {
                        "type": "string",
                        "description": "The day to look up, formatted YYYY-MM-DD"
                    }
                },
                "required": ["location", "start_date"]
            }),
        },
    ]
}

fn system_prompt(now: NaiveDateTime) -> String {
    format!(
        "You are an assistant that extracts weather lookups from questions and summarizes \
         weather data. Never answer with markdown formatting. The current local time is {}. \
         Resolve relative dates such as today, tomorrow or this weekend against it.",
        now.format("%Y-%m-%d %H:%M (%A)")
    )
}

#[derive(Debug, Deserialize)]
struct LookupArguments {
    location: String,
    start_date: String,
    #[serde(default)]
    end_date: Option<String>,
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ResolutionError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ResolutionError::BadArguments(format!("{field} '{value}' is not a YYYY-MM-DD date"))
    })
}

/// Validate raw tool-call output into a [`ResolvedIntent`].
pub fn parse_intent(name: &str, arguments: &str) -> Result<ResolvedIntent, ResolutionError> {
    let operation = Operation::try_from(name).map_err(ResolutionError::UnknownOperation)?;

    let args: LookupArguments = serde_json::from_str(arguments)
        .map_err(|e| ResolutionError::BadArguments(e.to_string()))?;

    let location = args.location.trim();
    if location.is_empty() {
        return Err(ResolutionError::BadArguments("location is empty".to_string()));
    }

    let start_date = parse_date("start_date", &args.start_date)?;

    let end_date = match operation {
        Operation::RangeDays => {
            let raw = args.end_date.as_deref().ok_or_else(|| {
                ResolutionError::BadArguments("end_date is required for a date range".to_string())
            })?;
            Some(parse_date("end_date", raw)?)
        }
        Operation::TodayHours => None,
    };

    Ok(ResolvedIntent { operation, location: location.to_string(), start_date, end_date })
}

/// Asks the chat service which lookup answers the user's question.
#[derive(Clone)]
pub struct IntentResolver {
    chat: Arc<dyn ChatClient>,
    tools: Arc<[ToolDeclaration]>,
}

impl IntentResolver {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat, tools: weather_tools().into() }
    }

    /// Resolve `user_query` and return the conversation so far, ending with the
    /// model's reply.
    ///
    /// Only the first tool call of the reply is honored.
    pub async fn resolve(
        &self,
        user_query: &str,
        now: NaiveDateTime,
    ) -> Result<(ResolvedIntent, Conversation), ResolutionError> {
        let mut conversation = Conversation::new();
        conversation.push(ChatMessage::system(system_prompt(now)));
        conversation.push(ChatMessage::user(user_query));

        let reply = self.chat.complete(conversation.messages(), &self.tools).await?;

        let ChatMessage::Assistant { content, mut tool_calls } = reply else {
            return Err(ResolutionError::NoToolCall);
        };
        if tool_calls.len() > 1 {
            warn!(ignored = tool_calls.len() - 1, "Model requested several lookups; using the first");
            // Every call kept in the history must be answered by a tool message.
            tool_calls.truncate(1);
        }

        let call = tool_calls.first().ok_or(ResolutionError::NoToolCall)?;
        let intent = parse_intent(&call.function.name, &call.function.arguments)?;
        debug!(?intent, tool_call_id = %call.id, "Resolved lookup");

        conversation.push(ChatMessage::Assistant { content, tool_calls });

        Ok((intent, conversation))
    }
}
