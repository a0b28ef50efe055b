use std::sync::Arc;

use futures::{StreamExt, future};
use tracing::debug;

use crate::chat::{ChatClient, ChatError, ChatMessage, Conversation, TextStream};

const SUMMARY_INSTRUCTION: &str = "Summarize the weather data below in a few plain sentences \
for someone who will not read the numbers. Say whether the period suits a trip or outdoor \
plans, and whether to dress warmly, bring rain gear or protect against sun. Reply with a \
plain narrative only, no markdown, no lists, no code fences, and do not repeat the raw data. \
Weather data: ";

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("conversation has no tool call to answer")]
    MissingToolCall,

    #[error(transparent)]
    Upstream(#[from] ChatError),
}

/// Streams the model's narration of a weather payload.
#[derive(Clone)]
pub struct SummaryStreamer {
    chat: Arc<dyn ChatClient>,
}

impl SummaryStreamer {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }

    /// Answer the pending tool call with `weather_data`, the JSON-encoded
    /// payload, and stream the reply.
    ///
    /// The stream is single-pass; fragments without text are dropped.
    pub async fn stream(
        &self,
        mut conversation: Conversation,
        weather_data: &str,
    ) -> Result<TextStream, SummaryError> {
        let call_id =
            conversation.pending_tool_call().ok_or(SummaryError::MissingToolCall)?.id.clone();

        conversation
            .push(ChatMessage::tool(call_id, format!("{SUMMARY_INSTRUCTION}{weather_data}")));
        debug!(messages = conversation.len(), bytes = weather_data.len(), "Requesting summary");

        let deltas = self.chat.stream(conversation.messages()).await?;

        Ok(deltas
            .filter(|delta| future::ready(!matches!(delta, Ok(text) if text.is_empty())))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{FunctionCall, ToolCall, ToolDeclaration};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;

    struct EchoChat {
        deltas: Vec<&'static str>,
        sent: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatClient for EchoChat {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDeclaration],
        ) -> Result<ChatMessage, ChatError> {
            unimplemented!()
        }

        async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, ChatError> {
            *self.sent.lock().unwrap() = messages.to_vec();
            let items: Vec<Result<String, ChatError>> =
                self.deltas.iter().map(|d| Ok(d.to_string())).collect();
            Ok(stream::iter(items).boxed())
        }
    }

    fn resolved_conversation() -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push(ChatMessage::system("sys"));
        conversation.push(ChatMessage::user("Paris?"));
        conversation.push(ChatMessage::Assistant {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_7".into(),
                kind: "function".into(),
                function: FunctionCall {
                    name: "get_weather_today_hours".into(),
                    arguments: "{}".into(),
                },
            }],
        });
        conversation
    }

    #[tokio::test]
    async fn appends_tool_result_and_skips_empty_deltas() {
        let chat = Arc::new(EchoChat {
            deltas: vec!["", "Warm ", "", "and sunny."],
            sent: Mutex::new(Vec::new()),
        });
        let streamer = SummaryStreamer::new(chat.clone());

        let chunks: Vec<String> = streamer
            .stream(resolved_conversation(), "[]")
            .await
            .expect("stream")
            .map(|c| c.expect("chunk"))
            .collect()
            .await;

        assert_eq!(chunks, vec!["Warm ", "and sunny."]);

        let sent = chat.sent.lock().unwrap();
        assert_eq!(sent.len(), 4);
        match &sent[3] {
            ChatMessage::Tool { tool_call_id, content } => {
                assert_eq!(tool_call_id, "call_7");
                assert!(content.starts_with(SUMMARY_INSTRUCTION));
                assert!(content.ends_with("[]"));
            }
            other => panic!("expected tool message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn conversation_without_tool_call_is_rejected() {
        let chat = Arc::new(EchoChat { deltas: vec![], sent: Mutex::new(Vec::new()) });
        let mut conversation = Conversation::new();
        conversation.push(ChatMessage::user("hi"));

        let result = SummaryStreamer::new(chat).stream(conversation, "[]").await;
        assert!(matches!(result, Err(SummaryError::MissingToolCall)));
    }
}
