use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatClient, ChatError, ChatMessage, TextStream, ToolCall, ToolDeclaration};
use crate::{config::ChatConfig, truncate_body};

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiChatClient {
    pub fn new(http: Client, config: &ChatConfig, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDeclaration],
    stream: bool,
}

fn no_tools(tools: &&[ToolDeclaration]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

impl ChunkResponse {
    fn into_text(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.delta.content)
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDeclaration],
    ) -> Result<ChatMessage, ChatError> {
        let url = self.endpoint();
        debug!(url = %url, model = %self.model, messages = messages.len(), tools = tools.len(), "Requesting chat completion");

        let res = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest { model: &self.model, messages, tools, stream: false })
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(ChatError::Status { status: status.as_u16(), body: truncate_body(&body) });
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(|e| ChatError::Decode(e.to_string()))?;

        let message = parsed.choices.into_iter().next().ok_or(ChatError::EmptyResponse)?.message;

        Ok(ChatMessage::Assistant {
            content: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
        })
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, ChatError> {
        let url = self.endpoint();
        debug!(url = %url, model = %self.model, messages = messages.len(), "Opening chat stream");

        let source = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest { model: &self.model, messages, tools: &[], stream: true })
            .eventsource()
            .map_err(|e| ChatError::Stream(e.to_string()))?;

        Ok(into_text_deltas(source))
    }
}

/// Turn server-sent completion chunks into text deltas.
///
/// The stream stops at `[DONE]`, at end of connection, or right after the
/// first error. `EventSource` would otherwise reconnect on its own.
fn into_text_deltas(mut source: EventSource) -> TextStream {
    Box::pin(async_stream::stream! {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) if message.data == "[DONE]" => {
                    debug!("Chat stream completed");
                    break;
                }
                Ok(Event::Message(message)) => {
                    match serde_json::from_str::<ChunkResponse>(&message.data) {
                        Ok(chunk) => {
                            if let Some(text) = chunk.into_text() {
                                yield Ok(text);
                            }
                        }
                        Err(e) => {
                            yield Err(ChatError::Decode(format!("{e}: {}", truncate_body(&message.data))));
                            break;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    yield Err(ChatError::Status { status: status.as_u16(), body: truncate_body(&body) });
                    break;
                }
                Err(error) => {
                    yield Err(ChatError::Stream(error.to_string()));
                    break;
                }
            }
        }
        source.close();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn client(base_url: &str) -> OpenAiChatClient {
        let config = ChatConfig { base_url: base_url.to_string(), ..ChatConfig::default() };
        OpenAiChatClient::new(Client::new(), &config, "test-key")
    }

    #[tokio::test]
    async fn complete_returns_assistant_message_with_tool_calls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "deepseek-chat",
                "stream": false,
                "tools": [{ "type": "function", "function": { "name": "lookup" } }]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": "",
                            "tool_calls": [{
                                "id": "call_0",
                                "type": "function",
                                "function": {
                                    "name": "get_weather_today_hours",
                                    "arguments": "{\"location\":\"Tokyo\",\"start_date\":\"2024-06-01\"}"
                                }
                            }]
                        }
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let tools = vec![ToolDeclaration {
            name: "lookup".into(),
            description: "test".into(),
            parameters: json!({ "type": "object" }),
        }];
        let reply = client(&server.url())
            .complete(&[ChatMessage::user("weather in Tokyo")], &tools)
            .await
            .expect("completion");

        mock.assert_async().await;
        let calls = reply.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].function.name, "get_weather_today_hours");
    }

    #[tokio::test]
    async fn complete_surfaces_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("{\"error\":\"bad key\"}")
            .create_async()
            .await;

        let err = client(&server.url())
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();

        match err {
            ChatError::Status { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_without_choices_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("{\"choices\":[]}")
            .create_async()
            .await;

        let err = client(&server.url()).complete(&[], &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyResponse));
    }

    #[tokio::test]
    async fn stream_yields_deltas_until_done() {
        let mut server = mockito::Server::new_async().await;
        let body = [
            r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Mild "}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"and dry."}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "data: [DONE]",
        ]
        .map(|line| format!("{line}\n\n"))
        .concat();

        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({ "stream": true })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let stream = client(&server.url())
            .stream(&[ChatMessage::user("summarize")])
            .await
            .expect("stream opens");
        let deltas: Vec<String> =
            stream.map(|item| item.expect("delta")).collect().await;

        mock.assert_async().await;
        assert_eq!(deltas, vec!["", "Mild ", "and dry."]);
    }

    #[tokio::test]
    async fn stream_reports_error_status_once() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let stream = client(&server.url()).stream(&[]).await.expect("stream opens");
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 1);
        match &items[0] {
            Err(ChatError::Status { status, .. }) => assert_eq!(*status, 500),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_chunk_ends_stream_with_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let body = [
            r#"data: {"choices":[{"delta":{"content":"Sunny "}}]}"#,
            "data: {not json",
            r#"data: {"choices":[{"delta":{"content":"never seen"}}]}"#,
            "data: [DONE]",
        ]
        .map(|line| format!("{line}\n\n"))
        .concat();

        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let stream = client(&server.url()).stream(&[]).await.expect("stream opens");
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(text) if text == "Sunny "));
        match &items[1] {
            Err(ChatError::Decode(message)) => assert!(message.contains("{not json")),
            other => panic!("unexpected item: {other:?}"),
        }
    }
}
