//! Core library of the weather chat service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The chat-completion client used for tool calling and streamed summaries
//! - The weather data provider
//! - The pipeline that turns a question into an ordered stream of events
//!
//! It is used by `weather-chat-server`, but carries no HTTP server code itself.

pub mod chat;
pub mod composer;
pub mod config;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod summary;

pub use chat::{ChatClient, ChatError, Conversation, OpenAiChatClient, chat_client_from_config};
pub use composer::{
    AuthorizationError, ComposeError, EventStream, ResponseComposer, StreamInterrupted,
};
pub use config::Config;
pub use model::{
    DailyWeatherRecord, HourlyWeatherRecord, Operation, ResolvedIntent, StreamEvent, Temperature,
    WeatherPayload, WeatherQuery,
};
pub use provider::{ProviderError, WeatherProvider, provider_from_config};
pub use resolver::{IntentResolver, ResolutionError};
pub use summary::{SummaryError, SummaryStreamer};

/// Shorten an upstream response body for logs and error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
