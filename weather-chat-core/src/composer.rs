//! Request pipeline: authorize, resolve, fetch, then stream events.
//!
//! Everything up to the weather fetch happens before the caller sees a byte,
//! so those failures come back as [`ComposeError`]. After that the composer
//! hands out an [`EventStream`]; errors inside it can only cut the stream
//! short, and the missing `finish` event tells the caller the transcript is
//! incomplete.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use futures::{StreamExt, stream::BoxStream};
use reqwest::Client;
use tracing::{info, warn};

use crate::{
    Config,
    chat::{ChatClient, ChatError, chat_client_from_config},
    model::{Operation, ResolvedIntent, StreamEvent, WeatherPayload, WeatherQuery},
    provider::{WeatherProvider, provider_from_config},
    resolver::{IntentResolver, ResolutionError},
    summary::{SummaryError, SummaryStreamer},
};

/// Events of one response, in wire order.
pub type EventStream = BoxStream<'static, Result<StreamEvent, StreamInterrupted>>;

#[derive(Debug, thiserror::Error)]
#[error("invalid token")]
pub struct AuthorizationError;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    #[error("user_query must not be empty")]
    EmptyQuery,

    #[error("could not resolve the question: {0}")]
    Resolution(#[from] ResolutionError),
}

/// Why an already started response stream ended without `finish`.
#[derive(Debug, thiserror::Error)]
pub enum StreamInterrupted {
    #[error("summary could not start: {0}")]
    Summary(#[from] SummaryError),

    #[error("summary stream broke off: {0}")]
    Upstream(#[from] ChatError),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct ResponseComposer {
    access_token: String,
    resolver: IntentResolver,
    provider: Arc<dyn WeatherProvider>,
    summary: SummaryStreamer,
}

impl ResponseComposer {
    pub fn new(
        access_token: impl Into<String>,
        chat: Arc<dyn ChatClient>,
        provider: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            resolver: IntentResolver::new(chat.clone()),
            provider,
            summary: SummaryStreamer::new(chat),
        }
    }

    /// Wire up the production clients, all sharing one outbound `http` client.
    pub fn from_config(config: &Config, http: Client) -> anyhow::Result<Self> {
        let access_token = config.access_token()?;
        let chat = chat_client_from_config(config, http.clone())?;
        let provider = provider_from_config(config, http)?;

        Ok(Self::new(access_token, chat, provider))
    }

    pub fn authorize(&self, token: &str) -> Result<(), AuthorizationError> {
        if token == self.access_token { Ok(()) } else { Err(AuthorizationError) }
    }

    pub async fn compose(&self, query: WeatherQuery) -> Result<EventStream, ComposeError> {
        self.compose_at(query, Local::now().naive_local()).await
    }

    /// Same as [`compose`](Self::compose) with an explicit "now" for the model's date reasoning.
    pub async fn compose_at(
        &self,
        query: WeatherQuery,
        now: NaiveDateTime,
    ) -> Result<EventStream, ComposeError> {
        if let Err(e) = self.authorize(&query.token) {
            warn!("Rejected request with invalid token");
            return Err(e.into());
        }

        if query.user_query.trim().is_empty() {
            return Err(ComposeError::EmptyQuery);
        }

        info!(query = %query.user_query, "Resolving");
        let (intent, conversation) = self
            .resolver
            .resolve(&query.user_query, now)
            .await
            .inspect_err(|e| warn!(error = %e, "Resolution failed"))?;

        info!(
            operation = %intent.operation,
            location = %intent.location,
            start_date = %intent.start_date,
            end_date = ?intent.end_date,
            "Dispatching"
        );
        let payload = self.dispatch(&intent).await;

        let summary = self.summary.clone();
        let events = async_stream::stream! {
            // Encoded up front so the payload itself can move into the first event.
            let weather_data = match serde_json::to_string(&payload) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "Weather data could not be encoded");
                    yield Err(StreamInterrupted::from(e));
                    return;
                }
            };

            info!(records = payload.len(), "WeatherSent");
            yield Ok(StreamEvent::WeatherData(payload));

            info!("Summarizing");
            let mut chunks = match summary.stream(conversation, &weather_data).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(error = %e, "Summary could not start");
                    yield Err(StreamInterrupted::from(e));
                    return;
                }
            };

            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(text) => yield Ok(StreamEvent::AnalysisChunk(text)),
                    Err(e) => {
                        warn!(error = %e, "Summary stream interrupted");
                        yield Err(StreamInterrupted::from(e));
                        return;
                    }
                }
            }

            info!("Finished");
            yield Ok(StreamEvent::Finish(true));
        };

        Ok(events.boxed())
    }

    /// Run the lookup for `intent`. Provider failures degrade to an empty payload
    /// so the summary step still runs.
    async fn dispatch(&self, intent: &ResolvedIntent) -> WeatherPayload {
        let result = match (intent.operation, intent.end_date) {
            (Operation::RangeDays, Some(end_date)) => {
                self.provider.fetch_range_days(&intent.location, intent.start_date, end_date).await
            }
            _ => self.provider.fetch_today_hours(&intent.location, intent.start_date).await,
        };

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Weather lookup failed; continuing with empty data");
            WeatherPayload::Empty
        })
    }
}
