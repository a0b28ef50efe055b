use crate::{Config, WeatherPayload, provider::visualcrossing::VisualCrossingProvider};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::{fmt::Debug, sync::Arc};

pub mod visualcrossing;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("weather service responded with status {0}")]
    UpstreamFailure(u16),

    /// Built with the request URL stripped, since it carries the API key.
    #[error("failed to reach weather service: {0}")]
    Transport(reqwest::Error),

    #[error("failed to decode weather service response: {0}")]
    Decode(String),

    #[error("invalid weather service URL: {0}")]
    InvalidUrl(String),
}

/// Source of weather data for the two lookups the model can request.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// One [`DailyWeatherRecord`](crate::DailyWeatherRecord) per day of the inclusive range.
    async fn fetch_range_days(
        &self,
        location: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<WeatherPayload, ProviderError>;

    /// Hour-by-hour records for a single day.
    async fn fetch_today_hours(
        &self,
        location: &str,
        start_date: NaiveDate,
    ) -> Result<WeatherPayload, ProviderError>;
}

/// Construct the weather provider from config, sharing the given HTTP client.
pub fn provider_from_config(
    config: &Config,
    http: Client,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let api_key = config.weather_api_key()?;

    Ok(Arc::new(VisualCrossingProvider::new(http, &config.weather, api_key)))
}
