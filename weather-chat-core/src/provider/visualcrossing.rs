use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    config::WeatherConfig,
    model::{DailyWeatherRecord, HourlyWeatherRecord, Temperature, WeatherPayload},
    truncate_body,
};

use super::{ProviderError, WeatherProvider};

/// Visual Crossing timeline API.
#[derive(Debug, Clone)]
pub struct VisualCrossingProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

#[derive(Debug, Clone, Copy)]
enum Include {
    Days,
    Hours,
}

impl Include {
    fn as_str(&self) -> &'static str {
        match self {
            Include::Days => "days",
            Include::Hours => "hours",
        }
    }
}

impl VisualCrossingProvider {
    pub fn new(http: Client, config: &WeatherConfig, api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), base_url: config.base_url.clone(), http }
    }

    /// `{base}/{location}/{start}/{end}` with the location percent-encoded as one segment.
    fn timeline_url(
        &self,
        location: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Url, ProviderError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;

        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(location)
            .push(&start_date.format("%Y-%m-%d").to_string())
            .push(&end_date.format("%Y-%m-%d").to_string());

        Ok(url)
    }

    async fn fetch_timeline(
        &self,
        location: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        include: Include,
    ) -> Result<VcTimeline, ProviderError> {
        let url = self.timeline_url(location, start_date, end_date)?;
        debug!(%location, %start_date, %end_date, include = include.as_str(), "Fetching weather timeline");

        let res = self
            .http
            .get(url)
            .query(&[
                ("unitGroup", "metric"),
                ("include", include.as_str()),
                ("key", self.api_key.as_str()),
                ("contentType", "json"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url()))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| ProviderError::Transport(e.without_url()))?;

        if !status.is_success() {
            warn!(%status, body = %truncate_body(&body), "Weather timeline request failed");
            return Err(ProviderError::UpstreamFailure(status.as_u16()));
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct VcTimeline {
    #[serde(default)]
    days: Vec<VcDay>,
}

#[derive(Debug, Deserialize)]
struct VcDay {
    datetime: String,
    tempmax: f64,
    tempmin: f64,
    temp: f64,
    windspeed: Option<f64>,
    humidity: f64,
    conditions: String,
    #[serde(default)]
    hours: Vec<VcHour>,
}

#[derive(Debug, Deserialize)]
struct VcHour {
    datetime: String,
    temp: f64,
    feelslike: f64,
    windspeed: Option<f64>,
    humidity: f64,
    conditions: String,
    uvindex: Option<f64>,
    visibility: Option<f64>,
}

impl From<VcDay> for DailyWeatherRecord {
    fn from(day: VcDay) -> Self {
        Self {
            date: day.datetime,
            temperature: Temperature { max: day.tempmax, min: day.tempmin, avg: day.temp },
            windspeed: day.windspeed,
            conditions: day.conditions,
            humidity: day.humidity,
        }
    }
}

fn hourly_records(day: VcDay) -> Vec<HourlyWeatherRecord> {
    let date = day.datetime;
    day.hours
        .into_iter()
        .map(|hour| HourlyWeatherRecord {
            datetime: format!("{date}T{}", hour.datetime),
            temp: hour.temp,
            feelslike: hour.feelslike,
            windspeed: hour.windspeed,
            humidity: hour.humidity,
            conditions: hour.conditions,
            uvindex: hour.uvindex,
            visibility: hour.visibility,
        })
        .collect()
}

#[async_trait]
impl WeatherProvider for VisualCrossingProvider {
    async fn fetch_range_days(
        &self,
        location: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<WeatherPayload, ProviderError> {
        let timeline = self.fetch_timeline(location, start_date, end_date, Include::Days).await?;

        Ok(WeatherPayload::Daily(timeline.days.into_iter().map(Into::into).collect()))
    }

    async fn fetch_today_hours(
        &self,
        location: &str,
        start_date: NaiveDate,
    ) -> Result<WeatherPayload, ProviderError> {
        let timeline = self.fetch_timeline(location, start_date, start_date, Include::Hours).await?;

        let hours = timeline.days.into_iter().next().map(hourly_records).unwrap_or_default();

        Ok(WeatherPayload::Hourly(hours))
    }
}
