use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// One incoming question together with the caller's access token.
#[derive(Debug, Clone)]
pub struct WeatherQuery {
    pub user_query: String,
    pub token: String,
}

impl WeatherQuery {
    pub fn new(user_query: impl Into<String>, token: impl Into<String>) -> Self {
        Self { user_query: user_query.into(), token: token.into() }
    }
}

/// The two weather lookups the language model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RangeDays,
    TodayHours,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::RangeDays => "get_weather_range_days",
            Operation::TodayHours => "get_weather_today_hours",
        }
    }

    pub const fn all() -> &'static [Operation] {
        &[Operation::RangeDays, Operation::TodayHours]
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Operation {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Operation::all()
            .iter()
            .copied()
            .find(|op| op.as_str() == value)
            .ok_or_else(|| value.to_string())
    }
}

/// A validated tool call: which lookup to run and with which arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIntent {
    pub operation: Operation,
    pub location: String,
    pub start_date: NaiveDate,
    /// Present for [`Operation::RangeDays`], absent for [`Operation::TodayHours`].
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyWeatherRecord {
    /// `YYYY-MM-DDTHH:MM:SS`, local to the requested location.
    pub datetime: String,
    pub temp: f64,
    pub feelslike: f64,
    pub windspeed: Option<f64>,
    pub humidity: f64,
    pub conditions: String,
    pub uvindex: Option<f64>,
    pub visibility: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub max: f64,
    pub min: f64,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeatherRecord {
    pub date: String,
    pub temperature: Temperature,
    /// km/h
    pub windspeed: Option<f64>,
    pub conditions: String,
    /// %
    pub humidity: f64,
}

/// Weather data for one request. Serializes as a plain JSON array.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherPayload {
    Hourly(Vec<HourlyWeatherRecord>),
    Daily(Vec<DailyWeatherRecord>),
    /// Stand-in for data the provider failed to deliver.
    Empty,
}

impl Serialize for WeatherPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WeatherPayload::Hourly(hours) => hours.serialize(serializer),
            WeatherPayload::Daily(days) => days.serialize(serializer),
            WeatherPayload::Empty => serializer.collect_seq(std::iter::empty::<()>()),
        }
    }
}

impl WeatherPayload {
    pub fn len(&self) -> usize {
        match self {
            WeatherPayload::Hourly(hours) => hours.len(),
            WeatherPayload::Daily(days) => days.len(),
            WeatherPayload::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wire-level unit of the NDJSON response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamEvent {
    #[serde(rename = "weather_data_days")]
    WeatherData(WeatherPayload),
    #[serde(rename = "analysis")]
    AnalysisChunk(String),
    #[serde(rename = "finish")]
    Finish(bool),
}

impl StreamEvent {
    /// Render as a single newline-terminated JSON line.
    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
