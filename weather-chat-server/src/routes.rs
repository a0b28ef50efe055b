use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
};
use futures::StreamExt;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use weather_chat_core::{ResponseComposer, StreamInterrupted, WeatherQuery};

use crate::error::ApiError;

/// State shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub composer: Arc<ResponseComposer>,
}

pub fn router(composer: Arc<ResponseComposer>) -> Router {
    Router::new()
        .route("/query_weather", post(query_weather))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { composer })
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub user_query: String,
    #[serde(default)]
    pub token: String,
}

/// Handler for `POST /query_weather`.
///
/// The body is NDJSON written as events arrive. Dropping the response (client
/// gone) drops the event stream and with it the upstream connections.
async fn query_weather(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let events = state
        .composer
        .compose(WeatherQuery::new(request.user_query, request.token))
        .await?;

    let lines = events.map(|event| {
        event.and_then(|event| event.to_ndjson_line().map_err(StreamInterrupted::from))
    });

    Ok(([(header::CONTENT_TYPE, "application/json")], Body::from_stream(lines)).into_response())
}
