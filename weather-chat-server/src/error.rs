use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use weather_chat_core::{ComposeError, ResolutionError};

/// Failure that happened before any event was written.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Compose(ComposeError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Compose(ComposeError::EmptyQuery) => StatusCode::BAD_REQUEST,
            ApiError::Compose(ComposeError::Resolution(ResolutionError::Upstream(_))) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Compose(ComposeError::Resolution(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Compose(ComposeError::Unauthorized(_)) => "Invalid token".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weather_chat_core::{AuthorizationError, ChatError};

    #[test]
    fn maps_errors_to_status_codes() {
        let cases = [
            (ComposeError::Unauthorized(AuthorizationError), StatusCode::UNAUTHORIZED),
            (ComposeError::EmptyQuery, StatusCode::BAD_REQUEST),
            (ComposeError::Resolution(ResolutionError::NoToolCall), StatusCode::UNPROCESSABLE_ENTITY),
            (
                ComposeError::Resolution(ResolutionError::BadArguments("x".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ComposeError::Resolution(ResolutionError::Upstream(ChatError::EmptyResponse)),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).into_response().status(), expected);
        }
    }
}
