use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::Error;

/// Plain-text error response. Webhook callers only look at the status line.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound(_)
            | Error::Malformed(_)
            | Error::BadRequest(_)
            | Error::NotProvisioned(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Conflict(_) | Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{err}");
            // Storage details stay in the log.
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                return Self::internal("Internal server error");
            }
        } else {
            tracing::warn!("{err}");
        }

        Self {
            status,
            message: message_of(err),
        }
    }
}

/// The bare message, without the variant prefix `Display` adds.
fn message_of(err: Error) -> String {
    match err {
        Error::NotFound(m)
        | Error::AlreadyExists(m)
        | Error::Conflict(m)
        | Error::Unauthorized(m)
        | Error::Malformed(m)
        | Error::BadRequest(m)
        | Error::NotProvisioned(m)
        | Error::Upstream(m) => m,
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}
