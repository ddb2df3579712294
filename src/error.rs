use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::StoreError;

/// ApiError
///
/// Every failure a route can answer with. Gates and handlers convert failures into one
/// of these at the point of origin; nothing is retried.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, badly signed or expired bearer credential.
    #[error("unauthorized access")]
    Unauthorized,

    /// Valid credential whose principal is not an admin.
    #[error("Forbidden access")]
    Forbidden,

    /// An identifier-based mutation matched no record.
    #[error("{0}")]
    NotFound(&'static str),

    /// An insert collided with the collection's unique key.
    #[error("{0}")]
    Duplicate(&'static str),

    /// The document store failed. `context` is what the client sees; `source` is logged.
    #[error("{context}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Failed to issue token")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl ApiError {
    /// Shorthand for wrapping a store failure with the client-facing message.
    pub fn store(context: &'static str, source: StoreError) -> Self {
        Self::Store { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Duplicate(_) => StatusCode::BAD_REQUEST,
            ApiError::Store { .. } | ApiError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// ErrorBody
///
/// JSON shape of every error response: `{"error": true, "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub error: bool,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Raw store and signing errors stay in the server log.
        match &self {
            ApiError::Store { context, source } => {
                tracing::error!(error = %source, "{}", context);
            }
            ApiError::Token(source) => {
                tracing::error!(error = %source, "token signing failed");
            }
            _ => {}
        }

        let body = Json(ErrorBody {
            error: true,
            message: self.to_string(),
        });

        (self.status(), body).into_response()
    }
}
