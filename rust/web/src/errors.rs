/// Error handling shared by every HTTP endpoint of mextrain_web
///
/// This module provides:
/// - The JSON error body returned by all routes
/// - HTTP status mapping for engine and session errors
/// - Severity-based logging of failed requests
use serde::{Deserialize, Serialize};
use std::fmt;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

use mextrain_engine::errors::GameError;

/// Standard error response format for all API endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "not_your_turn")
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional structured data about the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn into_response(self, status: StatusCode) -> Response {
        reply::with_status(reply::json(&self), status).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Error classification for logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Client errors (4xx), part of normal play
    Client,
    /// Server errors (5xx)
    Server,
    /// Session storage or integrity is at risk
    Critical,
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait IntoErrorResponse {
    fn status_code(&self) -> StatusCode;

    fn error_code(&self) -> &'static str;

    fn error_message(&self) -> String;

    fn error_details(&self) -> Option<serde_json::Value> {
        None
    }

    fn severity(&self) -> ErrorSeverity {
        if self.status_code().is_server_error() {
            ErrorSeverity::Server
        } else {
            ErrorSeverity::Client
        }
    }

    fn to_error_response(&self) -> ErrorResponse {
        if let Some(details) = self.error_details() {
            ErrorResponse::with_details(self.error_code(), self.error_message(), details)
        } else {
            ErrorResponse::new(self.error_code(), self.error_message())
        }
    }

    /// Convert to HTTP response, logging at a level matching the severity
    fn into_http_response(self) -> Response
    where
        Self: Sized,
    {
        let status = self.status_code();
        let severity = self.severity();
        let error_response = self.to_error_response();
        log_error(severity, status, &error_response);
        error_response.into_response(status)
    }
}

fn log_error(severity: ErrorSeverity, status: StatusCode, error: &ErrorResponse) {
    match severity {
        ErrorSeverity::Client => tracing::info!(
            status = status.as_u16(),
            error_code = %error.error,
            "client error: {}",
            error.message
        ),
        ErrorSeverity::Server => tracing::error!(
            status = status.as_u16(),
            error_code = %error.error,
            "server error: {}",
            error.message
        ),
        ErrorSeverity::Critical => tracing::error!(
            status = status.as_u16(),
            error_code = %error.error,
            critical = true,
            "critical error: {}",
            error.message
        ),
    }
}

/// Rule violations are conflicts with the current game state; malformed requests are
/// bad requests.
impl IntoErrorResponse for GameError {
    fn status_code(&self) -> StatusCode {
        match self {
            GameError::NotYourTurn { .. }
            | GameError::EmptyBoneyard
            | GameError::RoundNotStarted
            | GameError::RoundOver
            | GameError::RoundInProgress
            | GameError::MatchAlreadyEnded => StatusCode::CONFLICT,
            GameError::IllegalMove(_)
            | GameError::IllegalPlacement { .. }
            | GameError::InvalidTile(_)
            | GameError::DuplicateTile(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GameError::PlayerNotInSession(_) => StatusCode::FORBIDDEN,
            GameError::InsufficientTiles { .. } | GameError::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    fn error_code(&self) -> &'static str {
        self.code()
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            GameError::NotYourTurn { expected, actual } => Some(serde_json::json!({
                "expected": expected,
                "actual": actual,
            })),
            GameError::IllegalPlacement { tile } | GameError::InvalidTile(tile) => {
                Some(serde_json::json!({ "tile": tile }))
            }
            GameError::InsufficientTiles { needed, available } => Some(serde_json::json!({
                "needed": needed,
                "available": available,
            })),
            _ => None,
        }
    }
}
