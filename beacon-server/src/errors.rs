use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use beacon_core::{DatabaseError, SessionError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("session:{token} not found")]
    SessionNotFound { token: String },
    #[error("{field} is missing or invalid")]
    InvalidInput { field: &'static str },
    #[error("Storage is unavailable: {0}")]
    Storage(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound { token: _ } => StatusCode::NOT_FOUND,
            Self::InvalidInput { field: _ } => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<SessionError> for ServerError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::NotFound { token } => Self::SessionNotFound { token },
            SessionError::InvalidField { field } => Self::InvalidInput { field },
            SessionError::Storage(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        Self::Storage(value.to_string())
    }
}
