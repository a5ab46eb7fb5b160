use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error("compilation failed: {0}")]
    Compile(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("time limit exceeded ({limit_ms} ms)")]
    Timeout { limit_ms: u64 },
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("engine is at capacity")]
    QueueFull,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub success: bool,
    pub message: &'static str,
    pub error: String,
}

impl EngineError {
    /// Short user-facing headline for the failure.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "Workspace Error",
            Self::Compile(_) => "Compilation Error",
            Self::Runtime(_) => "Runtime Error",
            Self::Timeout { .. } => "Time Limit Exceeded",
            Self::UnsupportedLanguage(_) => "Unsupported Language",
            Self::InvalidRequest(_) => "Invalid Request",
            Self::QueueFull => "Engine Busy",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// The text carried by the error, without the headline.
    pub fn detail(&self) -> String {
        match self {
            Self::Workspace(msg)
            | Self::Compile(msg)
            | Self::Runtime(msg)
            | Self::UnsupportedLanguage(msg)
            | Self::InvalidRequest(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Timeout { limit_ms } => {
                format!("program did not finish within {limit_ms} ms")
            }
            Self::QueueFull => "too many submissions in flight, retry later".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Compile(_) | Self::Runtime(_) | Self::Timeout { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::UnsupportedLanguage(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            Self::Workspace(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rewrites error text that can mention files on the host. Request
    /// validation errors only echo the caller's input and are left alone.
    pub fn map_diagnostic(self, f: impl FnOnce(&str) -> String) -> Self {
        match self {
            Self::Compile(msg) => Self::Compile(f(&msg)),
            Self::Runtime(msg) => Self::Runtime(f(&msg)),
            Self::Workspace(msg) => Self::Workspace(f(&msg)),
            Self::Internal(msg) => Self::Internal(f(&msg)),
            other => other,
        }
    }

    pub fn body(&self) -> FailureBody {
        FailureBody {
            success: false,
            message: self.message(),
            error: self.detail(),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(format!("{value:#}"))
    }
}
