use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChartError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Malformed catalog payload: {0}")]
    Format(String),

    #[error("Score parse error: {0}")]
    Parse(String),

    #[error("Chart render failed: {0}")]
    Render(String),

    #[error("Content marker not present after {0:?}")]
    RenderTimeout(Duration),

    #[error("Invalid crop rectangle: {0}")]
    InvalidRect(String),

    #[error("Rendering engine failed to start: {0}")]
    EngineInit(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cancelled before start")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl ChartError {
    /// Errors that make every remaining item pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChartError::EngineInit(_) | ChartError::Configuration(_))
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ChartError::Cancelled => ErrorSeverity::Low,
            ChartError::InvalidRect(_) => ErrorSeverity::Low,
            ChartError::Configuration(_) => ErrorSeverity::High,
            ChartError::Worker(_) => ErrorSeverity::High,
            ChartError::EngineInit(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Short label used for metrics and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ChartError::Fetch(_) => "fetch",
            ChartError::Format(_) => "format",
            ChartError::Parse(_) => "parse",
            ChartError::Render(_) => "render",
            ChartError::RenderTimeout(_) => "timeout",
            ChartError::InvalidRect(_) => "invalid_rect",
            ChartError::EngineInit(_) => "engine_init",
            ChartError::Io(_) => "io",
            ChartError::Configuration(_) => "configuration",
            ChartError::Cancelled => "cancelled",
            ChartError::Worker(_) => "worker",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<AcquireError> for ChartError {
    fn from(err: AcquireError) -> Self {
        ChartError::Worker(err.to_string())
    }
}

impl From<std::io::Error> for ChartError {
    fn from(err: std::io::Error) -> Self {
        ChartError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChartError {
    fn from(err: serde_json::Error) -> Self {
        ChartError::Format(err.to_string())
    }
}

impl From<reqwest::Error> for ChartError {
    fn from(err: reqwest::Error) -> Self {
        ChartError::Fetch(err.to_string())
    }
}

impl From<image::ImageError> for ChartError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => ChartError::Io(e.to_string()),
            other => ChartError::Render(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ChartError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChartError::Worker(err.to_string())
    }
}
