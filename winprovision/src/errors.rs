use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Timed out after {elapsed:?} waiting for {condition} (timeout {timeout:?})")]
    Timeout {
        condition: String,
        elapsed: Duration,
        timeout: Duration,
    },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Command `{command}` failed with exit status {exit_status:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_status: Option<i32>,
        stderr: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::convert::Infallible> for AutomationError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl AutomationError {
    /// True for the terminal timeout condition of a readiness wait.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AutomationError::Timeout { .. })
    }
}
