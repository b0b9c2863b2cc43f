use thiserror::Error;

/// Fixed message shown when a locality lookup fails.
pub const LOOKUP_FAILED_MESSAGE: &str = "Failed to fetch locality data";
/// Fixed message shown when a place name cannot be placed on the map.
pub const RESOLUTION_FAILED_MESSAGE: &str = "Could not find this locality on the map";
/// Fixed message shown when an empty query or message is submitted.
pub const VALIDATION_FAILED_MESSAGE: &str = "Please enter a value before submitting";
const INTERNAL_MESSAGE: &str = "Something went wrong";

#[derive(Error, Debug)]
pub enum SpotOnError {
    #[error("Network error calling {url}: {message}")]
    Network {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// User-facing failure classes. Every error the core produces lands in one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkFailure,
    ResolutionFailure,
    ValidationFailure,
    Internal,
}

impl SpotOnError {
    pub fn network(url: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Http(_) | Self::Serialization(_) => {
                ErrorKind::NetworkFailure
            }
            Self::Resolution(_) => ErrorKind::ResolutionFailure,
            Self::Validation(_) => ErrorKind::ValidationFailure,
            Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Non-technical text safe to put in front of the user. The raw error is for logs only.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NetworkFailure => LOOKUP_FAILED_MESSAGE,
            ErrorKind::ResolutionFailure => RESOLUTION_FAILED_MESSAGE,
            ErrorKind::ValidationFailure => VALIDATION_FAILED_MESSAGE,
            ErrorKind::Internal => INTERNAL_MESSAGE,
        }
    }

    /// Worth another attempt: transport errors and 5xx responses.
    /// The transport reports every failed exchange as `Network`.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { status, .. } => status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpotOnError>;
