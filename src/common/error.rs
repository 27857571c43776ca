//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    IoError { path: String, message: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Discord-related errors.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: u64 },

    #[error("Failed to send message: {message}")]
    SendFailed { message: String },

    #[error("Serenity error: {0}")]
    Serenity(#[from] serenity::Error),
}

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },
}

/// Failure of a coordinator operation.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Rejected input, e.g. an unknown server id or a malformed name.
    #[error("Validation failed: {key}: {description}")]
    Validation { key: String, description: String },

    /// Nothing matched the key of an unset operation.
    #[error("Not found: {key}: {description}")]
    NotFound { key: String, description: String },

    /// Persistence failed. In-memory changes made before the failure stay.
    #[error("Unexpected error: {0}")]
    Unexpected(#[from] StoreError),
}

impl CoordinatorError {
    pub fn validation(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            description: description.into(),
        }
    }

    pub fn not_found(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self::NotFound {
            key: key.into(),
            description: description.into(),
        }
    }

    /// The `(key, description)` pairs reported to callers.
    pub fn errors(&self) -> Vec<(String, String)> {
        match self {
            Self::Validation { key, description } | Self::NotFound { key, description } => {
                vec![(key.clone(), description.clone())]
            }
            // Storage details stay in the logs
            Self::Unexpected(_) => vec![(
                String::new(),
                "An unexpected error occurred.".to_string(),
            )],
        }
    }
}

/// Structured result of a coordinator operation for callers outside Rust
/// code paths (admin surfaces, command replies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub success: bool,
    pub errors: Vec<(String, String)>,
}

impl<T> From<&CoordinatorResult<T>> for OperationOutcome {
    fn from(result: &CoordinatorResult<T>) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                errors: Vec::new(),
            },
            Err(e) => Self {
                success: false,
                errors: e.errors(),
            },
        }
    }
}

/// Result type alias for Discord operations.
pub type DiscordResult<T> = std::result::Result<T, DiscordError>;

/// Result type alias for persistence operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for coordinator operations.
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;
