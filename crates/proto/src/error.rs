use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Message bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Channel adapter error.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session store error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Media download/transcription error.
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// Message bus errors
#[derive(Debug, Error)]
pub enum BusError {
    /// The receiving side of the bus has been dropped.
    #[error("Bus closed")]
    Closed,

    /// Publishing an event failed.
    #[error("Publish failed: {0}")]
    PublishFailed(String),
}

/// Channel adapter errors
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Required credential is missing; the channel cannot start.
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// Another session is already bound to the same credential.
    #[error("Session conflict: {0}")]
    Conflict(String),

    /// Transient transport failure (network, timeout, 5xx).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Outbound send was refused for a markup/parse problem.
    #[error("Markup rejected: {0}")]
    MarkupRejected(String),

    /// Sending message/event failed for a non-markup reason.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The channel is not in a ready state for sending.
    #[error("Channel not ready")]
    NotReady,

    /// Channel has been closed.
    #[error("Channel closed")]
    Closed,
}

/// Session store errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Filesystem read/write error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSONL record parse error.
    #[error("Record parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Media pipeline errors
#[derive(Debug, Error)]
pub enum MediaError {
    /// Fetching the file from the platform failed.
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Transcription provider failed or returned an error status.
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    /// Local filesystem error while persisting media.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
