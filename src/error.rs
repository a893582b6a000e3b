use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LapseError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Motion analysis error: {0}")]
    Motion(#[from] MotionError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Errors raised by the capture loop and its collaborators
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture is already running")]
    AlreadyRunning,

    #[error("Capture is outside the configured schedule")]
    SchedulingBlocked,

    #[error("Storage location is not configured")]
    StorageNotConfigured,

    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No signal from image source: {details}")]
    NoSignal { details: String },

    #[error("Failed to save image {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image {} was written but is empty", path.display())]
    EmptyWrite { path: PathBuf },

    #[error("Storage limit reached ({used} of {limit} bytes used)")]
    StorageLimitReached { used: u64, limit: u64 },
}

/// Errors raised while queueing or running the external encoder
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Encoder is not available on this system")]
    EncoderUnavailable,

    #[error("Encoder binary '{program}' not found. Install FFmpeg and ensure it is in your PATH")]
    EncoderMissing { program: String },

    #[error("Input path does not exist: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Input path is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("Not enough images for a timelapse: found {found}, need at least {required}")]
    InsufficientFrames { found: usize, required: usize },

    #[error("Music file not found: {}", path.display())]
    MusicNotFound { path: PathBuf },

    #[error("No output path given and no storage location configured")]
    NoOutputLocation,

    #[error("Failed to prepare encoder input: {source}")]
    Staging {
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited with code {code:?}: {diagnostics}")]
    EncodingFailed {
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("Encoding was cancelled")]
    Cancelled,

    #[error("Encoder queue is closed")]
    QueueClosed,

    #[error("Encoder task panicked")]
    TaskPanicked,
}

/// Errors raised by the upload dispatcher
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("FTP upload is disabled")]
    Disabled,

    #[error("FTP server is not configured")]
    NotConfigured,

    #[error("Local file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Upload failed: {message}")]
    UploadFailed { message: String },
}

/// Errors raised by the settings store
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Unknown settings key: {key}")]
    UnknownKey { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to persist settings to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid motion zone: {message}")]
    InvalidZone { message: String },

    #[error("Invalid cron pattern: {pattern}")]
    InvalidCronPattern { pattern: String },
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum MotionError {
    #[error("Failed to decode frame: {details}")]
    Decode { details: String },
}

/// Coarse error taxonomy used to decide how a failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or invalid settings; reported immediately, never retried
    Configuration,
    /// Camera, display or encoder binary unavailable
    ResourceUnavailable,
    /// A single write or upload failed; the session continues
    TransientIo,
    /// Storage quota reached; the capture session ends
    QuotaExceeded,
    /// The external encoder exited with a failure
    ExternalProcess,
    Cancelled,
    Internal,
}

impl LapseError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            LapseError::Config(_)
            | LapseError::Deserialization(_)
            | LapseError::Serialization(_)
            | LapseError::Json(_) => ErrorClass::Configuration,
            LapseError::Io(_) => ErrorClass::TransientIo,
            LapseError::Capture(e) => e.class(),
            LapseError::Encode(e) => e.class(),
            LapseError::Upload(e) => e.class(),
            LapseError::Settings(e) => e.class(),
            LapseError::Motion(_) => ErrorClass::TransientIo,
            LapseError::EventBus(_) => ErrorClass::Internal,
            LapseError::System { .. } | LapseError::Component { .. } => ErrorClass::Internal,
        }
    }
}

impl CaptureError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CaptureError::AlreadyRunning
            | CaptureError::SchedulingBlocked
            | CaptureError::StorageNotConfigured => ErrorClass::Configuration,
            CaptureError::DirectoryCreation { .. } => ErrorClass::Configuration,
            CaptureError::NoSignal { .. } => ErrorClass::ResourceUnavailable,
            CaptureError::Write { .. } | CaptureError::EmptyWrite { .. } => ErrorClass::TransientIo,
            CaptureError::StorageLimitReached { .. } => ErrorClass::QuotaExceeded,
        }
    }
}

impl EncodeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EncodeError::EncoderUnavailable | EncodeError::EncoderMissing { .. } => {
                ErrorClass::ResourceUnavailable
            }
            EncodeError::InputNotFound { .. }
            | EncodeError::NotADirectory { .. }
            | EncodeError::InsufficientFrames { .. }
            | EncodeError::MusicNotFound { .. }
            | EncodeError::NoOutputLocation => ErrorClass::Configuration,
            EncodeError::Staging { .. } => ErrorClass::TransientIo,
            EncodeError::EncodingFailed { .. } => ErrorClass::ExternalProcess,
            EncodeError::Cancelled | EncodeError::QueueClosed => ErrorClass::Cancelled,
            EncodeError::TaskPanicked => ErrorClass::Internal,
        }
    }
}

impl UploadError {
    pub fn class(&self) -> ErrorClass {
        match self {
            UploadError::Disabled | UploadError::NotConfigured => ErrorClass::Configuration,
            UploadError::FileNotFound { .. } | UploadError::UploadFailed { .. } => {
                ErrorClass::TransientIo
            }
        }
    }
}

impl SettingsError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SettingsError::Persist { .. } => ErrorClass::TransientIo,
            _ => ErrorClass::Configuration,
        }
    }
}

pub type Result<T> = std::result::Result<T, LapseError>;
