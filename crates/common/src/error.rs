//! Error types shared across wlgrab crates.
//!
//! Every variant is fatal to the screenshot being taken: there is no
//! partial-result mode, so callers propagate these with `?` up to the
//! binary and report the message.

/// Top-level error type for wlgrab operations.
#[derive(Debug, thiserror::Error)]
pub enum WlgrabError {
    #[error("Unsupported pixel format for {source_name}: {message}")]
    UnsupportedFormat {
        source_name: String,
        message: String,
    },

    #[error("Buffer allocation failed: {message}")]
    AllocationFailure { message: String },

    #[error("Failed to copy {source_name}: {message}")]
    CaptureFailed {
        source_name: String,
        message: String,
    },

    #[error("Supplied geometry {region} did not intersect with any outputs")]
    EmptySelection { region: String },

    #[error("Unknown {kind} '{name}'")]
    UnknownSource { kind: String, name: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using WlgrabError.
pub type WlgrabResult<T> = Result<T, WlgrabError>;

impl WlgrabError {
    pub fn unsupported_format(source: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            source_name: source.into(),
            message: msg.into(),
        }
    }

    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::AllocationFailure {
            message: msg.into(),
        }
    }

    pub fn capture_failed(source: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CaptureFailed {
            source_name: source.into(),
            message: msg.into(),
        }
    }

    pub fn empty_selection(region: impl std::fmt::Display) -> Self {
        Self::EmptySelection {
            region: region.to_string(),
        }
    }

    pub fn unknown_source(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownSource {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}
