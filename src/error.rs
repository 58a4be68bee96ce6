//! Custom error types for colorizer.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Main error type for the colorizer library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read an image file from disk.
    #[error("failed to read image from {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request carried no image data.
    #[error("no image data provided")]
    EmptyInput,

    /// The inbound bytes are not a decodable image.
    #[error("failed to decode image: {source}")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    /// The decoded image has no pixels.
    #[error("image has zero size: {width}x{height}")]
    ZeroSized { width: u32, height: u32 },

    /// Failed to encode the colorized image.
    #[error("failed to encode image: {source}")]
    Encode {
        #[source]
        source: image::ImageError,
    },

    /// Failed to download model weights.
    #[error("failed to download model weights {name}: {source}")]
    ModelDownload {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    /// Failed to write downloaded model weights to the cache.
    #[error("failed to store model weights {name}: {source}")]
    ModelFetch {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Model weights are missing or do not match the network layout.
    #[error("failed to load model weights from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: candle_core::Error,
    },

    /// Failed to create cache directory.
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Failed to read a configuration file.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
}

/// When an error can happen in the lifetime of a [`crate::Colorizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Startup: configuration and model loading. Fatal.
    Load,
    /// A single colorization request. The loaded model stays usable.
    Request,
}

/// Coarse error classification reported in the JSON envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ModelLoad,
    Config,
    Decode,
    Encode,
    ShapeMismatch,
    Inference,
    Io,
}

impl Error {
    /// Classify the error for reporting.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ModelDownload { .. }
            | Self::ModelFetch { .. }
            | Self::ModelLoad { .. }
            | Self::CacheDir { .. } => ErrorKind::ModelLoad,
            Self::InvalidParameter { .. } | Self::ConfigRead { .. } | Self::ConfigParse { .. } => {
                ErrorKind::Config
            }
            Self::EmptyInput | Self::ZeroSized { .. } | Self::Decode { .. } => ErrorKind::Decode,
            Self::Encode { .. } => ErrorKind::Encode,
            Self::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::Inference { .. } => ErrorKind::Inference,
            Self::ImageRead { .. } | Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error belongs to startup or to a single request.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self.kind() {
            ErrorKind::ModelLoad | ErrorKind::Config => Phase::Load,
            _ => Phase::Request,
        }
    }
}

/// Result type alias for colorizer operations.
pub type Result<T> = std::result::Result<T, Error>;
