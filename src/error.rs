use std::{io, path::StripPrefixError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use serde_json::Error as JsonError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ContentError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid text encoding (expected UTF-8): {0}")]
    Encoding(String),
    #[error("File System error at {path}: {message}")]
    Io { path: String, message: String },
    #[error("'{path}' is a {found} entry, expected {expected}")]
    KindMismatch {
        path: String,
        expected: String,
        found: String,
    },
    #[error("Content store accessed before initialization")]
    NotInitialized,
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("YAML parse error in {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Unexpected document shape in {path}: {message}")]
    Shape { path: String, message: String },
    #[error("Fetching '{path}' timed out after {after_ms}ms")]
    Timeout { path: String, after_ms: u64 },
}

impl ContentError {
    /// Attach a path to an io error, preserving the not-found / permission distinctions.
    pub fn from_io(path: impl Into<String>, err: io::Error) -> ContentError {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => ContentError::NotFound(path),
            io::ErrorKind::PermissionDenied => ContentError::PermissionDenied(path),
            io::ErrorKind::InvalidData => ContentError::Encoding(path),
            _ => ContentError::Io {
                path,
                message: format!("{err}"),
            },
        }
    }

    pub fn parse(path: impl Into<String>, err: impl std::fmt::Display) -> ContentError {
        ContentError::Parse {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn shape(path: impl Into<String>, message: impl Into<String>) -> ContentError {
        ContentError::Shape {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<StripPrefixError> for ContentError {
    fn from(src: StripPrefixError) -> ContentError {
        ContentError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for ContentError {
    fn from(src: toml::de::Error) -> ContentError {
        ContentError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for ContentError {
    fn from(src: JsonError) -> ContentError {
        ContentError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}
