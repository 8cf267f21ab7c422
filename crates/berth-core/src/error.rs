//! Core error types

use thiserror::Error;

/// Errors raised while turning a directory into a chart
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("cannot find chart at {path}")]
    NotFound { path: String },

    #[error("failed to load chart at {path}: {message}")]
    Load { path: String, message: String },
}

impl ChartError {
    pub(crate) fn load(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error("Invalid deployment context: {message}")]
    InvalidContext { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
