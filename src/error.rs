use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("Invalid 3D model: {0}")]
    InvalidModel(String),

    #[error("Invalid quote request: {0}")]
    InvalidRequest(String),

    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error(
        "No profile found for material '{material}'. Looked for config override '{config_key}' and conventional file '{conventional}'."
    )]
    ProfileNotFound {
        material: String,
        config_key: String,
        conventional: String,
    },

    #[error("Slicer failed: {0}")]
    SlicerFailed(String),

    #[error("Slicing operation timed out after {0}s")]
    SlicerTimeout(u64),

    #[error("No G-code output found in {}", .0.display())]
    NoGcodeOutput(PathBuf),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Classification attached to a failed quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidModel,
    SlicerExecutionFailed,
    SlicerTimeout,
    NoSlicerOutput,
    Internal,
}

impl QuoteError {
    pub fn kind(&self) -> FailureKind {
        match self {
            QuoteError::InvalidModel(_)
            | QuoteError::InvalidRequest(_)
            | QuoteError::ModelNotFound(_) => FailureKind::InvalidModel,
            QuoteError::ProfileNotFound { .. } | QuoteError::SlicerFailed(_) => {
                FailureKind::SlicerExecutionFailed
            }
            QuoteError::SlicerTimeout(_) => FailureKind::SlicerTimeout,
            QuoteError::NoGcodeOutput(_) => FailureKind::NoSlicerOutput,
            QuoteError::Config(_) | QuoteError::Io(_) => FailureKind::Internal,
        }
    }
}

impl From<QuoteError> for String {
    fn from(err: QuoteError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            QuoteError::SlicerFailed("exit 1".into()).kind(),
            FailureKind::SlicerExecutionFailed
        );
        assert_eq!(QuoteError::SlicerTimeout(300).kind(), FailureKind::SlicerTimeout);
        assert_eq!(
            QuoteError::NoGcodeOutput(PathBuf::from("/tmp/out")).kind(),
            FailureKind::NoSlicerOutput
        );
        assert_eq!(
            QuoteError::InvalidModel("bad".into()).kind(),
            FailureKind::InvalidModel
        );
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::SlicerExecutionFailed).unwrap();
        assert_eq!(json, "\"slicer_execution_failed\"");
    }

    #[test]
    fn test_profile_not_found_message() {
        let err = QuoteError::ProfileNotFound {
            material: "TPU".into(),
            config_key: "filament.TPU".into(),
            conventional: "tpu.json".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'TPU'"));
        assert!(msg.contains("tpu.json"));
    }
}
