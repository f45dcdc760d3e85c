//! Error types for policy construction, prediction and weight persistence.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Errors surfaced by policies. Contract violations such as an out-of-range
/// action index panic instead of returning one of these.
#[derive(Debug)]
pub enum PolicyError {
    /// A weight snapshot could not be read or written.
    Weights {
        /// Snapshot path without the recorder's file extension.
        path: PathBuf,
        /// Recorder failure description.
        reason: String,
    },
    /// The weights directory could not be created.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Tensor data could not be read back from the backend.
    TensorData(String),
    /// A history was used before it received any frame.
    EmptyHistory {
        /// Position of the sub-policy in registration order, `None` for a
        /// caller-owned history.
        sub_model: Option<usize>,
    },
    /// Pixel buffer length does not match `height * width`.
    FrameSize { expected: usize, actual: usize },
    /// A frame's shape differs from the frames already buffered.
    FrameShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// The network produced a value vector of the wrong length.
    OutputSize { expected: usize, actual: usize },
    /// The policy has no actions and no sub-policies to choose from.
    EmptyActionSpace,
    /// Invalid policy or network configuration.
    Config(String),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weights { path, reason } => {
                write!(f, "weight snapshot '{}' failed: {reason}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "weights directory '{}': {source}", path.display())
            }
            Self::TensorData(reason) => write!(f, "tensor data unavailable: {reason}"),
            Self::EmptyHistory {
                sub_model: Some(index),
            } => write!(f, "sub-policy {index} has no buffered frames"),
            Self::EmptyHistory { sub_model: None } => write!(f, "history has no frames"),
            Self::FrameSize { expected, actual } => {
                write!(f, "frame has {actual} pixels, expected {expected}")
            }
            Self::FrameShape { expected, actual } => write!(
                f,
                "frame shape {}x{} does not match buffered {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            Self::OutputSize { expected, actual } => {
                write!(f, "network produced {actual} values, expected {expected}")
            }
            Self::EmptyActionSpace => write!(f, "policy has an empty action space"),
            Self::Config(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl Error for PolicyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_path() {
        let err = PolicyError::Weights {
            path: PathBuf::from("weights/doom_hdqn"),
            reason: "FileNotFound".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("weights/doom_hdqn"));
        assert!(message.contains("FileNotFound"));
    }

    #[test]
    fn test_io_error_has_source() {
        let err = PolicyError::Io {
            path: PathBuf::from("/nope"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
        assert!(PolicyError::EmptyActionSpace.source().is_none());
    }
}
