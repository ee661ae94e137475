// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Error types for the imputation library.

use std::fmt;

/// Result type alias for imputation operations.
pub type Result<T> = std::result::Result<T, ImputationError>;

/// Main error type for the imputation library.
#[derive(Debug)]
pub enum ImputationError {
    /// Error loading a model checkpoint.
    ModelLoadError(String),
    /// Error during model inference.
    InferenceError(String),
    /// Invalid configuration provided.
    ConfigError(String),
    /// Malformed or unusable supervised input file.
    SupervisedError(String),
    /// Backing dataset HDF5 error (layout, lookup, token reads).
    DatasetError(String),
    /// Prompt resolution or prompt cache error.
    PromptError(String),
    /// Error writing the output HDF5 file.
    OutputError(String),
    /// IO error (file not found, permission denied, etc.).
    IoError(String),
    /// Wrapped `std::io::Error`
    Io(std::io::Error),
}

impl fmt::Display for ImputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoadError(msg) => write!(f, "Model load error: {msg}"),
            Self::InferenceError(msg) => write!(f, "Inference error: {msg}"),
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::SupervisedError(msg) => write!(f, "Supervised file error: {msg}"),
            Self::DatasetError(msg) => write!(f, "Dataset error: {msg}"),
            Self::PromptError(msg) => write!(f, "Prompt error: {msg}"),
            Self::OutputError(msg) => write!(f, "Output error: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for ImputationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ImputationError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<hdf5::Error> for ImputationError {
    fn from(err: hdf5::Error) -> Self {
        Self::DatasetError(err.to_string())
    }
}

impl From<csv::Error> for ImputationError {
    fn from(err: csv::Error) -> Self {
        Self::SupervisedError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ImputationError::ModelLoadError("test".to_string());
        assert_eq!(err.to_string(), "Model load error: test");

        let err = ImputationError::PromptError("test".to_string());
        assert_eq!(err.to_string(), "Prompt error: test");
    }

    #[test]
    fn test_io_error_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ImputationError::from(io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
