use std::fmt;

/// Result alias that carries the custom [`AnalyzerError`] type.
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// The audio file is missing, unreadable, or not a recognised container/codec.
    #[error("decode error: {0}")]
    Decode(String),
    /// A feature-extraction stage failed or produced malformed intermediate data.
    #[error("analysis error: {0}")]
    Analysis(String),
    /// The key-value store could not be reached or rejected an operation.
    #[error("store error: {0}")]
    Store(String),
    /// A stage was handed input it cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Analysis parameters failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialization errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse failure taxonomy surfaced by the pipeline outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Analysis,
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Decode => "decode",
            ErrorKind::Analysis => "analysis",
            ErrorKind::Store => "store",
        };
        f.write_str(name)
    }
}

impl AnalyzerError {
    pub fn decode<T: Into<String>>(msg: T) -> Self {
        Self::Decode(msg.into())
    }

    pub fn analysis<T: Into<String>>(msg: T) -> Self {
        Self::Analysis(msg.into())
    }

    pub fn store<T: Into<String>>(msg: T) -> Self {
        Self::Store(msg.into())
    }

    /// Maps the error onto the decode/analysis/store taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::Io(_) => ErrorKind::Decode,
            Self::Analysis(_) | Self::InvalidInput(_) | Self::Config(_) => ErrorKind::Analysis,
            Self::Store(_) | Self::Json(_) => ErrorKind::Store,
        }
    }
}

impl From<redis::RedisError> for AnalyzerError {
    fn from(value: redis::RedisError) -> Self {
        Self::Store(value.to_string())
    }
}

impl From<symphonia::core::errors::Error> for AnalyzerError {
    fn from(value: symphonia::core::errors::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<toml::de::Error> for AnalyzerError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_reported_as_decode_failures() {
        let err: AnalyzerError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing.wav").into();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("missing.wav"));
    }

    #[test]
    fn constructors_pick_matching_kind() {
        assert_eq!(AnalyzerError::decode("x").kind(), ErrorKind::Decode);
        assert_eq!(AnalyzerError::analysis("x").kind(), ErrorKind::Analysis);
        assert_eq!(AnalyzerError::store("x").kind(), ErrorKind::Store);
        assert_eq!(
            AnalyzerError::InvalidInput("empty").kind(),
            ErrorKind::Analysis
        );
    }
}
