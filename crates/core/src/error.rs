/// Result alias that carries the custom [`BeatscopeError`] type.
pub type Result<T> = std::result::Result<T, BeatscopeError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BeatscopeError {
    /// The audio source cannot back an analyser: it reports zero bins or a
    /// sample rate that is not a positive finite number. Fatal for the
    /// component being constructed.
    #[error("invalid audio source: {0}")]
    InvalidSource(String),
    /// The source could not deliver a snapshot for this frame. Recoverable;
    /// the caller skips the frame and tries again on the next one.
    #[error("analysis unavailable: {0}")]
    AnalysisUnavailable(String),
    /// A tunable is outside of its valid domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Free-form message, mostly used by the command line front-end.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or report (de)serialisation failure.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl BeatscopeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid_source<T: Into<String>>(msg: T) -> Self {
        Self::InvalidSource(msg.into())
    }

    pub fn unavailable<T: Into<String>>(msg: T) -> Self {
        Self::AnalysisUnavailable(msg.into())
    }

    pub fn invalid_config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Returns `true` when the failure only affects the current frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AnalysisUnavailable(_))
    }
}

impl From<&str> for BeatscopeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatscopeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
