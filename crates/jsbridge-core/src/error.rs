//! Error types for the bridge
//!
//! Every engine entry is fallible. The five kinds below are the complete
//! taxonomy surfaced to host code; host callbacks use [`HostError`] instead
//! (see `callback.rs`), which is turned into a script exception at the
//! boundary and never escapes as a host-level fault.
//!
//! [`HostError`]: crate::callback::HostError

use crate::value::ValueType;
use std::fmt;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge error kinds
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The embedded engine could not start
    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    /// Operation on a closed runtime or context, or on a value whose owner is closed
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation on an explicitly released object, array or function
    #[error("Use after release: {0}")]
    UseAfterRelease(String),

    /// Uncaught exception or parse failure inside script code
    #[error("{0}")]
    Script(ScriptError),

    /// The produced value cannot be coerced to the requested type
    #[error("Type coercion error: expected {expected}, got {actual}")]
    TypeCoercion {
        /// Requested type
        expected: ValueType,
        /// Type of the value actually produced
        actual: ValueType,
    },
}

impl Error {
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub(crate) fn coercion(expected: ValueType, actual: ValueType) -> Self {
        Error::TypeCoercion { expected, actual }
    }

    /// Check if this is a script-level error
    pub fn is_script(&self) -> bool {
        matches!(self, Error::Script(_))
    }

    /// Get the script error details, if any
    pub fn as_script(&self) -> Option<&ScriptError> {
        match self {
            Error::Script(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ScriptError> for Error {
    fn from(err: ScriptError) -> Self {
        Error::Script(err)
    }
}

/// An exception raised by script code
///
/// Recoverable: the context that raised it stays usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// Exception message, prefixed by the error name when the engine reports one
    pub message: String,
    /// File name hint supplied by the caller
    pub file_name: Option<String>,
    /// Line number, when the engine reports one
    pub line: Option<u32>,
    /// Engine stack trace, when available
    pub stack: Option<String>,
}

impl ScriptError {
    /// Create a script error with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file_name: None,
            line: None,
            stack: None,
        }
    }

    /// Attach a file name hint
    pub fn with_file_name(mut self, file_name: Option<&str>) -> Self {
        self.file_name = file_name.map(str::to_owned);
        self
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file_name, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: {}", file, line, self.message),
            (Some(file), None) => write!(f, "{}: {}", file, self.message),
            (None, Some(line)) => write!(f, "line {}: {}", line, self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ScriptError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = ScriptError {
            message: "ReferenceError: x is not defined".to_string(),
            file_name: Some("file.js".to_string()),
            line: Some(3),
            stack: None,
        };
        assert_eq!(err.to_string(), "file.js:3: ReferenceError: x is not defined");

        let bare = ScriptError::new("boom");
        assert_eq!(bare.to_string(), "boom");
        assert_eq!(
            bare.with_file_name(Some("a.js")).to_string(),
            "a.js: boom"
        );
    }

    #[test]
    fn test_coercion_error_display() {
        let err = Error::coercion(ValueType::Integer, ValueType::String);
        assert_eq!(
            err.to_string(),
            "Type coercion error: expected integer, got string"
        );
    }

    #[test]
    fn test_as_script() {
        let err: Error = ScriptError::new("boom").into();
        assert!(err.is_script());
        assert_eq!(err.as_script().map(|e| e.message.as_str()), Some("boom"));
        assert!(Error::invalid_state("closed").as_script().is_none());
    }
}
