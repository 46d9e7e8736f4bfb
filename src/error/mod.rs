use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;

/// A structured error raised by the update engine and its collaborators.
///
/// Every failure that aborts a migration pass ends up as one of these, so the
/// host can print a single message and refuse to finish startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateError {
    /// Machine readable error code.
    pub code: String,
    /// Human friendly message, suitable for the operator log.
    pub message: String,
    /// Arbitrary key/value pairs that provide additional context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    /// Optional nested cause that preserves the error chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<UpdateError>>,
}

pub type UpdateResult<T> = std::result::Result<T, UpdateError>;

impl UpdateError {
    /// Default code used when an upstream error does not expose a specific code.
    pub const UNKNOWN_CODE: &'static str = "UPDATE/UNKNOWN";
    /// Code used for errors created from free-form messages.
    pub const GENERIC_CODE: &'static str = "UPDATE/GENERIC";
    /// A step body (or one of its scoped invocations) failed.
    pub const STEP_FAILED: &'static str = "UPDATE/STEP_FAILED";
    /// The version ledger could not be read or written.
    pub const LEDGER_FAILED: &'static str = "UPDATE/LEDGER_FAILED";
    /// The namespace or repository catalog could not be enumerated.
    pub const ITERATION_FAILED: &'static str = "UPDATE/ITERATION_FAILED";

    /// Construct a new error with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        UpdateError {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            cause: None,
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the contextual metadata associated with the error.
    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// Returns a single context value.
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// Returns the nested cause if one is present.
    pub fn cause(&self) -> Option<&UpdateError> {
        self.cause.as_deref()
    }

    /// Walks the cause chain down to the innermost error.
    pub fn root_cause(&self) -> &UpdateError {
        let mut current = self;
        while let Some(next) = current.cause() {
            current = next;
        }
        current
    }

    /// Adds a contextual key/value pair to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Extends the context map with additional key/value pairs.
    pub fn with_contexts<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.context
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the nested cause for the error.
    pub fn with_cause(mut self, cause: impl Into<UpdateError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl std::error::Error for UpdateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<&str> for UpdateError {
    fn from(message: &str) -> Self {
        UpdateError::new(UpdateError::GENERIC_CODE, message)
    }
}

impl From<String> for UpdateError {
    fn from(message: String) -> Self {
        UpdateError::new(UpdateError::GENERIC_CODE, message)
    }
}

impl From<AnyhowError> for UpdateError {
    fn from(error: AnyhowError) -> Self {
        fn convert(err: &(dyn StdError + 'static)) -> UpdateError {
            if let Some(update) = err.downcast_ref::<UpdateError>() {
                return update.clone();
            }

            let mut root = UpdateError::new(UpdateError::UNKNOWN_CODE, err.to_string());
            if let Some(source) = err.source() {
                root.cause = Some(Box::new(convert(source)));
            }
            root
        }

        convert(error.as_ref())
    }
}

impl From<IoError> for UpdateError {
    fn from(error: IoError) -> Self {
        let code = format!("IO/{:?}", error.kind());
        let mut update_error = UpdateError::new(code, error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            update_error = update_error.with_context("os_code", os_code.to_string());
        }
        update_error
    }
}

impl From<SerdeJsonError> for UpdateError {
    fn from(error: SerdeJsonError) -> Self {
        let code = if error.is_data() {
            "JSON/DATA"
        } else if error.is_syntax() {
            "JSON/SYNTAX"
        } else if error.is_eof() {
            "JSON/EOF"
        } else if error.is_io() {
            "JSON/IO"
        } else {
            "JSON/ERROR"
        };

        let mut update_error = UpdateError::new(code, error.to_string());
        let line = error.line();
        if line > 0 {
            update_error = update_error.with_context("line", line.to_string());
        }
        let column = error.column();
        if column > 0 {
            update_error = update_error.with_context("column", column.to_string());
        }
        update_error
    }
}

impl From<crate::version::VersionParseError> for UpdateError {
    fn from(error: crate::version::VersionParseError) -> Self {
        UpdateError::new("VERSION/PARSE", error.to_string())
            .with_context("input", error.input().to_string())
    }
}
