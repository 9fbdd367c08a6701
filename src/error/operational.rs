//! Operational error context propagation with `anyhow`.
//!
//! Extension traits for attaching context to fallible library calls and a
//! reporter that routes `anyhow` errors into `tracing` at a chosen severity.

use std::{error::Error as StdError, fmt::Display};

use {
    anyhow::{Context, Error, Result as AnyhowResult},
    tracing::{debug, error, info, warn},
};

use crate::{
    error::domain::{LibraryError, PlaybackError},
    library::m3u::PlaylistFileError,
};

/// Extension trait for enhanced error context.
pub trait ResultExt<T, E> {
    /// Adds context to an error with a static string.
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;

    /// Adds context to an error with a formatted string.
    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(context)
    }

    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.with_context(|| format.to_string())
    }
}

/// Centralized error reporting and logging.
pub struct ErrorReporter;

impl ErrorReporter {
    /// Reports a debug-level error.
    pub fn debug(error: &Error, context: &str) {
        debug!(context = context, error = %error, "Operation failed");
    }

    /// Reports an info-level error (user actions and expected misses).
    pub fn info(error: &Error, context: &str) {
        info!(context = context, error = %error, "Operation failed");
    }

    /// Reports a warning-level error (recoverable issues).
    pub fn warn(error: &Error, context: &str) {
        warn!(context = context, error = %format!("{error:#}"), "Recoverable failure");
    }

    /// Reports an error-level error (the operation was abandoned).
    pub fn error(error: &Error, context: &str) {
        error!(context = context, error = %format!("{error:#}"), "Operation abandoned");
    }

    /// Converts an error to a message suitable for end users.
    ///
    /// Known domain errors anywhere in the chain produce a short, friendly
    /// message; anything else falls back to the outermost context.
    pub fn to_user_message(error: &Error) -> String {
        for cause in error.chain() {
            if let Some(library_error) = cause.downcast_ref::<LibraryError>() {
                return match library_error {
                    LibraryError::NotFound { entity, .. } => format!("The {entity} no longer exists"),
                    LibraryError::InvalidData { reason } => reason.clone(),
                    LibraryError::DatabaseError(_) | LibraryError::SchemaError(_) => {
                        "The music library could not be read".to_string()
                    }
                };
            }
            if let Some(playback_error) = cause.downcast_ref::<PlaybackError>() {
                return match playback_error {
                    PlaybackError::EmptyQueue => "Nothing to play".to_string(),
                    other => other.to_string(),
                };
            }
            if let Some(PlaylistFileError::NoTracks) = cause.downcast_ref::<PlaylistFileError>() {
                return "No valid tracks found in the playlist file".to_string();
            }
        }

        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    };

    use anyhow::anyhow;

    use crate::error::{
        domain::{LibraryError, PlaybackError},
        operational::{ErrorReporter, ResultExt},
    };

    #[derive(Debug)]
    struct TestError;

    impl Display for TestError {
        fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
            write!(f, "Test error")
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_result_ext_with_context() {
        let result: Result<i32, TestError> = Err(TestError);
        let error = result.add_context("Loading playlist").unwrap_err();

        assert_eq!(error.to_string(), "Loading playlist");
        assert_eq!(error.root_cause().to_string(), "Test error");
    }

    #[test]
    fn test_result_ext_with_contextf() {
        let result: Result<i32, TestError> = Err(TestError);
        let error = result.add_contextf(format!("Scanning {}", "/music")).unwrap_err();

        assert!(error.to_string().contains("Scanning /music"));
    }

    #[test]
    fn test_user_message_for_domain_errors() {
        let result: Result<(), LibraryError> = Err(LibraryError::NotFound {
            entity: "playlist".to_string(),
            id: 4,
        });
        let error = result.add_context("Exporting playlist").unwrap_err();
        assert_eq!(
            ErrorReporter::to_user_message(&error),
            "The playlist no longer exists"
        );

        let error = anyhow::Error::new(PlaybackError::EmptyQueue);
        assert_eq!(ErrorReporter::to_user_message(&error), "Nothing to play");
    }

    #[test]
    fn test_user_message_fallback() {
        let error = anyhow!("Test error message");
        assert_eq!(ErrorReporter::to_user_message(&error), "Test error message");
    }
}
