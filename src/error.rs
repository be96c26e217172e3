//! Error types for loader operations.

use std::sync::Arc;

use crate::loadable::Suspension;

/// Errors surfaced by a [`Loader`](crate::Loader).
///
/// [`LoaderError::Suspend`] is not a failure. It carries the in-flight future a
/// suspend-capable caller should wait on before asking again, and it exists so
/// callers can propagate "not ready yet" with the `?` operator. Every other
/// variant is a genuine error.
///
/// Execution failures can be produced from any `anyhow::Error`, so executors can
/// use `?` on their own fallible calls:
///
/// ```
/// use query_loader::LoaderError;
///
/// fn parse(input: &str) -> Result<i64, LoaderError> {
///     Ok(input.parse::<i64>().map_err(anyhow::Error::from)?)
/// }
///
/// assert!(parse("12").is_ok());
/// assert!(parse("twelve").unwrap_err().execution_error().is_some());
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoaderError {
    /// Execution is still in flight.
    #[error("loader suspended: waiting for pending execution")]
    Suspend {
        /// Future that settles once the pending execution has been retried.
        pending: Suspension,
    },

    /// The query compiler rejected the query and variables pair.
    #[error("failed to compile query `{query}`: {reason}")]
    Compile {
        /// Identifier of the query that failed to compile.
        query: String,
        /// Error reported by the compiler.
        reason: Arc<anyhow::Error>,
    },

    /// The executor, or a future it handed out, failed.
    #[error("execution failed: {0}")]
    Execution(Arc<anyhow::Error>),

    /// A variable bag was built from a JSON value that is not an object.
    #[error("variables must be a JSON object, found {found}")]
    InvalidVariables {
        /// Kind of JSON value that was supplied.
        found: &'static str,
    },

    /// The loader was used after [`Loader::dispose`](crate::Loader::dispose).
    #[error("loader has been disposed")]
    Disposed,
}

impl From<anyhow::Error> for LoaderError {
    fn from(err: anyhow::Error) -> Self {
        LoaderError::Execution(Arc::new(err))
    }
}

impl LoaderError {
    /// Build a compile error for the query with the given identifier.
    pub fn compile(query: impl Into<String>, reason: impl Into<anyhow::Error>) -> Self {
        LoaderError::Compile {
            query: query.into(),
            reason: Arc::new(reason.into()),
        }
    }

    /// Returns `true` if this is the pending signal rather than a failure.
    pub fn is_suspend(&self) -> bool {
        matches!(self, LoaderError::Suspend { .. })
    }

    /// Returns the in-flight future if this is the pending signal.
    pub fn pending(&self) -> Option<&Suspension> {
        match self {
            LoaderError::Suspend { pending } => Some(pending),
            _ => None,
        }
    }

    /// Returns the inner error if this is an `Execution` failure.
    pub fn execution_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            LoaderError::Execution(e) => Some(e),
            _ => None,
        }
    }

    /// Attempts to downcast the underlying compile or execution error.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        match self {
            LoaderError::Execution(e) => e.downcast_ref::<E>(),
            LoaderError::Compile { reason, .. } => reason.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Offline;

    impl std::fmt::Display for Offline {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "network offline")
        }
    }

    impl std::error::Error for Offline {}

    #[test]
    fn test_execution_error_from_anyhow() {
        let err: LoaderError = anyhow::anyhow!("store unavailable").into();
        assert!(err.execution_error().is_some());
        assert!(!err.is_suspend());
        assert_eq!(err.to_string(), "execution failed: store unavailable");
    }

    #[test]
    fn test_downcast_execution_error() {
        let err: LoaderError = anyhow::Error::from(Offline).into();
        assert_eq!(err.downcast_ref::<Offline>(), Some(&Offline));
        assert!(err.downcast_ref::<std::io::Error>().is_none());
    }

    #[test]
    fn test_compile_error_display() {
        let err = LoaderError::compile("UserQuery", Offline);
        assert_eq!(
            err.to_string(),
            "failed to compile query `UserQuery`: network offline"
        );
        assert!(err.downcast_ref::<Offline>().is_some());
    }

    #[test]
    fn test_suspend_is_not_execution_error() {
        let err = LoaderError::Suspend {
            pending: Suspension::settled(),
        };
        assert!(err.is_suspend());
        assert!(err.pending().is_some());
        assert!(err.execution_error().is_none());
    }
}
