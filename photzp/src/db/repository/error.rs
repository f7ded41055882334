//! Record-store failures.
//!
//! Every store failure is a [`RepositoryError`]. The calibration batch treats
//! any of them as fatal, so the context carried here is what ends up in the
//! abort message.

use std::fmt;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where a store failure happened and whether trying again can help.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Store operation that failed, e.g. `upsert_calibration` or `write_trend`.
    pub operation: Option<String>,
    /// Free-form detail such as a pool size or attempt number.
    pub details: Option<String>,
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.operation.as_deref().unwrap_or("-");
        write!(f, "(op {op}")?;
        if let Some(details) = &self.details {
            write!(f, "; {details}")?;
        }
        if self.retryable {
            f.write_str("; retryable")?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Store unreachable or pool exhausted. Always retryable.
    #[error("record store unavailable: {message} {context}")]
    ConnectionError {
        message: String,
        context: ErrorContext,
    },

    /// The store rejected a read or write.
    #[error("record store query failed: {message} {context}")]
    QueryError {
        message: String,
        context: ErrorContext,
    },

    /// Backend selection or settings are unusable.
    #[error("record store misconfigured: {message} {context}")]
    ConfigurationError {
        message: String,
        context: ErrorContext,
    },

    /// Row decoding, migrations or a panicked blocking task.
    #[error("record store internal failure: {message} {context}")]
    InternalError {
        message: String,
        context: ErrorContext,
    },
}

impl RepositoryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::connection_with_context(message, ErrorContext::default())
    }

    pub fn connection_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::ConnectionError {
            message: message.into(),
            context: context.retryable(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::QueryError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::internal_with_context(message, ErrorContext::default())
    }

    pub fn internal_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::InternalError {
            message: message.into(),
            context,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::ConnectionError { context, .. }
            | Self::QueryError { context, .. }
            | Self::ConfigurationError { context, .. }
            | Self::InternalError { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::ConnectionError { context, .. }
            | Self::QueryError { context, .. }
            | Self::ConfigurationError { context, .. }
            | Self::InternalError { context, .. } => context,
        }
    }

    /// Whether the Postgres store should retry the operation.
    pub fn is_retryable(&self) -> bool {
        self.context().retryable
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::result::Error> for RepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(kind, info) => {
                let mut context = ErrorContext::default().with_details(format!("{kind:?}"));
                // Concurrent upserts of the same image can lose a serialization race.
                if matches!(kind, DatabaseErrorKind::SerializationFailure) {
                    context = context.retryable();
                }
                Self::QueryError {
                    message: info.message().to_string(),
                    context,
                }
            }
            Error::DeserializationError(e) | Error::SerializationError(e) => {
                Self::internal(e.to_string())
            }
            other => Self::query(other.to_string()),
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::r2d2::PoolError> for RepositoryError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::connection_with_context(err.to_string(), ErrorContext::new("checkout"))
    }
}
