use thiserror::Error;

// ─── Backend error classification ────────────────────────────────

/// How the driver should react to a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Serialization conflict or deadlock. Retry the same unit of work now.
    Transient,
    /// The unit of work failed. Roll back, count it, keep going.
    Transaction,
    /// The connection is gone or unusable. Stop the run.
    Connection,
}

/// A backend failure with its classification already decided.
///
/// Built from `sqlx::Error` at the connection boundary so nothing above
/// the `db` module has to inspect driver error types.
#[derive(Debug, Clone, Error)]
#[error("{class:?} backend error: {message}")]
pub struct BackendError {
    pub class: ErrorClass,
    pub message: String,
}

impl BackendError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }

    pub fn is_fatal(&self) -> bool {
        self.class == ErrorClass::Connection
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        let class = match &err {
            sqlx::Error::Database(db) => classify_sqlstate(db.code().as_deref()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => ErrorClass::Connection,
            _ => ErrorClass::Transaction,
        };
        Self::new(class, err.to_string())
    }
}

/// Maps a SQLSTATE code onto a driver reaction.
///
/// Only serialization failures (40001, which also covers CockroachDB's
/// "restart transaction" errors) and deadlocks (40P01) are retried.
/// 40003 (statement completion unknown) is not: the insert may have landed.
pub fn classify_sqlstate(code: Option<&str>) -> ErrorClass {
    match code {
        Some("40001") | Some("40P01") => ErrorClass::Transient,
        Some(c) if c.starts_with("08") => ErrorClass::Connection,
        Some("57P01") | Some("57P02") | Some("57P03") => ErrorClass::Connection,
        _ => ErrorClass::Transaction,
    }
}

impl From<IdentError> for BackendError {
    fn from(err: IdentError) -> Self {
        Self::new(ErrorClass::Transaction, err.to_string())
    }
}

// ─── Identifier validation ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier `{0}` is longer than 63 bytes")]
    TooLong(String),
    #[error("identifier `{0}` must be ASCII letters, digits or `_` and not start with a digit")]
    Invalid(String),
}

// ─── Chart input / rendering ─────────────────────────────────────

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("could not read {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("{0} contains no data rows")]
    Empty(String),
    #[error("rendering failed: {0}")]
    Render(String),
}
