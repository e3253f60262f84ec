//! Error types for the MeshDB engine.
//!
//! All public APIs return `MeshResult<T>` — no panics in library code.

use thiserror::Error;

/// Unified error type for all MeshDB operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Requested table does not exist
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Requested data source does not exist
    #[error("data source '{0}' not found")]
    SourceNotFound(String),

    /// No route registered for a table and no usable default
    #[error("no route for table '{0}'")]
    RouteNotFound(String),

    /// Requested query id is not registered with the runtime
    #[error("query '{0}' not found")]
    QueryNotFound(String),

    /// Requested backup does not exist
    #[error("backup '{0}' not found")]
    BackupNotFound(String),

    /// Name collision on register (source, backup, table, ...)
    #[error("'{0}' already exists")]
    AlreadyExists(String),

    /// Bad filter, bad config, dimension mismatch, malformed value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Router used before a manager was attached
    #[error("router not initialized")]
    RouterNotInitialized,

    /// Connection to a data source lost or never established
    #[error("data source '{name}' unavailable: {reason}")]
    SourceUnavailable { name: String, reason: String },

    /// Transaction abort or unique index violation; retried internally
    /// up to a small bound before escalating
    #[error("conflict: {0}")]
    Conflict(String),

    /// Query was canceled; propagated untouched through every operator
    #[error("query canceled")]
    Canceled,

    /// Checksum mismatch or undecodable stored value
    #[error("integrity error: {0}")]
    Integrity(String),

    /// sled embedded database error
    #[error("sled error: {source}")]
    Sled {
        #[from]
        source: sled::Error,
    },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Type mismatch between expected and actual values
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// SQL parsing error
    #[error("SQL parse error: {message}\nSQL: {sql}")]
    SqlParse { message: String, sql: String },

    /// SQL execution error
    #[error("SQL execution error: {message}\nContext: {context}")]
    SqlExecution { message: String, context: String },

    /// Unsupported SQL feature
    #[error("SQL feature not supported: {feature}\nHint: {hint}")]
    SqlNotSupported { feature: String, hint: String },

    /// Feature not yet implemented
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// Result type alias for all MeshDB operations.
pub type MeshResult<T> = Result<T, MeshError>;

impl MeshError {
    /// True for error kinds the reliability layer may retry; everything
    /// else surfaces untouched.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MeshError::Conflict(_) | MeshError::Io { .. } | MeshError::SourceUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        MeshError::Serialization(err.to_string())
    }
}

impl From<sqlparser::parser::ParserError> for MeshError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        MeshError::SqlParse {
            message: err.to_string(),
            sql: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_table_not_found() {
        let err = MeshError::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "table 'users' not found");
    }

    #[test]
    fn error_display_source_unavailable() {
        let err = MeshError::SourceUnavailable {
            name: "orders_ds".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("orders_ds"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn error_display_router_not_initialized() {
        assert_eq!(
            MeshError::RouterNotInitialized.to_string(),
            "router not initialized"
        );
    }

    #[test]
    fn canceled_is_not_retryable() {
        assert!(!MeshError::Canceled.is_retryable());
        assert!(MeshError::Conflict("txn abort".to_string()).is_retryable());
    }

    #[test]
    fn serde_error_converts_to_serialization() {
        let bad: Result<i64, _> = serde_json::from_str("not json");
        let err: MeshError = bad.unwrap_err().into();
        assert!(matches!(err, MeshError::Serialization(_)));
    }
}
