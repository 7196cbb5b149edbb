//! Error types for the snapshot core.
//!
//! Всё, что нарушает инварианты снапшота, поднимается синхронно в точке нарушения
//! и не ретраится внутри ядра. CLI-слой заворачивает эти ошибки в anyhow.

use std::fmt;
use thiserror::Error;

/// Stable error classification (для логов и JSON-вывода CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    DuplicateName,
    DuplicateIndex,
    UniquenessViolation,
    Schema,
    NotFound,
    IncompleteSpecialTreatment,
    LoginIncomplete,
    Io,
    Json,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::DuplicateName => "duplicate_name",
            ErrorKind::DuplicateIndex => "duplicate_index",
            ErrorKind::UniquenessViolation => "uniqueness_violation",
            ErrorKind::Schema => "schema",
            ErrorKind::NotFound => "not_found",
            ErrorKind::IncompleteSpecialTreatment => "incomplete_special_treatment",
            ErrorKind::LoginIncomplete => "login_incomplete",
            ErrorKind::Io => "io",
            ErrorKind::Json => "json",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("[validation] {0}")]
    Validation(String),

    /// Коллизия имени в пределах области уникальности (object store / database).
    #[error("[duplicate_name] duplicate {scope} name: {name}")]
    DuplicateName { scope: &'static str, name: String },

    #[error("[duplicate_index] cannot create duplicate index: {0}")]
    DuplicateIndex(String),

    #[error("[uniqueness_violation] duplicate value for unique index '{index}' in object store '{store}'")]
    UniquenessViolation { store: String, index: String },

    #[error("[schema] {entity}: {message}")]
    Schema { entity: &'static str, message: String },

    #[error("[not_found] {what}: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("[incomplete_special_treatment] hook did not cover {database}/{object_store}")]
    IncompleteSpecialTreatment {
        database: String,
        object_store: String,
    },

    #[error("[login_incomplete] {0}")]
    LoginIncomplete(String),

    #[error("[io] {0}")]
    Io(#[from] std::io::Error),

    #[error("[json] {0}")]
    Json(#[from] serde_json::Error),
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SnapshotError::Validation(_) => ErrorKind::Validation,
            SnapshotError::DuplicateName { .. } => ErrorKind::DuplicateName,
            SnapshotError::DuplicateIndex(_) => ErrorKind::DuplicateIndex,
            SnapshotError::UniquenessViolation { .. } => ErrorKind::UniquenessViolation,
            SnapshotError::Schema { .. } => ErrorKind::Schema,
            SnapshotError::NotFound { .. } => ErrorKind::NotFound,
            SnapshotError::IncompleteSpecialTreatment { .. } => {
                ErrorKind::IncompleteSpecialTreatment
            }
            SnapshotError::LoginIncomplete(_) => ErrorKind::LoginIncomplete,
            SnapshotError::Io(_) => ErrorKind::Io,
            SnapshotError::Json(_) => ErrorKind::Json,
        }
    }

    // Convenience constructors

    pub fn validation(message: impl Into<String>) -> Self {
        SnapshotError::Validation(message.into())
    }

    pub fn schema(entity: &'static str, message: impl Into<String>) -> Self {
        SnapshotError::Schema {
            entity,
            message: message.into(),
        }
    }

    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        SnapshotError::NotFound {
            what,
            name: name.into(),
        }
    }

    pub fn duplicate_name(scope: &'static str, name: impl Into<String>) -> Self {
        SnapshotError::DuplicateName {
            scope,
            name: name.into(),
        }
    }

    pub fn incomplete(database: impl Into<String>, object_store: impl Into<String>) -> Self {
        SnapshotError::IncompleteSpecialTreatment {
            database: database.into(),
            object_store: object_store.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_display_prefix() {
        let errs = vec![
            SnapshotError::validation("bad"),
            SnapshotError::duplicate_name("database", "wawc"),
            SnapshotError::DuplicateIndex("id".into()),
            SnapshotError::UniquenessViolation {
                store: "user".into(),
                index: "id".into(),
            },
            SnapshotError::schema("ObjectStoreSnapshot", "missing key \"data\""),
            SnapshotError::not_found("database", "wawc"),
            SnapshotError::incomplete("fts-storage", "fts-v3-index"),
            SnapshotError::LoginIncomplete("timeout".into()),
        ];
        for e in errs {
            let msg = e.to_string();
            assert!(
                msg.starts_with(&format!("[{}]", e.kind().as_str())),
                "unexpected display: {msg}"
            );
        }
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SnapshotError = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops")
            .err()
            .unwrap();
        let err: SnapshotError = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Json);
    }
}
