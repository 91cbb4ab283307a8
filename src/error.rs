use thiserror::Error;

/// Errors surfaced by the record, filter, AI and offline layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed field values. Caught at the form boundary; carries one
    /// message per violated constraint.
    #[error("VALIDATION: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("NOT_FOUND: {kind} {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("UNAUTHENTICATED: no active user session")]
    Unauthenticated,
    #[error("BACKEND: {0}")]
    Backend(String),
    #[error("AI_SERVICE: {0}")]
    AiService(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_joins_all_violations() {
        let err = Error::Validation(vec!["Title is required".into(), "Impact must be at most 5".into()]);
        assert_eq!(
            err.to_string(),
            "VALIDATION: Title is required; Impact must be at most 5"
        );
    }

    #[test]
    fn not_found_names_kind_and_id() {
        let err = Error::not_found("idea", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "NOT_FOUND: idea abc");
    }

    #[test]
    fn sqlite_errors_become_backend_errors() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Backend(_)));
    }
}
