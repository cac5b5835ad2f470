use thiserror::Error;

/// Failures raised by the document store and the roster operations built on it.
#[derive(Debug, Error)]
pub enum RosterError {
    /// The addressed document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A write payload still carried an absent marker.
    #[error("payload contains an absent value at `{0}`")]
    AbsentValue(String),

    /// The backend rejected a read or write.
    #[error("backend failure: {0}")]
    Backend(String),

    /// Stored data did not have the expected shape.
    #[error("malformed document: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, RosterError>;
