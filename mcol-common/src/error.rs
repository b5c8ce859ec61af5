//! # Error Taxonomy
//!
//! Purpose: One error enum shared by producers, the server, and remote
//! clients, with a stable numeric code so failures can cross the wire as a
//! response status.
//!
//! ## Usage Notes
//!
//! - `STATUS_OK` (0) is never produced by `code()`; every variant maps to a
//!   non-zero status.
//! - Transport failures carry a message; everything else is a plain tag so
//!   callers can `matches!` on it cheaply.

use thiserror::Error;

/// Result alias used across the workspace.
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Errors returned by collector operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectorError {
    /// Namespace or name is missing or too long.
    #[error("invalid metric name")]
    InvalidName,
    /// Buffer or table allocation failed.
    #[error("allocation failed")]
    Allocation,
    /// Invalid argument (missing client, stale handle, zero buckets, ...).
    #[error("invalid argument")]
    InvalidArgs,
    /// Request addressed to a provider id this server does not host.
    #[error("invalid provider id")]
    InvalidProvider,
    /// Unknown or colliding metric id.
    #[error("invalid metric id")]
    InvalidMetric,
    /// Update value violates the metric kind.
    #[error("invalid metric update value")]
    InvalidValue,
    /// Unknown backend name.
    #[error("invalid backend type")]
    InvalidBackend,
    /// Configuration could not be parsed or validated.
    #[error("invalid configuration")]
    InvalidConfig,
    /// Token rejected by the hosting runtime.
    #[error("invalid token")]
    InvalidToken,
    /// Network, framing, or connection failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Operation is not supported by this backend.
    #[error("unsupported operation")]
    UnsupportedOperation,
    /// Operation is not permitted.
    #[error("forbidden operation")]
    ForbiddenOperation,
    /// The metric buffer reached its capacity; the sample was not recorded.
    #[error("metric buffer is full")]
    BufferFull,
    /// Anything else.
    #[error("other error")]
    Other,
}

impl CollectorError {
    /// Returns the wire status code for this error.
    pub fn code(&self) -> u16 {
        match self {
            CollectorError::InvalidName => 1,
            CollectorError::Allocation => 2,
            CollectorError::InvalidArgs => 3,
            CollectorError::InvalidProvider => 4,
            CollectorError::InvalidMetric => 5,
            CollectorError::InvalidValue => 6,
            CollectorError::InvalidBackend => 7,
            CollectorError::InvalidConfig => 8,
            CollectorError::InvalidToken => 9,
            CollectorError::Transport(_) => 10,
            CollectorError::UnsupportedOperation => 11,
            CollectorError::ForbiddenOperation => 12,
            CollectorError::BufferFull => 13,
            CollectorError::Other => 14,
        }
    }

    /// Maps a non-zero wire status back to an error.
    ///
    /// Unknown codes collapse to `Other`; a transport failure reported by the
    /// peer loses its message on the way.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => CollectorError::InvalidName,
            2 => CollectorError::Allocation,
            3 => CollectorError::InvalidArgs,
            4 => CollectorError::InvalidProvider,
            5 => CollectorError::InvalidMetric,
            6 => CollectorError::InvalidValue,
            7 => CollectorError::InvalidBackend,
            8 => CollectorError::InvalidConfig,
            9 => CollectorError::InvalidToken,
            10 => CollectorError::Transport("reported by peer".to_string()),
            11 => CollectorError::UnsupportedOperation,
            12 => CollectorError::ForbiddenOperation,
            13 => CollectorError::BufferFull,
            _ => CollectorError::Other,
        }
    }

    /// Shorthand for a transport error with a message.
    pub fn transport(message: impl Into<String>) -> Self {
        CollectorError::Transport(message.into())
    }
}

impl From<std::io::Error> for CollectorError {
    fn from(err: std::io::Error) -> Self {
        CollectorError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_nonzero_and_unique() {
        let all = [
            CollectorError::InvalidName,
            CollectorError::Allocation,
            CollectorError::InvalidArgs,
            CollectorError::InvalidProvider,
            CollectorError::InvalidMetric,
            CollectorError::InvalidValue,
            CollectorError::InvalidBackend,
            CollectorError::InvalidConfig,
            CollectorError::InvalidToken,
            CollectorError::transport("x"),
            CollectorError::UnsupportedOperation,
            CollectorError::ForbiddenOperation,
            CollectorError::BufferFull,
            CollectorError::Other,
        ];

        for i in 0..all.len() {
            assert_ne!(all[i].code(), 0);
            for j in (i + 1)..all.len() {
                assert_ne!(all[i].code(), all[j].code());
            }
        }
    }

    #[test]
    fn from_code_restores_tag_variants() {
        assert_eq!(CollectorError::from_code(5), CollectorError::InvalidMetric);
        assert_eq!(CollectorError::from_code(13), CollectorError::BufferFull);
        assert!(matches!(CollectorError::from_code(10), CollectorError::Transport(_)));
        assert_eq!(CollectorError::from_code(999), CollectorError::Other);
    }

    #[test]
    fn io_error_becomes_transport() {
        let err: CollectorError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(err, CollectorError::Transport(msg) if msg.contains("refused")));
    }
}
