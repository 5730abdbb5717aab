//! Common error types used throughout metatrack.

/// Common error type for metatrack.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The time base was misused (queried before its epoch, or a reading
    /// fell before the epoch).
    #[error("Clock error: {0}")]
    Clock(String),

    /// A timestamp could not be represented in the requested timescale.
    #[error("Time overflow: {0}")]
    Overflow(String),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a new Clock error.
    pub fn clock<S: Into<String>>(msg: S) -> Self {
        Self::Clock(msg.into())
    }

    /// Create a new Overflow error.
    pub fn overflow<S: Into<String>>(msg: S) -> Self {
        Self::Overflow(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::clock("no epoch");
        assert_eq!(err.to_string(), "Clock error: no epoch");

        let err = Error::overflow("too large");
        assert_eq!(err.to_string(), "Time overflow: too large");

        let err = Error::invalid_input("zero timescale");
        assert_eq!(err.to_string(), "Invalid input: zero timescale");
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(Error::clock("x"), Error::Clock(_)));
        assert!(matches!(Error::overflow("x"), Error::Overflow(_)));
        assert!(matches!(Error::invalid_input("x"), Error::InvalidInput(_)));
    }
}
