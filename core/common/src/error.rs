//! Common error types for folio.

use thiserror::Error;

/// Raw OS error code for "no space left on device" on Unix targets.
const ENOSPC: i32 = 28;

/// Top-level error type for export operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Reading or writing a zip archive failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A book title could not be resolved by the text library.
    #[error("Unknown book: {0}")]
    BookName(String),

    /// A category path does not exist in the table of contents.
    #[error("Category not found: {0}")]
    Category(String),

    /// Network request failed.
    #[error("Network error: {0}")]
    Network(String),

    /// The text library collaborator failed.
    #[error("Library error: {0}")]
    Library(String),

    /// The export volume ran out of space.
    #[error("Disk full: {0}")]
    DiskFull(String),
}

impl Error {
    /// Whether this error means the export volume is out of space.
    pub fn is_disk_full(&self) -> bool {
        match self {
            Error::DiskFull(_) => true,
            Error::Io(e) => {
                e.kind() == std::io::ErrorKind::StorageFull || e.raw_os_error() == Some(ENOSPC)
            }
            _ => false,
        }
    }

    /// Promote an out-of-space I/O error to [`Error::DiskFull`], leave others as-is.
    pub fn classify(self) -> Self {
        if matches!(self, Error::Io(_)) && self.is_disk_full() {
            Error::DiskFull(self.to_string())
        } else {
            self
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.classify() == serde_json::error::Category::Io {
            // serde_json hands back the wrapped io::Error untouched.
            return Error::Io(std::io::Error::from(e)).classify();
        }
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_full_detection() {
        let io = std::io::Error::from_raw_os_error(ENOSPC);
        assert!(Error::Io(io).is_disk_full());

        let io = std::io::Error::new(std::io::ErrorKind::StorageFull, "full");
        assert!(Error::Io(io).is_disk_full());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!Error::Io(io).is_disk_full());
        assert!(!Error::NotFound("x".to_string()).is_disk_full());
    }

    #[test]
    fn test_classify_promotes_out_of_space() {
        let err = Error::Io(std::io::Error::from_raw_os_error(ENOSPC)).classify();
        assert!(matches!(err, Error::DiskFull(_)));

        let err = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).classify();
        assert!(matches!(err, Error::Io(_)));
    }
}
