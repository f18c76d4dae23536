//! Error types for the DAS library.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Position of a token inside a DAS file, used in parse diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    /// 1-based line number (binary payloads count as part of their field line).
    pub line: u32,
    /// Absolute byte offset from the start of the file.
    pub offset: u64,
    /// Innermost open scope, if any.
    pub scope: Option<&'static str>,
    /// Field being read, if any.
    pub field: Option<String>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, byte {}", self.line, self.offset)?;
        if let Some(scope) = self.scope {
            write!(f, ", scope {}", scope)?;
        }
        if let Some(field) = &self.field {
            write!(f, ", field {}", field)?;
        }
        Ok(())
    }
}

/// Main error type for DAS operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Signature bytes at the start of the file do not match
    #[error("Invalid DAS file: signature mismatch")]
    InvalidSignature,

    /// Signature was written but the writer never finalized the file
    #[error("DAS file was not finalized by its writer")]
    NotFinalized,

    /// Unsupported file format version
    #[error("Unsupported DAS version: {0}")]
    UnsupportedVersion(u16),

    /// File ends in the middle of a signature, scope or field
    #[error("Unexpected end of file ({0})")]
    UnexpectedEof(Location),

    /// Reading from the underlying file failed
    #[error("Read failed at byte {offset}: {source}")]
    ReadFailed {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// Malformed scope structure or token
    #[error("Syntax error: {msg} ({at})")]
    Syntax { msg: String, at: Location },

    /// Scope name not part of the format
    #[error("Unknown scope '{name}' ({at})")]
    UnknownScope { name: String, at: Location },

    /// Field key not recognized for its scope
    #[error("Unknown field '{key}' ({at})")]
    UnknownField { key: String, at: Location },

    /// A required field is absent from a closed scope
    #[error("Missing field {field} ({at})")]
    MissingField { field: &'static str, at: Location },

    /// A field payload cannot be interpreted
    #[error("Invalid value: {msg} ({at})")]
    InvalidValue { msg: String, at: Location },

    /// Scope opened in a parent it cannot nest in
    #[error("Scope {scope} cannot appear inside {parent} ({at})")]
    Nesting {
        scope: &'static str,
        parent: &'static str,
        at: Location,
    },

    /// Entity index out of bounds
    #[error("{kind} index {index} out of bounds (count: {count})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        count: usize,
    },

    /// Reader or writer configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Value cannot be encoded by the writer
    #[error("Cannot write value: {0}")]
    InvalidInput(String),

    /// Writer already finalized
    #[error("Output is finalized and cannot be modified")]
    Finalized,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a syntax error at a location.
    pub fn syntax(msg: impl Into<String>, at: Location) -> Self {
        Self::Syntax { msg: msg.into(), at }
    }

    /// Location carried by parse errors, if any.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::UnexpectedEof(at)
            | Self::Syntax { at, .. }
            | Self::UnknownScope { at, .. }
            | Self::UnknownField { at, .. }
            | Self::MissingField { at, .. }
            | Self::InvalidValue { at, .. }
            | Self::Nesting { at, .. } => Some(at),
            _ => None,
        }
    }
}

/// Result type alias for DAS operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::InvalidSignature;
        assert!(e.to_string().contains("signature"));

        let e = Error::IndexOutOfRange { kind: "buffer", index: 5, count: 3 };
        assert!(e.to_string().contains("5"));
        assert!(e.to_string().contains("3"));
    }

    #[test]
    fn test_location_display() {
        let at = Location {
            line: 7,
            offset: 120,
            scope: Some("BUFFER"),
            field: Some("DATALEN".to_string()),
        };
        let e = Error::syntax("bad separator", at);
        let text = e.to_string();
        assert!(text.contains("line 7"));
        assert!(text.contains("byte 120"));
        assert!(text.contains("BUFFER"));
        assert!(text.contains("DATALEN"));
        assert_eq!(e.location().map(|l| l.line), Some(7));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
