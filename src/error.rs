//! Centralized error handling for graphstream.
//!
//! Every failure in the codec is surfaced as a [`GraphError`]; nothing is retried and nothing
//! is silently recovered. The variants follow the three failure families of the format:
//!
//! - **Malformed streams** ([`GraphError::Corrupt`], [`GraphError::ClassResolution`],
//!   [`GraphError::Io`]): bad varints, truncated input, ids that were never assigned, names
//!   that do not resolve to a registered class.
//! - **Unsupported values** ([`GraphError::Unsupported`], [`GraphError::TypeMismatch`]):
//!   a value the codec has no encoding for (multimaps, oversized strings, a value whose runtime
//!   class contradicts a final declared type).
//! - **Construction failures** ([`GraphError::Construction`],
//!   [`GraphError::AmbiguousField`]): a record class whose prototype cannot be built or whose
//!   field table is ill-formed.
//!
//! A partially written sink is never rolled back. Callers that see an error from a writer must
//! discard whatever bytes were produced.
//!
//! ## Usage
//!
//! ```rust
//! use graphstream::{GraphError, GraphStream, Value};
//!
//! match GraphStream::deserialize(b"not a stream") {
//!     Err(GraphError::Corrupt(msg)) => eprintln!("corrupt: {msg}"),
//!     Err(e) => eprintln!("other: {e}"),
//!     Ok(value) => println!("{value:?}"),
//! }
//! # let _ = Value::Null;
//! ```

use std::io;
use std::sync::Arc;

/// A specialized `Result` type for graphstream operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// The master error enum covering all failure domains of the codec.
///
/// This type is `Clone` so that a failure can be captured by one worker and reported by
/// another (see [`crate::GraphStream::serialize_all`]). I/O errors are wrapped in `Arc` for
/// that reason.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    /// Low-level I/O failure of the underlying sink or source.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// The stream is malformed: invalid varint, truncated data, an out-of-sequence id,
    /// an absurd length, wrong magic bytes or an unsupported version.
    #[error("corrupt stream: {0}")]
    Corrupt(String),

    /// A class name read from the stream is not known to this process.
    #[error("cannot resolve class '{name}'")]
    ClassResolution {
        /// The fully-qualified name as written in the stream.
        name: String,
    },

    /// The value has no encoding (for example a multimap).
    #[error("unsupported value of class '{class}': {reason}")]
    Unsupported {
        /// Runtime class of the offending value.
        class: String,
        /// What exactly is not supported.
        reason: String,
    },

    /// The prototype or a fresh instance of a record class could not be constructed.
    #[error("cannot construct an instance of '{class}': {reason}")]
    Construction {
        /// The record class.
        class: String,
        /// The constructor's own explanation.
        reason: String,
    },

    /// Two fields of one class hierarchy normalize to the same name.
    #[error("ambiguous field name '{field}' in class '{class}'")]
    AmbiguousField {
        /// The record class whose field table failed to build.
        class: String,
        /// The normalized field name that occurs twice.
        field: String,
    },

    /// A value does not fit the Rust type of the slot it is assigned to.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The class or shape the slot accepts.
        expected: String,
        /// A description of the value that was offered.
        found: String,
    },

    /// An error raised while reading or writing one specific field.
    #[error("field '{field}' of '{class}': {source}")]
    Field {
        /// Class declaring the field.
        class: String,
        /// Normalized field name.
        field: String,
        /// The underlying failure.
        #[source]
        source: Box<GraphError>,
    },

    /// The deflate layer failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// A serde-backed leaf failed to encode or decode through bincode.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A broken internal invariant. Please report it with a reproduction.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphError {
    /// Builds a [`GraphError::Corrupt`] from anything displayable.
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Builds a [`GraphError::Unsupported`].
    pub(crate) fn unsupported(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// Builds a [`GraphError::TypeMismatch`].
    pub fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Wraps `self` with the class and field it occurred in.
    ///
    /// Errors that already carry field context are not wrapped twice.
    pub fn in_field(self, class: &str, field: &str) -> Self {
        match self {
            Self::Field { .. } => self,
            other => Self::Field {
                class: class.to_string(),
                field: field.to_string(),
                source: Box::new(other),
            },
        }
    }
}

impl From<io::Error> for GraphError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Self::Corrupt(format!("unexpected end of stream: {err}"));
        }
        Self::Io(Arc::new(err))
    }
}
