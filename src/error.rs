//! Error types for the PDF object graph engine.

/// Result type alias for PDF library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while locating the cross-reference structure,
/// materializing the object graph, or decrypting objects.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected `%PDF-`).
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// The document declares a version this crate's reader conformance level rejects.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// Parse error at a specific byte offset.
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where the error occurred.
        offset: usize,
        /// Reason for the parse failure.
        reason: String,
    },

    /// Non-fatal parse warning surfaced under relaxed validation.
    #[error("Parse warning at byte {offset}: {message}")]
    ParseWarning {
        /// Byte offset where the warning occurred.
        offset: usize,
        /// Warning message.
        message: String,
    },

    /// The document is corrupt in a way no repair strategy recovered.
    #[error("Corrupt PDF structure: {0}")]
    Corrupt(String),

    /// No cross-reference section could be located or reconstructed.
    #[error("Invalid cross-reference table: {0}")]
    InvalidXref(String),

    /// Referenced object not found in the cross-reference table.
    #[error("Object not found: {0} {1} R")]
    NotFound(u32, u16),

    /// Object has the wrong type for the context it was used in.
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type.
        expected: String,
        /// Actual object type found.
        found: String,
    },

    /// Unexpected end of file.
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error.
    #[error("UTF-8 decoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Generic unsupported-feature error.
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Stream decoding error (filter pipeline failure).
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// A `/Filter` name this crate's filter service does not implement.
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// The Standard Security Handler rejected every password tried.
    #[error("Authentication failed: no password (user or owner) unlocked the document")]
    AuthFailed,

    /// An encryption dictionary names an algorithm/revision this crate doesn't implement
    /// (e.g. AES-256/R5/R6, public-key security handlers).
    #[error("Unsupported encryption scheme: {0}")]
    UnsupportedEncryption(String),

    /// Circular reference detected while resolving the object graph.
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded while resolving nested indirect references.
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}
