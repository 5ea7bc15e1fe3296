//! Runtime configuration for the object graph engine.
//!
//! Replaces compile-time feature flags with a single knob set a caller
//! supplies at load time: passwords for the Standard Security Handler,
//! how strictly to treat structural violations, whether streams are
//! decoded eagerly, and which PDF version the reader conformance level
//! accepts.

/// How strictly the context treats structural violations (malformed xref
/// entries, objects that don't parse, streams with a wrong `/Length`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Fail on the first structural violation.
    Strict,
    /// Recover where possible: fall back to bypass scanning, degrade a
    /// corrupt object to `Object::Null`, warn instead of erroring.
    Relaxed,
}

/// Minimum PDF version the reader accepts.
///
/// `V1_4` rejects files whose only cross-reference structure is an xref
/// stream (a PDF 1.5 feature); `V1_5` accepts both classic and stream
/// xref sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderConformance {
    /// Reject xref-stream-only documents.
    V1_4,
    /// Accept classic and xref-stream documents.
    V1_5,
}

/// Runtime configuration for opening and dereferencing a PDF.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Owner password to try against the Standard Security Handler.
    pub owner_password: Vec<u8>,
    /// User password to try against the Standard Security Handler.
    pub user_password: Vec<u8>,
    /// Strict or relaxed handling of structural violations.
    pub validation_mode: ValidationMode,
    /// Decode every stream's content eagerly at load time instead of
    /// lazily on first access.
    pub decode_all_streams: bool,
    /// Minimum PDF version the reader accepts.
    pub reader_conformance: ReaderConformance,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::relaxed()
    }
}

impl Configuration {
    /// Strict mode: fail on the first structural violation, reject xref-
    /// stream-only documents under PDF 1.4 conformance.
    pub fn strict() -> Self {
        Self {
            owner_password: Vec::new(),
            user_password: Vec::new(),
            validation_mode: ValidationMode::Strict,
            decode_all_streams: false,
            reader_conformance: ReaderConformance::V1_5,
        }
    }

    /// Relaxed mode (default): recover from structural damage where
    /// possible, accept both xref forms.
    pub fn relaxed() -> Self {
        Self {
            owner_password: Vec::new(),
            user_password: Vec::new(),
            validation_mode: ValidationMode::Relaxed,
            decode_all_streams: false,
            reader_conformance: ReaderConformance::V1_5,
        }
    }

    /// Set the user password to try during authentication.
    pub fn with_user_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.user_password = password.into();
        self
    }

    /// Set the owner password to try during authentication.
    pub fn with_owner_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.owner_password = password.into();
        self
    }

    /// Enable or disable eager stream decoding.
    pub fn with_decode_all_streams(mut self, enable: bool) -> Self {
        self.decode_all_streams = enable;
        self
    }

    /// Set the minimum PDF version the reader accepts.
    pub fn with_reader_conformance(mut self, conformance: ReaderConformance) -> Self {
        self.reader_conformance = conformance;
        self
    }

    /// True under `Strict` validation.
    pub fn is_strict(&self) -> bool {
        self.validation_mode == ValidationMode::Strict
    }
}
