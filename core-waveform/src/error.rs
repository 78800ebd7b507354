//! # Waveform Error Types
//!
//! Error types for decoding, assembling and reducing audio into waveforms.
//!
//! Only source-level failures (`SourceUnreadable`, `NoAudioTrack`,
//! `UnsupportedCodec`) are fatal for a decode. Allocation exhaustion and
//! decoder quirks never show up here: they degrade to a shorter, internally
//! consistent result (see [`crate::assembler::AssemblyOutcome`]).

use thiserror::Error;

/// Errors that can occur while producing a waveform.
#[derive(Error, Debug)]
pub enum WaveformError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// The source could not be opened or read.
    #[error("Failed to open audio source: {0}")]
    SourceUnreadable(String),

    /// The source contains no stream that identifies as audio.
    #[error("No audio track found: {0}")]
    NoAudioTrack(String),

    /// The audio track uses a codec the decoder backend cannot handle.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// Decoder encountered an unrecoverable internal error.
    #[error("Decoder error: {0}")]
    DecoderError(String),

    /// Decoding was cancelled by the caller.
    #[error("Decoding cancelled")]
    Cancelled,

    // ========================================================================
    // Caller Input Errors
    // ========================================================================
    /// Decode configuration failed validation.
    #[error("Invalid decode configuration: {0}")]
    InvalidConfig(String),

    /// Block geometry failed validation.
    #[error("Invalid block geometry: {0}")]
    InvalidGeometry(String),

    /// Serialized descriptor payload is malformed.
    #[error("Malformed descriptor payload: {0}")]
    WireFormat(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WaveformError {
    /// Returns `true` if this error aborts a decode before any waveform exists.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WaveformError::SourceUnreadable(_)
                | WaveformError::NoAudioTrack(_)
                | WaveformError::UnsupportedCodec(_)
        )
    }

    /// Returns `true` if this error is caused by the audio source itself.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            WaveformError::SourceUnreadable(_)
                | WaveformError::NoAudioTrack(_)
                | WaveformError::Io(_)
        )
    }
}

/// Result type for waveform operations.
pub type Result<T> = std::result::Result<T, WaveformError>;
