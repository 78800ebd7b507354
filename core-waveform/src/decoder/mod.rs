//! # Symphonia Decoder Adapter
//!
//! Default [`DecoderBackend`](crate::traits::DecoderBackend) built on the
//! Symphonia pure-Rust audio library.
//!
//! ## Supported Formats
//!
//! | Container | Codec | Codec identifier |
//! |-----------|-------|------------------|
//! | MP3 | MPEG-1/2 Audio Layer III | `audio/mpeg` |
//! | MP4 / ADTS | AAC | `audio/mp4a-latm` |
//! | FLAC | Free Lossless Audio Codec | `audio/flac` |
//! | Ogg | Vorbis | `audio/vorbis` |
//! | MP4 | ALAC | `audio/alac` |
//! | WAV / AIFF | PCM | `audio/raw` |
//!
//! ## Architecture
//!
//! ```text
//! AudioSource → MediaSourceStream → FormatReader ──▶ SymphoniaReader
//!                                   codec params ──▶ SymphoniaPcmDecoder
//! ```
//!
//! The reader hands out one Symphonia packet per access unit. The decoder
//! decodes each packet as it is fed, converts it to interleaved i16 LE bytes
//! and queues it for the assembler; a bounded queue depth gives the
//! assembler's input/output polling something real to wait on.

mod format_detector;
mod sample_converter;
mod symphonia;

pub use self::symphonia::{SymphoniaBackend, SymphoniaPcmDecoder, SymphoniaReader};
pub use format_detector::FormatDetector;
pub use sample_converter::SampleConverter;
