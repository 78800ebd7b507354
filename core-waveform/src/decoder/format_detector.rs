//! # Format Detection
//!
//! Probe hints for Symphonia and the mapping from Symphonia codec types to
//! MIME-like codec identifiers.

use crate::traits::AAC_LATM_MIME;
use std::path::Path;
use symphonia::core::codecs::{
    CodecType, CODEC_TYPE_AAC, CODEC_TYPE_ALAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP1, CODEC_TYPE_MP2,
    CODEC_TYPE_MP3, CODEC_TYPE_OPUS, CODEC_TYPE_PCM_ALAW, CODEC_TYPE_PCM_F32BE,
    CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_F64BE, CODEC_TYPE_PCM_F64LE, CODEC_TYPE_PCM_MULAW,
    CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24BE, CODEC_TYPE_PCM_S24LE,
    CODEC_TYPE_PCM_S32BE, CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_S8, CODEC_TYPE_PCM_U8,
    CODEC_TYPE_VORBIS,
};
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Format detector for audio streams.
pub struct FormatDetector;

impl FormatDetector {
    /// Create a probe hint from a file path's extension.
    pub fn hint_from_path(path: &Path) -> Hint {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(extension) => Self::hint_from_extension(extension),
            None => {
                debug!("No file extension found, probe will auto-detect");
                Hint::new()
            }
        }
    }

    /// Create a probe hint from a bare extension (`"mp3"`, `".flac"`).
    pub fn hint_from_extension(extension: &str) -> Hint {
        let mut hint = Hint::new();
        let extension = extension.trim_start_matches('.');
        if !extension.is_empty() {
            debug!("Setting probe hint extension: {}", extension);
            hint.with_extension(extension);
        }
        hint
    }

    /// MIME-like identifier for a Symphonia codec type.
    pub fn codec_mime(codec_type: CodecType) -> &'static str {
        if codec_type == CODEC_TYPE_MP3 || codec_type == CODEC_TYPE_MP2 || codec_type == CODEC_TYPE_MP1
        {
            "audio/mpeg"
        } else if codec_type == CODEC_TYPE_AAC {
            AAC_LATM_MIME
        } else if codec_type == CODEC_TYPE_FLAC {
            "audio/flac"
        } else if codec_type == CODEC_TYPE_VORBIS {
            "audio/vorbis"
        } else if codec_type == CODEC_TYPE_OPUS {
            "audio/opus"
        } else if codec_type == CODEC_TYPE_ALAC {
            "audio/alac"
        } else if Self::is_pcm(codec_type) {
            "audio/raw"
        } else {
            warn!("Unknown codec type: {:?}", codec_type);
            "audio/unknown"
        }
    }

    fn is_pcm(codec_type: CodecType) -> bool {
        [
            CODEC_TYPE_PCM_S8,
            CODEC_TYPE_PCM_U8,
            CODEC_TYPE_PCM_S16LE,
            CODEC_TYPE_PCM_S16BE,
            CODEC_TYPE_PCM_S24LE,
            CODEC_TYPE_PCM_S24BE,
            CODEC_TYPE_PCM_S32LE,
            CODEC_TYPE_PCM_S32BE,
            CODEC_TYPE_PCM_F32LE,
            CODEC_TYPE_PCM_F32BE,
            CODEC_TYPE_PCM_F64LE,
            CODEC_TYPE_PCM_F64BE,
            CODEC_TYPE_PCM_ALAW,
            CODEC_TYPE_PCM_MULAW,
        ]
        .contains(&codec_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::CODEC_TYPE_NULL;

    #[test]
    fn test_codec_mime_mapping() {
        assert_eq!(FormatDetector::codec_mime(CODEC_TYPE_MP3), "audio/mpeg");
        assert_eq!(FormatDetector::codec_mime(CODEC_TYPE_AAC), "audio/mp4a-latm");
        assert_eq!(FormatDetector::codec_mime(CODEC_TYPE_FLAC), "audio/flac");
        assert_eq!(FormatDetector::codec_mime(CODEC_TYPE_PCM_S16LE), "audio/raw");
        assert_eq!(FormatDetector::codec_mime(CODEC_TYPE_NULL), "audio/unknown");
    }

    #[test]
    fn test_hints_accept_paths_and_extensions() {
        // Hint has no accessors; building them must not panic.
        let _ = FormatDetector::hint_from_path(Path::new("/music/track.flac"));
        let _ = FormatDetector::hint_from_path(Path::new("/music/no_extension"));
        let _ = FormatDetector::hint_from_extension(".mp3");
        let _ = FormatDetector::hint_from_extension("");
    }
}
