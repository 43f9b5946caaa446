//! Media attachment selection, naming, and annotation.

use std::path::{Path, PathBuf};

/// Kind of attachment carried by a message, in selection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Voice,
    Audio,
    Document,
}

impl MediaKind {
    /// Label used in content annotations like `[voice: /path]`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Photo => "image",
            Self::Voice => "voice",
            Self::Audio => "audio",
            Self::Document => "file",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Photo => 0,
            Self::Voice => 1,
            Self::Audio => 2,
            Self::Document => 3,
        }
    }

    /// Fallback extension when the platform reports no usable MIME type.
    fn default_extension(self) -> &'static str {
        match self {
            Self::Photo => ".jpg",
            Self::Voice => ".ogg",
            Self::Audio => ".mp3",
            Self::Document => "",
        }
    }

    /// Voice notes and audio files are candidates for transcription.
    pub fn is_audio(self) -> bool {
        matches!(self, Self::Voice | Self::Audio)
    }
}

/// A downloadable attachment reference reported by the platform.
#[derive(Debug, Clone)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file_id: String,
    pub mime_type: Option<String>,
}

/// Picks the attachment to process when a message carries several.
///
/// One attachment per message: photo beats voice beats audio beats
/// document.
pub fn pick_media(candidates: &[MediaRef]) -> Option<&MediaRef> {
    candidates.iter().min_by_key(|m| m.kind.rank())
}

/// Maps a MIME type to a file extension, falling back to the kind default.
pub fn extension_for(kind: MediaKind, mime_type: Option<&str>) -> &'static str {
    let mime = mime_type
        .map(|m| m.split(';').next().unwrap_or(m).trim())
        .unwrap_or("");
    match mime {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "audio/ogg" => ".ogg",
        "audio/mpeg" => ".mp3",
        "audio/mp4" => ".m4a",
        "audio/x-wav" | "audio/wav" => ".wav",
        "video/mp4" => ".mp4",
        "application/pdf" => ".pdf",
        "text/plain" => ".txt",
        _ => kind.default_extension(),
    }
}

/// Builds the local file name for a download: the first 16 characters of
/// the platform file id plus the extension. File ids are long and unique
/// enough that the prefix stays collision-free in practice.
pub fn media_file_name(file_id: &str, extension: &str) -> String {
    let prefix: String = file_id.chars().take(16).collect();
    format!("{prefix}{extension}")
}

/// Local destination path for an attachment.
pub fn media_path(dir: &Path, media: &MediaRef) -> PathBuf {
    let ext = extension_for(media.kind, media.mime_type.as_deref());
    dir.join(media_file_name(&media.file_id, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(kind: MediaKind, file_id: &str) -> MediaRef {
        MediaRef {
            kind,
            file_id: file_id.to_string(),
            mime_type: None,
        }
    }

    #[test]
    fn photo_wins_over_voice_and_document() {
        let candidates = vec![
            media(MediaKind::Document, "d"),
            media(MediaKind::Photo, "p"),
            media(MediaKind::Voice, "v"),
        ];
        let picked = pick_media(&candidates).expect("one candidate");
        assert_eq!(picked.kind, MediaKind::Photo);
    }

    #[test]
    fn voice_wins_over_audio() {
        let candidates = vec![media(MediaKind::Audio, "a"), media(MediaKind::Voice, "v")];
        assert_eq!(
            pick_media(&candidates).expect("one candidate").kind,
            MediaKind::Voice
        );
    }

    #[test]
    fn no_candidates_picks_nothing() {
        assert!(pick_media(&[]).is_none());
    }

    #[test]
    fn mime_type_overrides_kind_default() {
        assert_eq!(extension_for(MediaKind::Document, Some("image/png")), ".png");
        assert_eq!(
            extension_for(MediaKind::Voice, Some("audio/ogg; codecs=opus")),
            ".ogg"
        );
    }

    #[test]
    fn unknown_mime_falls_back_to_kind_default() {
        assert_eq!(
            extension_for(MediaKind::Photo, Some("application/x-unknown")),
            ".jpg"
        );
        assert_eq!(extension_for(MediaKind::Voice, None), ".ogg");
        assert_eq!(extension_for(MediaKind::Document, None), "");
    }

    #[test]
    fn file_name_uses_sixteen_char_prefix() {
        let name = media_file_name("AgACAgIAAxkBAAIBcdefghijklmnop", ".jpg");
        assert_eq!(name, "AgACAgIAAxkBAAIB.jpg");
    }

    #[test]
    fn short_file_id_is_kept_whole() {
        assert_eq!(media_file_name("short", ".ogg"), "short.ogg");
    }
}
