//! Media source handling for image and document parts.
//!
//! A part source is a remote URL, a local filesystem path, or a base64
//! payload. Local and inline forms resolve here; remote URLs are fetched by
//! the client before encoding. A source that cannot be resolved encodes as
//! an empty media type and empty data instead of failing the request.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Base64 payload plus sniffed media type, ready for the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSource {
    pub media_type: String,
    pub data: String,
}

impl ResolvedSource {
    /// The unresolvable form: both fields empty.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            media_type: sniff_media_type(bytes).unwrap_or_default().to_string(),
            data: BASE64.encode(bytes),
        }
    }
}

/// True when the value looks like a local filesystem path.
pub fn is_local_path(value: &str) -> bool {
    value.starts_with('/')
        || value.starts_with("./")
        || value.starts_with("../")
        || value.starts_with('~')
}

/// True when the value is a remote URL the client must fetch first.
pub fn is_remote_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Resolves a non-remote source: local file read, otherwise base64.
///
/// A base64 payload that decodes keeps its original text as the wire data
/// and gets a sniffed media type; one that does not decode passes through
/// unchanged with an empty media type.
pub fn resolve_inline_source(raw: &str) -> ResolvedSource {
    if is_local_path(raw) {
        return match std::fs::read(expand_tilde(raw)) {
            Ok(bytes) => ResolvedSource::from_bytes(&bytes),
            Err(_) => ResolvedSource::empty(),
        };
    }

    match BASE64.decode(raw) {
        Ok(bytes) => ResolvedSource {
            media_type: sniff_media_type(&bytes).unwrap_or_default().to_string(),
            data: raw.to_string(),
        },
        Err(_) => ResolvedSource {
            media_type: String::new(),
            data: raw.to_string(),
        },
    }
}

/// Sniffs the media type from magic bytes; `None` when the signature is not
/// one of the supported formats.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0x47, 0x49, 0x46, 0x38]) {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    None
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(stripped);
        }
    }
    PathBuf::from(path)
}
