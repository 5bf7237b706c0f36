//! `FILETYPE` derivation from a file extension (spec §4.8).

use std::path::Path;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Looks up a fixed extension table; falls back to the generic octet
/// stream type for anything unrecognized.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("json") => "application/json",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        _ => DEFAULT_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extension_maps_to_mime() {
        assert_eq!(mime_for_path(Path::new("photo.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("notes.txt")), "text/plain");
    }

    #[test]
    fn unknown_extension_falls_back_to_default() {
        assert_eq!(mime_for_path(Path::new("data.bin")), DEFAULT_MIME);
        assert_eq!(mime_for_path(Path::new("noext")), DEFAULT_MIME);
    }
}
