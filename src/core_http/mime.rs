use crate::constants::FALLBACK_CONTENT_TYPE;

/// Static extension-to-Content-Type table.
///
/// Lookup is by the final extension, case-insensitive; anything unknown is
/// served as `application/octet-stream`.
pub fn content_type_for(remote_path: &str) -> &'static str {
    let extension = remote_path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("txt") | Some("md") | Some("log") => "text/plain",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("csv") => "text/csv",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("tar") => "application/x-tar",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_map() {
        assert_eq!(content_type_for("music/track.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("music/TRACK.FLAC"), "audio/flac");
        assert_eq!(content_type_for("docs/manual.pdf"), "application/pdf");
    }

    #[test]
    fn unknown_or_missing_extension_falls_back() {
        assert_eq!(content_type_for("music/track"), FALLBACK_CONTENT_TYPE);
        assert_eq!(content_type_for("music/track.weird"), FALLBACK_CONTENT_TYPE);
        assert_eq!(content_type_for(""), FALLBACK_CONTENT_TYPE);
    }

    #[test]
    fn extension_comes_from_the_final_component() {
        assert_eq!(content_type_for("a.zip/track.mp3"), "audio/mpeg");
    }
}
