/// Content-Type derived from a path's extension. Unknown extensions are
/// served as opaque octets.
pub fn content_type_for_path(path: &str) -> &'static str {
    let extension = match path.rfind('.') {
        Some(dot) if path.rfind('/').map_or(true, |slash| dot > slash) => &path[dot + 1..],
        _ => "",
    };
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::content_type_for_path;

    #[test]
    fn known_extensions() {
        assert_eq!(content_type_for_path("/a/index.html"), "text/html");
        assert_eq!(content_type_for_path("/style.CSS"), "text/css");
        assert_eq!(content_type_for_path("/img/logo.png"), "image/png");
    }

    #[test]
    fn unknown_or_missing_extension_is_octet_stream() {
        assert_eq!(content_type_for_path("/bin/data"), "application/octet-stream");
        assert_eq!(content_type_for_path("/archive.xyz"), "application/octet-stream");
        // A dot in a directory name is not an extension.
        assert_eq!(content_type_for_path("/v1.2/readme"), "application/octet-stream");
    }
}
