//! Content-Type lookup by file extension.

use std::path::Path;

pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Content type for a file, from its extension (case-insensitive).
///
/// ```
/// # use devgate::http::mime;
/// # use std::path::Path;
/// assert_eq!(mime::from_path(Path::new("app.JS")), "text/javascript; charset=utf-8");
/// assert_eq!(mime::from_path(Path::new("LICENSE")), mime::DEFAULT_MIME);
/// ```
pub fn from_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return DEFAULT_MIME;
    };

    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        "wasm" => "application/wasm",
        _ => DEFAULT_MIME,
    }
}
