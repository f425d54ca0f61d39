use std::path::Path;

/// Extensions eligible for document synchronization. Anything else under an
/// object directory is left alone (binaries, archives, build artifacts).
pub const DOCUMENT_EXTENSIONS: [&str; 12] = [
    "md", "txt", "sh", "yml", "yaml", "json", "py", "js", "ts", "html", "css", "sql",
];

pub fn is_document_file(path: &Path) -> bool {
    match extension_of(path) {
        Some(ext) => DOCUMENT_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

/// MIME type stored alongside document content. Allow-listed extensions
/// without a specific mapping fall back to `application/octet-stream`.
pub fn content_type_for(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("md") => "text/markdown",
        Some("txt") => "text/plain",
        Some("py") => "text/x-python",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("yaml") | Some("yml") => "application/yaml",
        _ => "application/octet-stream",
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
