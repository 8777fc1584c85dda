//! File name and MIME type helpers.

/// MIME type for a file name, by extension.
pub fn mime_type_for(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    match extension {
        "dll" | "pdb" => Some("application/octet-stream"),
        "wasm" => Some("application/wasm"),
        "html" => Some("text/html"),
        "js" => Some("text/javascript"),
        "json" => Some("application/json"),
        "css" => Some("text/css"),
        "woff" => Some("font/woff"),
        _ => None,
    }
}

/// Last path segment of a URL or path, or `index.html` when it is empty.
pub fn file_name_of(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "index.html",
    }
}
