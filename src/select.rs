/// Document served for directory-like requests.
pub const DEFAULT_DOCUMENT: &str = "index.html";

/// Choose the file to serve for `requested` given the set of known paths.
///
/// An exact match wins; anything else is treated as a directory and gets
/// [`DEFAULT_DOCUMENT`] appended.
pub fn select_path<'a>(mut known: impl Iterator<Item = &'a str>, requested: &str) -> String {
    if !requested.is_empty() && known.any(|path| path == requested) {
        return requested.to_string();
    }

    let dir = requested.trim_end_matches('/');
    if dir.is_empty() {
        DEFAULT_DOCUMENT.to_string()
    } else {
        format!("{}/{}", dir, DEFAULT_DOCUMENT)
    }
}
