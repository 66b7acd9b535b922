//! Display forms of mapped file paths.

use std::path::Path;

/// Path relative to the project root, or unchanged when it lies elsewhere.
pub fn shorten_to_source(project_root: Option<&Path>, path: &str) -> String {
    let full = Path::new(path);
    if let Some(relative) = project_root.and_then(|root| full.strip_prefix(root).ok()) {
        if !relative.as_os_str().is_empty() {
            return relative.to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

/// Bare file name of a path.
pub fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
