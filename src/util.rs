use cow_utils::CowUtils;
use sha2::{Digest, Sha256};

use crate::file::File;

/// Normalize line endings to LF for cross-platform reproducible output.
pub fn normalize_line_endings(content: String) -> String {
    content
        .cow_replace("\r\n", "\n")
        .cow_replace('\r', "\n")
        .into_owned()
}

/// Hex-encoded SHA-256, the key format shared by the collector cache, the
/// per-item cache, and the sources sidecars.
pub fn hash_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// True when the path passes through the external-packages directory.
pub fn is_vendor_path(path: &str) -> bool {
    path.split('/').any(|segment| segment == "node_modules")
}

/// The logical module name for a project file: source-root-relative path with
/// the extension stripped. Files outside the source root keep their full
/// relative path as the name.
pub fn module_name_for(file: &File, source_root: &str) -> String {
    let rel = file.relative_to(source_root).unwrap_or(file.path());
    let rel_file = File::new(rel);
    let ext = rel_file.extension();
    if ext.is_empty() {
        rel.to_string()
    } else {
        rel[..rel.len() - ext.len() - 1].to_string()
    }
}

/// Asset paths keep their extension slot but lose the source-root prefix.
pub fn asset_path_for(file: &File, source_root: &str) -> String {
    file.relative_to(source_root)
        .unwrap_or(file.path())
        .to_string()
}
