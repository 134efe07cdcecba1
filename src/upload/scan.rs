//! Local candidate discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A local file eligible for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub filename: String,
}

/// Whether `path` carries one of `extensions` (lowercase, no dot).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            extensions.iter().any(|x| *x == e)
        })
        .unwrap_or(false)
}

/// Recursively collect regular files under `root` matching `extensions`,
/// sorted by path. Unreadable entries and names that are not valid UTF-8
/// are logged and skipped.
pub fn collect_candidates(root: &Path, extensions: &[String]) -> Vec<CandidateFile> {
    let mut candidates: Vec<CandidateFile> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_extension(entry.path(), extensions))
        .filter_map(|entry| {
            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(
                    "Skipping {}: filename is not valid UTF-8",
                    entry.path().display()
                );
                return None;
            };
            Some(CandidateFile {
                path: entry.into_path(),
                filename,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    candidates
}

/// MIME type sent with the raw upload.
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}
