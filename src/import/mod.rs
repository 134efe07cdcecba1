//! Camera import: move photos into a dated archive by EXIF capture time.

pub mod error;
pub mod exif;
pub mod paths;

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub use self::error::ImportError;
pub use self::paths::DEFAULT_FOLDER_STRUCTURE;

use crate::upload::scan::has_extension;

/// File types picked up from a camera card (lowercase, no dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "orf"];

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub folder_structure: String,
    pub dry_run: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            folder_structure: DEFAULT_FOLDER_STRUCTURE.to_string(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Moved (or, in a dry run, would be moved) to this path.
    Moved(PathBuf),
    /// A file already exists at this path.
    AlreadyExists(PathBuf),
    /// No usable EXIF date.
    Undated,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub scanned: usize,
    pub moved: usize,
    pub already_exists: usize,
    pub undated: usize,
    pub failed: usize,
}

/// Recursively collect supported photo files under `input_dir`, sorted.
pub fn scan_directory(input_dir: &Path) -> Vec<PathBuf> {
    let extensions: Vec<String> = SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect();
    let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_extension(entry.path(), &extensions))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Move one file into its dated directory under `output_dir`.
///
/// Never overwrites an existing file.
pub fn import_file(
    input_file: &Path,
    output_dir: &Path,
    config: &ImportConfig,
) -> Result<ImportOutcome, ImportError> {
    let Some(date) = exif::capture_date(input_file)? else {
        return Ok(ImportOutcome::Undated);
    };
    let Some(file_name) = input_file.file_name() else {
        return Ok(ImportOutcome::Undated);
    };

    let target_dir = paths::target_directory(output_dir, &config.folder_structure, &date);
    let destination = target_dir.join(file_name);
    if destination.exists() {
        return Ok(ImportOutcome::AlreadyExists(destination));
    }
    if config.dry_run {
        return Ok(ImportOutcome::Moved(destination));
    }

    std::fs::create_dir_all(&target_dir).map_err(|source| ImportError::CreateDir {
        path: target_dir.clone(),
        source,
    })?;
    match move_file(input_file, &destination)? {
        Placement::Moved => Ok(ImportOutcome::Moved(destination)),
        Placement::Occupied => Ok(ImportOutcome::AlreadyExists(destination)),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Placement {
    Moved,
    /// Something already sits at the destination; the source is untouched.
    Occupied,
}

/// Move without ever replacing an existing destination.
///
/// Hard-links then unlinks the source; where linking is impossible (other
/// filesystem, no link support) it copies into a freshly created file.
fn move_file(from: &Path, to: &Path) -> Result<Placement, ImportError> {
    match std::fs::hard_link(from, to) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(Placement::Occupied),
        Err(e) => {
            tracing::debug!("hard link failed ({}), copying {}", e, from.display());
            if copy_new(from, to)? == Placement::Occupied {
                return Ok(Placement::Occupied);
            }
        }
    }
    std::fs::remove_file(from).map_err(|source| move_error(from, to, source))?;
    Ok(Placement::Moved)
}

fn copy_new(from: &Path, to: &Path) -> Result<Placement, ImportError> {
    let mut dest = match OpenOptions::new().write(true).create_new(true).open(to) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(Placement::Occupied),
        Err(e) => return Err(move_error(from, to, e)),
    };
    let copied = File::open(from)
        .and_then(|mut src| std::io::copy(&mut src, &mut dest))
        .and_then(|_| dest.sync_all());
    if let Err(e) = copied {
        let _ = std::fs::remove_file(to);
        return Err(move_error(from, to, e));
    }
    Ok(Placement::Moved)
}

fn move_error(from: &Path, to: &Path, source: std::io::Error) -> ImportError {
    ImportError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    }
}

/// Import every supported file under `input_dir` into `output_dir`.
///
/// Per-file failures are logged and counted; only invalid directories are
/// returned as errors.
pub fn import_directory(
    input_dir: &Path,
    output_dir: &Path,
    config: &ImportConfig,
) -> Result<ImportSummary, ImportError> {
    for dir in [input_dir, output_dir] {
        if !dir.is_dir() {
            return Err(ImportError::NotADirectory(dir.to_path_buf()));
        }
    }

    let files = scan_directory(input_dir);
    let mut summary = ImportSummary {
        scanned: files.len(),
        ..ImportSummary::default()
    };

    for file in files {
        tracing::debug!("Processing file {}", file.display());
        match import_file(&file, output_dir, config) {
            Ok(ImportOutcome::Moved(to)) => {
                if config.dry_run {
                    tracing::info!("[DRY RUN] Would move {} -> {}", file.display(), to.display());
                } else {
                    tracing::info!("Moved {} -> {}", file.display(), to.display());
                }
                summary.moved += 1;
            }
            Ok(ImportOutcome::AlreadyExists(to)) => {
                tracing::warn!("Skipping {}: {} already exists", file.display(), to.display());
                summary.already_exists += 1;
            }
            Ok(ImportOutcome::Undated) => {
                tracing::warn!("Skipping {}: no EXIF capture date", file.display());
                summary.undated += 1;
            }
            Err(e) => {
                tracing::error!("{}", e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
