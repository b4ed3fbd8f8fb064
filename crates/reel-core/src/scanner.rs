//! Library folder scanner.
//!
//! Walks user-configured folders and registers their top-level entries as
//! library items: a media file directly in the folder becomes a file item,
//! a subdirectory containing media becomes a folder (series) item.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::ReelError;
use crate::guess;
use crate::models::MediaItem;
use crate::storage::Storage;

/// File extensions treated as playable media.
pub const MEDIA_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "webm", "m4v", "wmv", "flv"];

/// Result of a scan over the configured folders.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub entries_seen: u32,
    pub items_added: u32,
    pub items_known: u32,
}

/// Whether the path has a recognized media extension.
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// All media files under a path, sorted by path. A file path yields itself.
///
/// This ordering is the playlist order used for folder resume, so it must be
/// stable across calls.
pub fn media_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return if is_media_file(path) {
            vec![path.to_path_buf()]
        } else {
            vec![]
        };
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_media_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Scan all configured library folders and register new items.
pub fn scan_library_folders(storage: &Storage, folders: &[String]) -> Result<ScanResult, ReelError> {
    let mut result = ScanResult::default();

    for folder in folders {
        let folder_path = Path::new(folder);
        if !folder_path.is_dir() {
            warn!(path = %folder, "Library folder does not exist, skipping");
            continue;
        }

        info!(path = %folder, "Scanning library folder");

        let entries = match std::fs::read_dir(folder_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %folder, error = %e, "Failed to read library folder");
                continue;
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_candidate = if path.is_dir() {
                !media_files(&path).is_empty()
            } else {
                is_media_file(&path)
            };
            if !is_candidate {
                continue;
            }

            result.entries_seen += 1;

            // Canonical paths keep scan and playback keyed the same way.
            let path = std::fs::canonicalize(&path).unwrap_or(path);
            let path_str = path.to_string_lossy().to_string();
            if storage.get_item_by_path(&path_str)?.is_some() {
                result.items_known += 1;
                continue;
            }

            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let guessed = guess::guess_name(name);

            let mut item = MediaItem::new(path_str, guessed.title);
            item.season = guessed.season;
            item.year = guessed.year;
            storage.insert_item(&item)?;
            result.items_added += 1;
        }
    }

    info!(
        seen = result.entries_seen,
        added = result.items_added,
        known = result.items_known,
        "Library scan complete"
    );

    Ok(result)
}
