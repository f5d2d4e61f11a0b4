use std::path::PathBuf;

use serde::Serialize;

/// Outcome of a successful build, as printed by the CLI and saved by `--report`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub source_root: PathBuf,
    pub output_path: PathBuf,
    pub sector_size: u32,
    pub sector_count: u64,
    pub directories: u64,
    pub files: u64,
    /// Entries dropped by the ignore list.
    pub ignored: u64,
    /// Symlinks and special files left out of the image.
    pub skipped: u64,
    pub bytes_copied: u64,
    pub high_water_mark: usize,
    pub image_bytes: u64,
    pub image_sha256: String,
    /// Free space left on the volume after population.
    pub free_bytes: u64,
}

impl BuildReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
