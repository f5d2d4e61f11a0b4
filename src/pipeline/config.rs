use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::device::capacity_of;
use crate::error::{BuildError, ConfigError};
use crate::volume::encode_label;
use crate::walker::{IgnoreList, DEFAULT_IGNORE};

pub const DEFAULT_SECTOR_SIZE: u32 = 4096;
/// 512 sectors of 4 KiB: a 2 MiB image.
pub const DEFAULT_SECTOR_COUNT: u64 = 512;
pub const DEFAULT_OUTPUT: &str = "filesystem.bin";

/// Everything one build needs. Fixed once the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub source_root: PathBuf,
    pub output_path: PathBuf,
    pub sector_size: u32,
    pub sector_count: u64,
    /// Emit only up to the high-water mark instead of the full capacity.
    pub truncate: bool,
    pub force_overwrite: bool,
    /// Glob patterns for entry names to leave out.
    pub ignore: Vec<String>,
    pub volume_label: Option<String>,
}

impl BuildConfig {
    /// A config with the default geometry and ignore list.
    pub fn new(source_root: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_path: output_path.into(),
            sector_size: DEFAULT_SECTOR_SIZE,
            sector_count: DEFAULT_SECTOR_COUNT,
            truncate: true,
            force_overwrite: false,
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            volume_label: None,
        }
    }

    /// Image size in bytes, if the geometry is addressable.
    pub fn capacity(&self) -> Option<usize> {
        capacity_of(self.sector_size, self.sector_count)
    }

    /// Check paths, geometry, label and ignore patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_root.as_os_str().is_empty() {
            return Err(ConfigError::MissingSourceRoot);
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingOutputPath);
        }
        if self.sector_size == 0 {
            return Err(ConfigError::ZeroSectorSize);
        }
        if self.sector_count == 0 {
            return Err(ConfigError::ZeroSectorCount);
        }
        if self.capacity().is_none() {
            return Err(ConfigError::CapacityOverflow {
                sector_size: self.sector_size,
                sector_count: self.sector_count,
            });
        }
        if !self.source_root.is_dir() {
            return Err(ConfigError::SourceRootNotDirectory(
                self.source_root.clone(),
            ));
        }
        if let Some(label) = &self.volume_label {
            encode_label(label)?;
        }
        IgnoreList::new(&self.ignore)?;
        Ok(())
    }

    /// Refuse to run if the output exists and overwriting was not requested.
    pub fn check_destination(&self) -> Result<(), BuildError> {
        if !self.force_overwrite && self.output_path.symlink_metadata().is_ok() {
            return Err(BuildError::Refusal(self.output_path.clone()));
        }
        Ok(())
    }
}

/// A partial configuration: one layer from a config file or the command line.
///
/// Layers are merged with [`ImageSettings::merge`] and resolved into a
/// [`BuildConfig`] with [`ImageSettings::into_config`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSettings {
    pub source_root: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub sector_size: Option<u32>,
    pub sector_count: Option<u64>,
    pub truncate: Option<bool>,
    pub force_overwrite: Option<bool>,
    pub ignore: Option<Vec<String>>,
    pub volume_label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    image: ImageSettings,
}

impl ImageSettings {
    /// Parse the `[image]` table of a config file.
    ///
    /// Relative paths in the file are resolved against the file's directory.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        let parsed: ConfigToml =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: config_path.to_path_buf(),
                source,
            })?;

        let base = config_path.parent().unwrap_or_else(|| Path::new(""));
        let mut settings = parsed.image;
        settings.source_root = settings.source_root.map(|p| resolve_config_path(base, &p));
        settings.output_path = settings.output_path.map(|p| resolve_config_path(base, &p));
        Ok(settings)
    }

    /// Overlay `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: ImageSettings) -> ImageSettings {
        ImageSettings {
            source_root: overrides.source_root.or(self.source_root),
            output_path: overrides.output_path.or(self.output_path),
            sector_size: overrides.sector_size.or(self.sector_size),
            sector_count: overrides.sector_count.or(self.sector_count),
            truncate: overrides.truncate.or(self.truncate),
            force_overwrite: overrides.force_overwrite.or(self.force_overwrite),
            ignore: overrides.ignore.or(self.ignore),
            volume_label: overrides.volume_label.or(self.volume_label),
        }
    }

    /// Fill unset fields with defaults. Only the source root is required.
    pub fn into_config(self) -> Result<BuildConfig, ConfigError> {
        let source_root = self.source_root.ok_or(ConfigError::MissingSourceRoot)?;
        let output_path = self
            .output_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

        let mut config = BuildConfig::new(source_root, output_path);
        if let Some(sector_size) = self.sector_size {
            config.sector_size = sector_size;
        }
        if let Some(sector_count) = self.sector_count {
            config.sector_count = sector_count;
        }
        if let Some(truncate) = self.truncate {
            config.truncate = truncate;
        }
        if let Some(force) = self.force_overwrite {
            config.force_overwrite = force;
        }
        if let Some(ignore) = self.ignore {
            config.ignore = ignore;
        }
        config.volume_label = self.volume_label;
        Ok(config)
    }
}

fn resolve_config_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
