//! Volume driver capability.
//!
//! The pipeline never encodes allocation tables or directory entries itself.
//! It formats the block device through [`fat::format_volume`] and then talks
//! to the mounted volume only through the [`Volume`] and [`VolumeFile`]
//! traits, so any driver that can create directories and stream files
//! satisfies the directory walker.

pub mod fat;
#[cfg(test)]
pub(crate) mod recording;

use std::io;

use crate::device::BlockDevice;
use crate::error::{BuildError, ConfigError};
use crate::walker::TargetPath;

pub use fat::{format_volume, FatVolume};

/// A mounted volume the walker can populate.
pub trait Volume {
    type File<'a>: VolumeFile
    where
        Self: 'a;

    /// Create a directory. An existing directory at `path` is not an error.
    fn make_dir(&mut self, path: &TargetPath) -> io::Result<()>;

    /// Create a new, empty file for writing.
    ///
    /// Fails with [`io::ErrorKind::AlreadyExists`] if anything already
    /// exists at `path`.
    fn create_new(&mut self, path: &TargetPath) -> io::Result<Self::File<'_>>;
}

/// An open file on a [`Volume`].
pub trait VolumeFile {
    /// Write one chunk and report how many bytes the volume accepted.
    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Flush and release the handle.
    fn close(self) -> io::Result<()>;
}

/// Maximum number of root directory entries on a roomy volume.
pub const DEFAULT_ROOT_DIR_ENTRIES: u16 = 512;

/// Size of one FAT directory entry.
const DIR_ENTRY_SIZE: u64 = 32;

/// Longest FAT volume label.
pub const MAX_LABEL_LEN: usize = 11;

/// Parameters for laying a fresh volume onto a block device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub bytes_per_sector: u16,
    pub total_sectors: u32,
    pub max_root_dir_entries: u16,
    pub volume_label: Option<[u8; MAX_LABEL_LEN]>,
}

impl FormatOptions {
    /// Derive options from the device geometry.
    ///
    /// The root directory is kept to at most an eighth of the volume so very
    /// small images still leave room for data.
    pub fn for_device(device: &BlockDevice, label: Option<&str>) -> Result<Self, BuildError> {
        let bytes_per_sector = u16::try_from(device.sector_size()).map_err(|_| {
            unsupported_geometry(format!(
                "sector size {} is too large for a FAT volume",
                device.sector_size()
            ))
        })?;
        let total_sectors = u32::try_from(device.sector_count()).map_err(|_| {
            unsupported_geometry(format!(
                "{} sectors is too many for a FAT volume",
                device.sector_count()
            ))
        })?;

        let entries_per_sector = (u64::from(bytes_per_sector) / DIR_ENTRY_SIZE).max(1);
        let root_sectors = (device.sector_count() / 8).max(1);
        let max_root_dir_entries = root_sectors
            .saturating_mul(entries_per_sector)
            .min(u64::from(DEFAULT_ROOT_DIR_ENTRIES)) as u16;

        let volume_label = label.map(encode_label).transpose()?;

        Ok(Self {
            bytes_per_sector,
            total_sectors,
            max_root_dir_entries,
            volume_label,
        })
    }
}

/// Validate a label and pad it to the on-disk form (upper case, space filled).
pub fn encode_label(label: &str) -> Result<[u8; MAX_LABEL_LEN], ConfigError> {
    let valid = label.len() <= MAX_LABEL_LEN
        && !label.is_empty()
        && label.bytes().all(|b| b.is_ascii_graphic() || b == b' ');
    if !valid {
        return Err(ConfigError::InvalidLabel(label.to_string()));
    }
    let mut encoded = [b' '; MAX_LABEL_LEN];
    for (slot, byte) in encoded.iter_mut().zip(label.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    Ok(encoded)
}

fn unsupported_geometry(msg: String) -> BuildError {
    BuildError::Format(io::Error::new(io::ErrorKind::InvalidInput, msg))
}
