//! Builds FAT flash images from a host directory tree.
//!
//! The whole image is assembled in memory: a sector-addressed block device is
//! allocated, formatted with a FAT filesystem, populated by replaying the
//! source tree onto it, and finally serialized to a file. The result is a raw
//! image that can be flashed at offset 0 of a device's filesystem partition.
//!
//! # Architecture
//!
//! ```text
//! pipeline (BuildContext: allocate → format → populate → write_image)
//!     │
//!     ├── walker ──── walk_tree + Populator
//!     │                   │
//!     │                   ▼
//!     ├── volume ──── Volume / VolumeFile traits, FatVolume (fatfs)
//!     │                   │
//!     │                   ▼
//!     ├── device ──── SectorStream → DiskAdapter → BlockDevice
//!     │
//!     └── artifact ── persist_image (temp file + rename, sha256)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use flashfs_builder::{build, BuildConfig};
//!
//! let mut config = BuildConfig::new("badger_os", "filesystem.bin");
//! config.sector_size = 512;
//! config.sector_count = 4096;
//! let report = build(config)?;
//! println!("{} files, {} bytes", report.files, report.image_bytes);
//! ```

pub mod artifact;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod volume;
pub mod walker;

pub use device::BlockDevice;
pub use error::{BuildError, ConfigError, ExitCategory};
pub use pipeline::{build, BuildConfig, BuildContext, BuildReport, BuildStage, ImageSettings};
pub use walker::TargetPath;
