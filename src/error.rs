//! Error taxonomy for the image build.
//!
//! Every failure the pipeline can report is a [`BuildError`]. Each variant
//! belongs to exactly one [`ExitCategory`], which the binary turns into a
//! process exit code.

use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid or missing configuration, detected before anything is allocated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source root is not set")]
    MissingSourceRoot,

    #[error("output path is not set")]
    MissingOutputPath,

    #[error("sector size must be positive")]
    ZeroSectorSize,

    #[error("sector count must be positive")]
    ZeroSectorCount,

    #[error("image geometry {sector_size} x {sector_count} overflows the addressable size")]
    CapacityOverflow { sector_size: u32, sector_count: u64 },

    #[error("source root '{}' is not a directory", .0.display())]
    SourceRootNotDirectory(PathBuf),

    #[error("volume label '{0}' must be at most 11 printable ASCII characters")]
    InvalidLabel(String),

    #[error("invalid ignore pattern '{pattern}'")]
    InvalidIgnorePattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("reading config '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing config '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Access errors raised by the virtual block device.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("sectors {sector}..+{count} exceed device capacity of {capacity} bytes")]
    Range {
        sector: u64,
        count: u64,
        capacity: usize,
    },

    #[error("buffer holds {actual} bytes, transfer needs {expected}")]
    Length { expected: usize, actual: usize },

    #[error("unsupported control command {0}")]
    UnsupportedCommand(u8),
}

impl From<DeviceError> for io::Error {
    fn from(err: DeviceError) -> Self {
        let kind = match err {
            DeviceError::Range { .. } => io::ErrorKind::UnexpectedEof,
            DeviceError::Length { .. } => io::ErrorKind::InvalidInput,
            DeviceError::UnsupportedCommand(_) => io::ErrorKind::Unsupported,
        };
        io::Error::new(kind, err)
    }
}

/// A host path that cannot be presented to the volume.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("target path '{path}' is {len} bytes, limit is {max}")]
    TooLong { path: String, len: usize, max: usize },

    #[error("'{}' is not valid UTF-8", .0.display())]
    NonUtf8(PathBuf),

    #[error("'{}' is not inside source root '{}'", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// Any failure that ends a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("refusing to overwrite existing output '{}'", .0.display())]
    Refusal(PathBuf),

    #[error("failed to allocate a {bytes} byte block device")]
    Allocation {
        bytes: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("failed to format volume")]
    Format(#[source] io::Error),

    #[error("failed to read source '{}'", path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write '{path}' to the volume")]
    VolumeWrite {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("short write to '{path}': {written} of {read} bytes accepted (volume full?)")]
    ShortWrite {
        path: String,
        read: usize,
        written: usize,
    },

    #[error("failed to write image to '{}'", path.display())]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("cannot {requested} while the build is {found:?}")]
    InvalidStage {
        requested: &'static str,
        found: crate::pipeline::BuildStage,
    },
}

/// Result categories surfaced to the caller of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCategory {
    Success,
    ConfigurationInvalid,
    AllocationFailed,
    FormatFailed,
    SourceReadFailed,
    VolumeWriteFailed,
    DestinationWriteFailed,
}

impl ExitCategory {
    pub fn exit_code(self) -> u8 {
        match self {
            ExitCategory::Success => 0,
            ExitCategory::ConfigurationInvalid => 2,
            ExitCategory::AllocationFailed => 3,
            ExitCategory::FormatFailed => 4,
            ExitCategory::SourceReadFailed => 5,
            ExitCategory::VolumeWriteFailed => 6,
            ExitCategory::DestinationWriteFailed => 7,
        }
    }
}

impl BuildError {
    pub fn category(&self) -> ExitCategory {
        match self {
            BuildError::Config(_) | BuildError::Refusal(_) | BuildError::InvalidStage { .. } => {
                ExitCategory::ConfigurationInvalid
            }
            BuildError::Allocation { .. } => ExitCategory::AllocationFailed,
            BuildError::Format(_) => ExitCategory::FormatFailed,
            BuildError::SourceIo { .. } | BuildError::Path(_) => ExitCategory::SourceReadFailed,
            BuildError::VolumeWrite { .. } | BuildError::ShortWrite { .. } => {
                ExitCategory::VolumeWriteFailed
            }
            BuildError::DestinationWrite { .. } => ExitCategory::DestinationWriteFailed,
        }
    }

    pub(crate) fn volume_write(path: impl ToString, source: io::Error) -> Self {
        BuildError::VolumeWrite {
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn source_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BuildError::SourceIo {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let categories = [
            ExitCategory::Success,
            ExitCategory::ConfigurationInvalid,
            ExitCategory::AllocationFailed,
            ExitCategory::FormatFailed,
            ExitCategory::SourceReadFailed,
            ExitCategory::VolumeWriteFailed,
            ExitCategory::DestinationWriteFailed,
        ];
        let mut codes: Vec<u8> = categories.iter().map(|c| c.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), categories.len());
        assert_eq!(ExitCategory::Success.exit_code(), 0);
    }

    #[test]
    fn test_refusal_is_a_configuration_failure() {
        let err = BuildError::Refusal(PathBuf::from("out.bin"));
        assert_eq!(err.category(), ExitCategory::ConfigurationInvalid);
        assert!(err.to_string().contains("out.bin"));
        assert!(!err.to_string().contains("--"));
    }

    #[test]
    fn test_short_write_is_a_volume_failure() {
        let err = BuildError::ShortWrite {
            path: "/big.bin".into(),
            read: 1024,
            written: 512,
        };
        assert_eq!(err.category(), ExitCategory::VolumeWriteFailed);
    }

    #[test]
    fn test_device_error_maps_to_io_kind() {
        let io_err: io::Error = DeviceError::UnsupportedCommand(9).into();
        assert_eq!(io_err.kind(), io::ErrorKind::Unsupported);

        let io_err: io::Error = DeviceError::Range {
            sector: 4,
            count: 1,
            capacity: 2048,
        }
        .into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
