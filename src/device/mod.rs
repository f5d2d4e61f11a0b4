//! Sector-addressed in-memory block device.
//!
//! The device stands in for the flash chip while the image is being built.
//! It is a single owned buffer of `sector_size * sector_count` bytes that
//! remembers the furthest byte ever written (the high-water mark), which is
//! what a truncated image is cut to.
//!
//! - [`adapter`] - the four-call surface a volume driver talks to
//! - [`stream`] - byte-addressed `Read + Write + Seek` view over the adapter

pub mod adapter;
pub mod stream;

use std::ops::Range;

use crate::error::{BuildError, ConfigError, DeviceError};

pub use adapter::{DiskAdapter, DiskIo, FAT_EPOCH};
pub use stream::SectorStream;

/// Metadata queries and maintenance requests a driver can issue.
///
/// The numeric codes are the ones volume drivers pass through their
/// device-control hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Sync,
    SectorCount,
    SectorSize,
    EraseBlockSize,
    Trim,
    Init,
    Status,
}

impl TryFrom<u8> for ControlCommand {
    type Error = DeviceError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ControlCommand::Sync),
            1 => Ok(ControlCommand::SectorCount),
            2 => Ok(ControlCommand::SectorSize),
            3 => Ok(ControlCommand::EraseBlockSize),
            4 => Ok(ControlCommand::Trim),
            5 => Ok(ControlCommand::Init),
            6 => Ok(ControlCommand::Status),
            other => Err(DeviceError::UnsupportedCommand(other)),
        }
    }
}

impl From<ControlCommand> for u8 {
    fn from(command: ControlCommand) -> Self {
        match command {
            ControlCommand::Sync => 0,
            ControlCommand::SectorCount => 1,
            ControlCommand::SectorSize => 2,
            ControlCommand::EraseBlockSize => 3,
            ControlCommand::Trim => 4,
            ControlCommand::Init => 5,
            ControlCommand::Status => 6,
        }
    }
}

/// Answer to a [`ControlCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlValue {
    Done,
    SectorCount(u64),
    SectorSize(u32),
    EraseBlockSize(u32),
    /// Drive status bits; zero means initialised and ready.
    Status(u8),
}

/// Status reported for `Init` and `Status`: no flags set.
pub const STATUS_READY: u8 = 0;

/// Fixed-capacity memory buffer addressed in whole sectors.
#[derive(Debug)]
pub struct BlockDevice {
    sector_size: u32,
    sector_count: u64,
    blocks: Vec<u8>,
    high_water_mark: usize,
}

impl BlockDevice {
    /// Allocate a zero-filled device.
    ///
    /// Geometry is validated by the caller; a zero or overflowing geometry is
    /// still rejected here as a configuration error.
    pub fn new(sector_size: u32, sector_count: u64) -> Result<Self, BuildError> {
        if sector_size == 0 {
            return Err(ConfigError::ZeroSectorSize.into());
        }
        if sector_count == 0 {
            return Err(ConfigError::ZeroSectorCount.into());
        }
        let bytes = capacity_of(sector_size, sector_count).ok_or(
            ConfigError::CapacityOverflow {
                sector_size,
                sector_count,
            },
        )?;

        let mut blocks = Vec::new();
        blocks
            .try_reserve_exact(bytes)
            .map_err(|source| BuildError::Allocation { bytes, source })?;
        blocks.resize(bytes, 0);

        Ok(Self {
            sector_size,
            sector_count,
            blocks,
            high_water_mark: 0,
        })
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    pub fn sector_count(&self) -> u64 {
        self.sector_count
    }

    /// Total size in bytes.
    pub fn capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Largest byte offset touched by any write.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Borrow `count` sectors starting at `sector`.
    pub fn read(&self, sector: u64, count: u64) -> Result<&[u8], DeviceError> {
        let span = self.span(sector, count)?;
        Ok(&self.blocks[span])
    }

    /// Copy `count` sectors starting at `sector` into `buf`.
    pub fn read_into(&self, sector: u64, count: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        let span = self.span(sector, count)?;
        check_len(span.len(), buf.len())?;
        buf.copy_from_slice(&self.blocks[span]);
        Ok(())
    }

    /// Store `data` at `sector`; `data` must be exactly `count` sectors long.
    pub fn write(&mut self, sector: u64, count: u64, data: &[u8]) -> Result<(), DeviceError> {
        let span = self.span(sector, count)?;
        check_len(span.len(), data.len())?;
        let end = span.end;
        self.blocks[span].copy_from_slice(data);
        self.high_water_mark = self.high_water_mark.max(end);
        Ok(())
    }

    pub fn control(&self, command: ControlCommand) -> ControlValue {
        match command {
            ControlCommand::Sync | ControlCommand::Trim => ControlValue::Done,
            ControlCommand::SectorCount => ControlValue::SectorCount(self.sector_count),
            ControlCommand::SectorSize => ControlValue::SectorSize(self.sector_size),
            ControlCommand::EraseBlockSize => ControlValue::EraseBlockSize(1),
            ControlCommand::Init | ControlCommand::Status => ControlValue::Status(STATUS_READY),
        }
    }

    /// The bytes up to the high-water mark.
    pub fn used_bytes(&self) -> &[u8] {
        &self.blocks[..self.high_water_mark]
    }

    /// The whole buffer, written or not.
    pub fn as_bytes(&self) -> &[u8] {
        &self.blocks
    }

    fn span(&self, sector: u64, count: u64) -> Result<Range<usize>, DeviceError> {
        let out_of_range = || DeviceError::Range {
            sector,
            count,
            capacity: self.blocks.len(),
        };
        let size = u64::from(self.sector_size);
        let start = sector.checked_mul(size).ok_or_else(out_of_range)?;
        let len = count.checked_mul(size).ok_or_else(out_of_range)?;
        let end = start.checked_add(len).ok_or_else(out_of_range)?;
        if end > self.blocks.len() as u64 {
            return Err(out_of_range());
        }
        Ok(start as usize..end as usize)
    }
}

/// `sector_size * sector_count` in bytes, if it fits the address space.
pub fn capacity_of(sector_size: u32, sector_count: u64) -> Option<usize> {
    let bytes = u64::from(sector_size).checked_mul(sector_count)?;
    usize::try_from(bytes).ok()
}

fn check_len(expected: usize, actual: usize) -> Result<(), DeviceError> {
    if expected != actual {
        return Err(DeviceError::Length { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_device_is_zeroed() {
        let device = BlockDevice::new(512, 4).unwrap();
        assert_eq!(device.capacity(), 2048);
        assert_eq!(device.high_water_mark(), 0);
        assert!(device.used_bytes().is_empty());
        assert!(device.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_zero_geometry_rejected() {
        assert!(matches!(
            BlockDevice::new(0, 4),
            Err(BuildError::Config(ConfigError::ZeroSectorSize))
        ));
        assert!(matches!(
            BlockDevice::new(512, 0),
            Err(BuildError::Config(ConfigError::ZeroSectorCount))
        ));
    }

    #[test]
    fn test_overflowing_geometry_rejected() {
        assert!(matches!(
            BlockDevice::new(u32::MAX, u64::MAX),
            Err(BuildError::Config(ConfigError::CapacityOverflow { .. }))
        ));
    }

    #[test]
    fn test_read_past_end_is_range_error() {
        let device = BlockDevice::new(512, 4).unwrap();
        assert!(device.read(3, 1).is_ok());
        assert_eq!(
            device.read(3, 2).unwrap_err(),
            DeviceError::Range {
                sector: 3,
                count: 2,
                capacity: 2048
            }
        );
        assert!(matches!(
            device.read(u64::MAX, 1),
            Err(DeviceError::Range { .. })
        ));
    }

    #[test]
    fn test_write_past_end_leaves_device_untouched() {
        let mut device = BlockDevice::new(512, 4).unwrap();
        let data = vec![0xAA; 1024];
        assert!(matches!(
            device.write(3, 2, &data),
            Err(DeviceError::Range { .. })
        ));
        assert_eq!(device.high_water_mark(), 0);
        assert!(device.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_write_length_must_match_count() {
        let mut device = BlockDevice::new(512, 4).unwrap();
        assert_eq!(
            device.write(0, 1, &[1u8; 100]).unwrap_err(),
            DeviceError::Length {
                expected: 512,
                actual: 100
            }
        );
    }

    #[test]
    fn test_control_reports_geometry() {
        let device = BlockDevice::new(4096, 512).unwrap();
        assert_eq!(
            device.control(ControlCommand::SectorCount),
            ControlValue::SectorCount(512)
        );
        assert_eq!(
            device.control(ControlCommand::SectorSize),
            ControlValue::SectorSize(4096)
        );
        assert_eq!(
            device.control(ControlCommand::EraseBlockSize),
            ControlValue::EraseBlockSize(1)
        );
        assert_eq!(device.control(ControlCommand::Sync), ControlValue::Done);
        assert_eq!(device.control(ControlCommand::Trim), ControlValue::Done);
        assert_eq!(
            device.control(ControlCommand::Init),
            ControlValue::Status(STATUS_READY)
        );
        assert_eq!(
            device.control(ControlCommand::Status),
            ControlValue::Status(STATUS_READY)
        );
    }

    #[test]
    fn test_control_codes() {
        for code in 0u8..=6 {
            let command = ControlCommand::try_from(code).unwrap();
            assert_eq!(u8::from(command), code);
        }
        assert_eq!(
            ControlCommand::try_from(7),
            Err(DeviceError::UnsupportedCommand(7))
        );
    }

    proptest! {
        #[test]
        fn prop_capacity_matches_geometry(size in 1u32..=4096, count in 1u64..=64) {
            let device = BlockDevice::new(size, count).unwrap();
            prop_assert_eq!(device.capacity() as u64, u64::from(size) * count);
            prop_assert_eq!(device.high_water_mark(), 0);
        }

        #[test]
        fn prop_write_then_read_returns_data(
            sector in 0u64..16,
            count in 1u64..8,
            seed in any::<u8>(),
        ) {
            let mut device = BlockDevice::new(512, 24).unwrap();
            let data: Vec<u8> = (0..count as usize * 512)
                .map(|i| (i as u8).wrapping_add(seed))
                .collect();
            device.write(sector, count, &data).unwrap();
            prop_assert_eq!(device.read(sector, count).unwrap(), &data[..]);
        }

        #[test]
        fn prop_high_water_mark_is_max_write_end(
            writes in proptest::collection::vec((0u64..28, 1u64..4), 1..12),
        ) {
            let mut device = BlockDevice::new(256, 32).unwrap();
            let mut expected = 0usize;
            for (sector, count) in writes {
                let data = vec![0x5A; count as usize * 256];
                device.write(sector, count, &data).unwrap();
                expected = expected.max(((sector + count) * 256) as usize);
            }
            prop_assert_eq!(device.high_water_mark(), expected);
            prop_assert!(device.high_water_mark() <= device.capacity());
        }
    }
}
