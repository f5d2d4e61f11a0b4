//! Driver-facing I/O surface of the block device.

use super::{BlockDevice, ControlCommand, ControlValue};
use crate::error::DeviceError;

/// Packed DOS timestamp handed to drivers as "now": 1980-01-01 00:00:00.
///
/// There is no real time source, so images are reproducible.
pub const FAT_EPOCH: u32 = 0;

/// The calls any volume driver needs from a block device.
pub trait DiskIo {
    fn read(&mut self, sector: u64, count: u64, buf: &mut [u8]) -> Result<(), DeviceError>;

    fn write(&mut self, sector: u64, count: u64, data: &[u8]) -> Result<(), DeviceError>;

    /// Run a raw device-control code.
    fn control(&mut self, code: u8) -> Result<ControlValue, DeviceError>;

    fn clock(&self) -> u32;
}

/// Forwards [`DiskIo`] calls to a borrowed [`BlockDevice`].
#[derive(Debug)]
pub struct DiskAdapter<'d> {
    device: &'d mut BlockDevice,
}

impl<'d> DiskAdapter<'d> {
    pub fn new(device: &'d mut BlockDevice) -> Self {
        Self { device }
    }
}

impl DiskIo for DiskAdapter<'_> {
    fn read(&mut self, sector: u64, count: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.device.read_into(sector, count, buf)
    }

    fn write(&mut self, sector: u64, count: u64, data: &[u8]) -> Result<(), DeviceError> {
        self.device.write(sector, count, data)
    }

    fn control(&mut self, code: u8) -> Result<ControlValue, DeviceError> {
        let command = ControlCommand::try_from(code)?;
        Ok(self.device.control(command))
    }

    fn clock(&self) -> u32 {
        FAT_EPOCH
    }
}
