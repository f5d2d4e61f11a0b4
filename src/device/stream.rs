//! Byte-addressed view of a sector device.
//!
//! `std::io` based drivers (like `fatfs`) want `Read + Write + Seek` over a
//! flat byte range. [`SectorStream`] keeps a cursor and turns every access
//! into whole-sector [`DiskIo`] calls, patching partial sectors with a
//! read-modify-write.

use std::io::{self, Read, Seek, SeekFrom, Write};

use super::{ControlCommand, ControlValue, DiskIo};

pub struct SectorStream<D> {
    io: D,
    sector_size: usize,
    capacity: u64,
    pos: u64,
    scratch: Vec<u8>,
}

impl<D: DiskIo> SectorStream<D> {
    /// Wrap `io`, querying its geometry through device control.
    pub fn new(mut io: D) -> io::Result<Self> {
        let sector_size = match io.control(ControlCommand::SectorSize.into())? {
            ControlValue::SectorSize(size) if size > 0 => size,
            other => return Err(unexpected_control(ControlCommand::SectorSize, other)),
        };
        let sector_count = match io.control(ControlCommand::SectorCount.into())? {
            ControlValue::SectorCount(count) => count,
            other => return Err(unexpected_control(ControlCommand::SectorCount, other)),
        };
        let capacity = u64::from(sector_size)
            .checked_mul(sector_count)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "device too large"))?;
        let sector_size = sector_size as usize;

        Ok(Self {
            io,
            sector_size,
            capacity,
            pos: 0,
            scratch: vec![0; sector_size],
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn disk(&self) -> &D {
        &self.io
    }

    /// Sector index and offset inside it for the current position.
    fn locate(&self) -> (u64, usize) {
        let size = self.sector_size as u64;
        (self.pos / size, (self.pos % size) as usize)
    }

    /// Bytes that can be transferred from the cursor, capped at `want`.
    fn available(&self, want: usize) -> usize {
        let remaining = self.capacity.saturating_sub(self.pos);
        remaining.min(want as u64) as usize
    }
}

impl<D: DiskIo> Read for SectorStream<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.available(buf.len());
        let mut done = 0;
        while done < len {
            let (sector, offset) = self.locate();
            let left = len - done;
            if offset == 0 && left >= self.sector_size {
                let whole = left / self.sector_size;
                let bytes = whole * self.sector_size;
                self.io
                    .read(sector, whole as u64, &mut buf[done..done + bytes])?;
                done += bytes;
                self.pos += bytes as u64;
                continue;
            }
            let n = (self.sector_size - offset).min(left);
            self.io.read(sector, 1, &mut self.scratch)?;
            buf[done..done + n].copy_from_slice(&self.scratch[offset..offset + n]);
            done += n;
            self.pos += n as u64;
        }
        Ok(len)
    }
}

impl<D: DiskIo> Write for SectorStream<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.available(buf.len());
        let mut done = 0;
        while done < len {
            let (sector, offset) = self.locate();
            let left = len - done;
            if offset == 0 && left >= self.sector_size {
                let whole = left / self.sector_size;
                let bytes = whole * self.sector_size;
                self.io.write(sector, whole as u64, &buf[done..done + bytes])?;
                done += bytes;
                self.pos += bytes as u64;
                continue;
            }
            let n = (self.sector_size - offset).min(left);
            self.io.read(sector, 1, &mut self.scratch)?;
            self.scratch[offset..offset + n].copy_from_slice(&buf[done..done + n]);
            self.io.write(sector, 1, &self.scratch)?;
            done += n;
            self.pos += n as u64;
        }
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.io.control(ControlCommand::Sync.into())?;
        Ok(())
    }
}

impl<D: DiskIo> Seek for SectorStream<D> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.capacity.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of device or past u64::MAX",
            )
        })?;
        self.pos = target;
        Ok(target)
    }
}

fn unexpected_control(command: ControlCommand, value: ControlValue) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("device answered {command:?} with {value:?}"),
    )
}
