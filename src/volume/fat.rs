//! FAT volume driver backed by the `fatfs` crate.

use std::io::{self, Write};

use log::{debug, info};

use super::{FormatOptions, Volume, VolumeFile};
use crate::device::{BlockDevice, DiskAdapter, DiskIo, SectorStream};
use crate::error::BuildError;
use crate::walker::TargetPath;

type DeviceStream<'d> = SectorStream<DiskAdapter<'d>>;

/// Lay an empty FAT filesystem onto `device`.
///
/// The volume serial comes from the adapter clock, so two builds of the same
/// tree produce identical images.
pub fn format_volume(device: &mut BlockDevice, options: &FormatOptions) -> Result<(), BuildError> {
    let mut stream = SectorStream::new(DiskAdapter::new(device)).map_err(BuildError::Format)?;
    let volume_id = stream.disk().clock();

    let mut fat_options = fatfs::FormatVolumeOptions::new()
        .bytes_per_sector(options.bytes_per_sector)
        .total_sectors(options.total_sectors)
        .max_root_dir_entries(options.max_root_dir_entries)
        .volume_id(volume_id);
    if let Some(label) = options.volume_label {
        fat_options = fat_options.volume_label(label);
    }

    debug!(
        "formatting {} sectors of {} bytes, {} root entries",
        options.total_sectors, options.bytes_per_sector, options.max_root_dir_entries
    );
    fatfs::format_volume(&mut stream, fat_options).map_err(BuildError::Format)?;
    stream.flush().map_err(BuildError::Format)?;
    Ok(())
}

/// Space accounting of a mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeUsage {
    pub cluster_size: u32,
    pub total_clusters: u32,
    pub free_clusters: u32,
}

impl VolumeUsage {
    pub fn free_bytes(&self) -> u64 {
        u64::from(self.cluster_size) * u64::from(self.free_clusters)
    }
}

/// A formatted FAT volume mounted on a borrowed block device.
pub struct FatVolume<'d> {
    fs: fatfs::FileSystem<DeviceStream<'d>>,
}

impl<'d> FatVolume<'d> {
    pub fn mount(device: &'d mut BlockDevice) -> Result<Self, BuildError> {
        let stream = SectorStream::new(DiskAdapter::new(device)).map_err(BuildError::Format)?;
        let fs = fatfs::FileSystem::new(stream, fatfs::FsOptions::new())
            .map_err(BuildError::Format)?;
        info!("- mounted {:?} volume", fs.fat_type());
        Ok(Self { fs })
    }

    pub fn usage(&self) -> io::Result<VolumeUsage> {
        let stats = self.fs.stats()?;
        Ok(VolumeUsage {
            cluster_size: stats.cluster_size(),
            total_clusters: stats.total_clusters(),
            free_clusters: stats.free_clusters(),
        })
    }

    /// Flush all metadata back to the device and release it.
    pub fn unmount(self) -> Result<(), BuildError> {
        self.fs
            .unmount()
            .map_err(|source| BuildError::volume_write(TargetPath::root(), source))
    }
}

impl<'d> Volume for FatVolume<'d> {
    type File<'a> = fatfs::File<'a, DeviceStream<'d>>
    where
        Self: 'a;

    fn make_dir(&mut self, path: &TargetPath) -> io::Result<()> {
        // fatfs opens an existing directory instead of failing.
        self.fs.root_dir().create_dir(path.relative())?;
        Ok(())
    }

    fn create_new(&mut self, path: &TargetPath) -> io::Result<Self::File<'_>> {
        let root = self.fs.root_dir();
        let name = path.relative();
        match root.open_file(name) {
            Ok(_) => Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{path}' already exists on the volume"),
            )),
            Err(err) if err.kind() == io::ErrorKind::NotFound => root.create_file(name),
            Err(err) => Err(err),
        }
    }
}

impl<'a, 'd> VolumeFile for fatfs::File<'a, DeviceStream<'d>> {
    /// A short count means the volume ran out of clusters.
    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize> {
        // fatfs stops every write at the end of the current cluster.
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) if written > 0 => break,
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }

    fn close(mut self) -> io::Result<()> {
        self.flush()
    }
}
