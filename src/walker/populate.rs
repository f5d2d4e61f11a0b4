//! Copies walked entries onto a volume.

use std::fs::File;
use std::io::{self, Read};

use log::{debug, info};

use super::{TreeEntry, TreeVisitor};
use crate::error::BuildError;
use crate::volume::{Volume, VolumeFile};

/// Bytes moved per read/write round trip.
pub const CHUNK_SIZE: usize = 1024;

/// Running totals of what was written to the volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateStats {
    pub directories: u64,
    pub files: u64,
    pub bytes: u64,
}

/// [`TreeVisitor`] that recreates each entry on a [`Volume`].
pub struct Populator<'v, V: Volume> {
    volume: &'v mut V,
    buffer: Vec<u8>,
    stats: PopulateStats,
}

impl<'v, V: Volume> Populator<'v, V> {
    pub fn new(volume: &'v mut V) -> Self {
        Self {
            volume,
            buffer: vec![0; CHUNK_SIZE],
            stats: PopulateStats::default(),
        }
    }

    pub fn stats(&self) -> PopulateStats {
        self.stats
    }
}

impl<V: Volume> TreeVisitor for Populator<'_, V> {
    fn visit_dir(&mut self, entry: &TreeEntry) -> Result<(), BuildError> {
        let target = &entry.target_path;
        if target.is_root() {
            return Ok(());
        }
        info!("- mkdir {}", target);
        self.volume
            .make_dir(target)
            .map_err(|source| BuildError::volume_write(target, source))?;
        self.stats.directories += 1;
        Ok(())
    }

    fn visit_file(&mut self, entry: &TreeEntry) -> Result<(), BuildError> {
        let target = &entry.target_path;
        info!("- copy {}", target);

        let mut file = self
            .volume
            .create_new(target)
            .map_err(|source| BuildError::volume_write(target, source))?;
        let mut source = File::open(&entry.absolute_path)
            .map_err(|err| BuildError::source_io(&entry.absolute_path, err))?;

        let mut copied = 0u64;
        loop {
            let read = match source.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(BuildError::source_io(&entry.absolute_path, err)),
            };
            let written = file
                .write_chunk(&self.buffer[..read])
                .map_err(|source| BuildError::volume_write(target, source))?;
            if written != read {
                return Err(BuildError::ShortWrite {
                    path: target.to_string(),
                    read,
                    written,
                });
            }
            copied += read as u64;
        }
        file.close()
            .map_err(|source| BuildError::volume_write(target, source))?;

        debug!("  {} bytes", copied);
        self.stats.files += 1;
        self.stats.bytes += copied;
        Ok(())
    }
}
