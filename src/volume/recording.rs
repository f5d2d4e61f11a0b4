//! In-memory [`Volume`] that records every call, for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use super::{Volume, VolumeFile};
use crate::walker::TargetPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    MakeDir(String),
    Create(String),
    Write(String, usize),
    Close(String),
}

#[derive(Debug, Default)]
pub(crate) struct RecordingVolume {
    pub(crate) calls: Vec<Call>,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    /// Total file bytes accepted before writes come up short.
    capacity: Option<usize>,
    used: usize,
}

impl RecordingVolume {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Default::default()
        }
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub(crate) fn file(&self, path: &str) -> Option<&Vec<u8>> {
        self.files.get(path)
    }
}

impl Volume for RecordingVolume {
    type File<'a> = RecordingFile<'a>;

    fn make_dir(&mut self, path: &TargetPath) -> io::Result<()> {
        self.calls.push(Call::MakeDir(path.to_string()));
        self.dirs.insert(path.to_string());
        Ok(())
    }

    fn create_new(&mut self, path: &TargetPath) -> io::Result<Self::File<'_>> {
        let key = path.to_string();
        self.calls.push(Call::Create(key.clone()));
        if self.files.contains_key(&key) || self.dirs.contains(&key) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{key}' exists"),
            ));
        }
        self.files.insert(key.clone(), Vec::new());
        Ok(RecordingFile {
            volume: self,
            path: key,
        })
    }
}

pub(crate) struct RecordingFile<'a> {
    volume: &'a mut RecordingVolume,
    path: String,
}

impl VolumeFile for RecordingFile<'_> {
    fn write_chunk(&mut self, buf: &[u8]) -> io::Result<usize> {
        let accepted = match self.volume.capacity {
            Some(capacity) => buf.len().min(capacity.saturating_sub(self.volume.used)),
            None => buf.len(),
        };
        self.volume.used += accepted;
        self.volume
            .calls
            .push(Call::Write(self.path.clone(), accepted));
        self.volume
            .files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn close(self) -> io::Result<()> {
        self.volume.calls.push(Call::Close(self.path));
        Ok(())
    }
}
