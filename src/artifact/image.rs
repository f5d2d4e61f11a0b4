//! Serialization of the built block device.
//!
//! The image is the device buffer from offset 0, cut either at the
//! high-water mark (`truncate`) or at full capacity. [`persist_image`]
//! follows the atomic artifact pattern: bytes go to a temp file next to the
//! destination which is renamed into place only once everything is written,
//! so a failed build never leaves a half-written image behind.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::device::BlockDevice;
use crate::error::BuildError;

/// What ended up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// The bytes an image of `device` consists of.
pub fn image_bytes(device: &BlockDevice, truncate: bool) -> &[u8] {
    if truncate {
        device.used_bytes()
    } else {
        device.as_bytes()
    }
}

/// Write the image to `out`, returning the number of bytes emitted.
pub fn write_image<W: Write>(device: &BlockDevice, truncate: bool, out: &mut W) -> io::Result<u64> {
    let bytes = image_bytes(device, truncate);
    out.write_all(bytes)?;
    out.flush()?;
    Ok(bytes.len() as u64)
}

/// Write the image to `output` via a temp file and rename.
///
/// Without `force_overwrite` the rename refuses to clobber a file that
/// appeared at `output` while the build was running.
pub fn persist_image(
    device: &BlockDevice,
    truncate: bool,
    output: &Path,
    force_overwrite: bool,
) -> Result<ImageSummary, BuildError> {
    let dest_err = |source: io::Error| BuildError::DestinationWrite {
        path: output.to_path_buf(),
        source,
    };

    let parent = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent).map_err(dest_err)?;
    debug!("staging image in {}", tmp.path().display());

    let written = write_image(device, truncate, tmp.as_file_mut()).map_err(dest_err)?;
    tmp.as_file().sync_all().map_err(dest_err)?;

    if force_overwrite {
        tmp.persist(output).map_err(|err| dest_err(err.error))?;
    } else {
        tmp.persist_noclobber(output).map_err(|err| {
            if err.error.kind() == io::ErrorKind::AlreadyExists {
                BuildError::Refusal(output.to_path_buf())
            } else {
                dest_err(err.error)
            }
        })?;
    }

    let sha256 = format!("{:x}", Sha256::digest(image_bytes(device, truncate)));
    info!("- written: {} bytes to {}", written, output.display());

    Ok(ImageSummary {
        path: output.to_path_buf(),
        bytes: written,
        sha256,
    })
}
