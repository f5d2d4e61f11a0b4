//! Volume-side paths.

use std::fmt;
use std::path::{Component, Path};

use crate::error::PathError;

/// Longest target path accepted, in bytes.
pub const MAX_TARGET_PATH_LEN: usize = 1024;

/// A path on the volume: `/`-separated, always absolute.
///
/// Built from a host path by stripping the source root, so `R/a/b.txt`
/// becomes `/a/b.txt` and `R` itself becomes `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetPath(String);

impl TargetPath {
    pub fn root() -> Self {
        TargetPath("/".to_string())
    }

    /// Map `path` (somewhere under `root`) onto the volume.
    pub fn from_source(root: &Path, path: &Path) -> Result<Self, PathError> {
        let relative = path
            .strip_prefix(root)
            .map_err(|_| PathError::OutsideRoot {
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            })?;

        let mut target = String::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name
                        .to_str()
                        .ok_or_else(|| PathError::NonUtf8(path.to_path_buf()))?;
                    target.push('/');
                    target.push_str(name);
                }
                Component::CurDir => {}
                _ => {
                    return Err(PathError::OutsideRoot {
                        path: path.to_path_buf(),
                        root: root.to_path_buf(),
                    })
                }
            }
            check_len(&target)?;
        }

        if target.is_empty() {
            return Ok(Self::root());
        }
        Ok(TargetPath(target))
    }

    /// Parse an already volume-shaped path such as `/apps/main.py`.
    pub fn from_volume_str(path: &str) -> Result<Self, PathError> {
        check_len(path)?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Ok(Self::root());
        }
        Ok(TargetPath(format!("/{}", segments.join("/"))))
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path without its leading separator, as drivers expect it.
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }

    /// Final segment; `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Enclosing directory; `None` for the root.
    pub fn parent(&self) -> Option<TargetPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(TargetPath(self.0[..idx].to_string())),
        }
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_len(path: &str) -> Result<(), PathError> {
    if path.len() > MAX_TARGET_PATH_LEN {
        return Err(PathError::TooLong {
            path: path.to_string(),
            len: path.len(),
            max: MAX_TARGET_PATH_LEN,
        });
    }
    Ok(())
}
