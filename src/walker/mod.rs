//! Depth-first replay of a host directory tree.
//!
//! [`walk_tree`] visits the source tree once, physically (symlinks are never
//! followed), parents before children, siblings in file-name order. Each
//! directory and regular file is handed to a [`TreeVisitor`]; the first error
//! the visitor returns stops the walk on the spot.
//!
//! - [`path`] - volume-side [`TargetPath`]
//! - [`populate`] - the visitor that copies entries onto a volume

pub mod path;
pub mod populate;

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{BuildError, ConfigError};

pub use path::{TargetPath, MAX_TARGET_PATH_LEN};
pub use populate::{Populator, CHUNK_SIZE};

/// Names dropped by default: desktop metadata that has no place on a device.
pub const DEFAULT_IGNORE: &[&str] = &[".DS_Store", "._*", "Thumbs.db"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One node of the source tree, produced while walking.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub absolute_path: PathBuf,
    pub kind: EntryKind,
    /// Byte length, for files only.
    pub size: Option<u64>,
    pub target_path: TargetPath,
}

/// Receives entries from [`walk_tree`].
pub trait TreeVisitor {
    fn visit_dir(&mut self, entry: &TreeEntry) -> Result<(), BuildError>;

    fn visit_file(&mut self, entry: &TreeEntry) -> Result<(), BuildError>;
}

/// Glob patterns matched against the final segment of each entry.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    patterns: Vec<glob::Pattern>,
}

impl IgnoreList {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                glob::Pattern::new(raw).map_err(|source| ConfigError::InvalidIgnorePattern {
                    pattern: raw.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }
}

/// What a walk saw, beyond what the visitor did with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub directories: u64,
    pub files: u64,
    /// Entries (and whole subtrees) dropped by the ignore list.
    pub ignored: u64,
    /// Symlinks and special files.
    pub skipped: u64,
}

/// Walk `root` depth-first and replay every entry into `visitor`.
///
/// The root itself is the volume root and is never handed to the visitor.
pub fn walk_tree<V: TreeVisitor>(
    root: &Path,
    ignore: &IgnoreList,
    visitor: &mut V,
) -> Result<WalkSummary, BuildError> {
    let mut summary = WalkSummary::default();
    let mut visited_dirs: HashSet<TargetPath> = HashSet::new();
    visited_dirs.insert(TargetPath::root());

    let mut entries = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(next) = entries.next() {
        let entry = next.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            BuildError::source_io(path, io::Error::from(err))
        })?;
        let file_type = entry.file_type();

        if entry.depth() == 0 {
            if !file_type.is_dir() {
                return Err(ConfigError::SourceRootNotDirectory(root.to_path_buf()).into());
            }
            continue;
        }

        let target = TargetPath::from_source(root, entry.path())?;
        let name = entry.file_name().to_string_lossy();
        if ignore.matches(&name) {
            info!("- skip {} (ignored)", target);
            summary.ignored += 1;
            if file_type.is_dir() {
                entries.skip_current_dir();
            }
            continue;
        }

        let parent = target.parent().unwrap_or_else(TargetPath::root);
        if !visited_dirs.contains(&parent) {
            return Err(BuildError::source_io(
                entry.path(),
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("reached '{target}' before its directory '{parent}'"),
                ),
            ));
        }

        if file_type.is_dir() {
            let tree_entry = TreeEntry {
                absolute_path: entry.path().to_path_buf(),
                kind: EntryKind::Directory,
                size: None,
                target_path: target.clone(),
            };
            visitor.visit_dir(&tree_entry)?;
            visited_dirs.insert(target);
            summary.directories += 1;
        } else if file_type.is_file() {
            let metadata = entry
                .metadata()
                .map_err(|err| BuildError::source_io(entry.path(), io::Error::from(err)))?;
            let tree_entry = TreeEntry {
                absolute_path: entry.path().to_path_buf(),
                kind: EntryKind::File,
                size: Some(metadata.len()),
                target_path: target,
            };
            visitor.visit_file(&tree_entry)?;
            summary.files += 1;
        } else {
            warn!("- skip {} (symlink or special file)", target);
            summary.skipped += 1;
        }
    }

    debug!(
        "walked {}: {} dirs, {} files, {} ignored, {} skipped",
        root.display(),
        summary.directories,
        summary.files,
        summary.ignored,
        summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Records the order entries arrive in.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(EntryKind, String)>,
        fail_on: Option<String>,
    }

    impl Recorder {
        fn record(&mut self, entry: &TreeEntry) -> Result<(), BuildError> {
            let path = entry.target_path.to_string();
            if self.fail_on.as_deref() == Some(path.as_str()) {
                return Err(BuildError::volume_write(
                    &path,
                    io::Error::new(io::ErrorKind::Other, "injected"),
                ));
            }
            self.seen.push((entry.kind, path));
            Ok(())
        }
    }

    impl TreeVisitor for Recorder {
        fn visit_dir(&mut self, entry: &TreeEntry) -> Result<(), BuildError> {
            self.record(entry)
        }

        fn visit_file(&mut self, entry: &TreeEntry) -> Result<(), BuildError> {
            assert!(entry.size.is_some());
            self.record(entry)
        }
    }

    fn sample_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("lib/net")).unwrap();
        fs::create_dir_all(root.join("apps")).unwrap();
        fs::write(root.join("main.py"), "import apps\n").unwrap();
        fs::write(root.join("apps/clock.py"), "tick").unwrap();
        fs::write(root.join("lib/net/http.py"), "get").unwrap();
        fs::write(root.join("lib/util.py"), "").unwrap();
        temp
    }

    #[test]
    fn test_parents_before_children_in_name_order() {
        let temp = sample_tree();
        let mut recorder = Recorder::default();
        let summary = walk_tree(temp.path(), &IgnoreList::default(), &mut recorder).unwrap();

        let paths: Vec<&str> = recorder.seen.iter().map(|(_, p)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/apps",
                "/apps/clock.py",
                "/lib",
                "/lib/net",
                "/lib/net/http.py",
                "/lib/util.py",
                "/main.py",
            ]
        );
        assert_eq!(summary.directories, 3);
        assert_eq!(summary.files, 4);
    }

    #[test]
    fn test_ignored_names_and_subtrees_skipped() {
        let temp = sample_tree();
        fs::write(temp.path().join(".DS_Store"), "junk").unwrap();
        fs::write(temp.path().join("apps/._clock.py"), "junk").unwrap();
        fs::create_dir_all(temp.path().join("__pycache__/deep")).unwrap();
        fs::write(temp.path().join("__pycache__/deep/x.pyc"), "junk").unwrap();

        let mut patterns: Vec<String> = DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect();
        patterns.push("__pycache__".to_string());
        let ignore = IgnoreList::new(&patterns).unwrap();

        let mut recorder = Recorder::default();
        let summary = walk_tree(temp.path(), &ignore, &mut recorder).unwrap();

        assert!(recorder.seen.iter().all(|(_, p)| !p.contains("DS_Store")
            && !p.contains("._")
            && !p.contains("__pycache__")));
        assert_eq!(summary.ignored, 3);
        assert_eq!(summary.files, 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let temp = sample_tree();
        std::os::unix::fs::symlink(temp.path().join("lib"), temp.path().join("lib-link")).unwrap();
        std::os::unix::fs::symlink("main.py", temp.path().join("alias.py")).unwrap();

        let mut recorder = Recorder::default();
        let summary = walk_tree(temp.path(), &IgnoreList::default(), &mut recorder).unwrap();

        assert_eq!(summary.skipped, 2);
        assert!(recorder.seen.iter().all(|(_, p)| p != "/lib-link" && p != "/alias.py"));
    }

    #[test]
    fn test_visitor_error_stops_walk() {
        let temp = sample_tree();
        let mut recorder = Recorder {
            fail_on: Some("/lib".to_string()),
            ..Default::default()
        };
        let err = walk_tree(temp.path(), &IgnoreList::default(), &mut recorder).unwrap_err();

        assert!(matches!(err, BuildError::VolumeWrite { .. }));
        // Nothing after the failing entry was visited.
        let paths: Vec<&str> = recorder.seen.iter().map(|(_, p)| p.as_str()).collect();
        assert_eq!(paths, vec!["/apps", "/apps/clock.py"]);
    }

    #[test]
    fn test_root_must_be_a_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let mut recorder = Recorder::default();
        let err = walk_tree(&file, &IgnoreList::default(), &mut recorder).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Config(ConfigError::SourceRootNotDirectory(_))
        ));
    }

    #[test]
    fn test_missing_root_is_source_error() {
        let temp = TempDir::new().unwrap();
        let mut recorder = Recorder::default();
        let err = walk_tree(
            &temp.path().join("absent"),
            &IgnoreList::default(),
            &mut recorder,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::SourceIo { .. }));
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let err = IgnoreList::new(&["[unclosed"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIgnorePattern { .. }));
    }
}
