//! Work folder discovery
//!
//! Depth-bounded lazy traversal of one library root. A directory whose
//! name carries a catalog code is a work folder and a leaf by convention:
//! it is yielded and never descended into. Hidden (dot-prefixed)
//! directories are ignored. Permission errors on single entries are
//! logged and skipped; any other walk error aborts the walk of this root.

use std::path::PathBuf;
use vwlib_common::config::RootFolder;
use vwlib_common::rcode::WorkId;
use vwlib_common::{Error, Result};
use walkdir::WalkDir;

/// One discovered work folder (ephemeral)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFolder {
    pub id: WorkId,
    /// Alias of the root it was found under
    pub root_name: String,
    /// Absolute folder path
    pub absolute: PathBuf,
    /// Path relative to the root
    pub relative: PathBuf,
}

/// Lazy, restartable iterator over one root's work folders
pub struct FolderWalker {
    root: RootFolder,
    it: walkdir::IntoIter,
}

impl FolderWalker {
    pub fn new(root: &RootFolder, max_depth: usize) -> Self {
        let it = WalkDir::new(&root.path)
            .min_depth(1)
            .max_depth(max_depth.max(1))
            .into_iter();
        Self {
            root: root.clone(),
            it,
        }
    }
}

impl Iterator for FolderWalker {
    type Item = Result<WorkFolder>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.it.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let permission = e
                        .io_error()
                        .map(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
                        .unwrap_or(false);
                    if permission {
                        tracing::warn!(root = %self.root.name, error = %e, "Permission denied, skipping entry");
                        continue;
                    }
                    return Some(Err(Error::Io(std::io::Error::other(format!(
                        "walk failed under root '{}': {e}",
                        self.root.name
                    )))));
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') {
                self.it.skip_current_dir();
                continue;
            }

            if let Some(id) = WorkId::find_in(&name) {
                // work folders are leaves; whatever is nested inside
                // belongs to this work
                self.it.skip_current_dir();

                let relative = entry
                    .path()
                    .strip_prefix(&self.root.path)
                    .unwrap_or(entry.path())
                    .to_path_buf();
                return Some(Ok(WorkFolder {
                    id,
                    root_name: self.root.name.clone(),
                    absolute: entry.path().to_path_buf(),
                    relative,
                }));
            }
        }
    }
}

/// Collect every work folder under every configured root.
///
/// Errors from one root abort discovery; the scan treats them as fatal.
pub fn discover_all(roots: &[RootFolder], max_depth: usize) -> Result<Vec<WorkFolder>> {
    let mut folders = Vec::new();
    for root in roots {
        for folder in FolderWalker::new(root, max_depth) {
            folders.push(folder?);
        }
    }
    Ok(folders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn root(name: &str, path: &Path) -> RootFolder {
        RootFolder {
            name: name.to_string(),
            path: path.to_path_buf(),
        }
    }

    fn collect(base: &Path, depth: usize) -> Vec<WorkFolder> {
        discover_all(&[root("main", base)], depth).unwrap()
    }

    #[test]
    fn finds_work_folders_within_depth_bound() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("RJ111111 title")).unwrap();
        fs::create_dir_all(tmp.path().join("circle-a/RJ222222")).unwrap();
        fs::create_dir_all(tmp.path().join("a/b/RJ333333")).unwrap();

        let found = collect(tmp.path(), 2);
        let mut ids: Vec<String> = found.iter().map(|f| f.id.code()).collect();
        ids.sort();
        // depth 2 reaches circle-a/RJ222222 but not a/b/RJ333333
        assert_eq!(ids, vec!["RJ111111", "RJ222222"]);

        let deeper = collect(tmp.path(), 3);
        assert_eq!(deeper.len(), 3);
    }

    #[test]
    fn work_folders_are_leaves() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("RJ111111/RJ999999 nested")).unwrap();

        let found = collect(tmp.path(), 4);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.code(), "RJ111111");
    }

    #[test]
    fn records_relative_path_and_root_alias() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sub/RJ123456 x")).unwrap();

        let found = collect(tmp.path(), 2);
        assert_eq!(found[0].root_name, "main");
        assert_eq!(found[0].relative, PathBuf::from("sub/RJ123456 x"));
        assert!(found[0].absolute.is_absolute() || found[0].absolute.starts_with(tmp.path()));
    }

    #[test]
    fn hidden_directories_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(".trash/RJ111111")).unwrap();
        fs::create_dir_all(tmp.path().join("RJ222222")).unwrap();

        let found = collect(tmp.path(), 3);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.code(), "RJ222222");
    }

    #[test]
    fn plain_files_with_code_names_are_not_works() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("RJ111111.zip"), b"archive").unwrap();

        assert!(collect(tmp.path(), 2).is_empty());
    }
}
