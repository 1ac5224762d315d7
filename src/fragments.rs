//! Fragment Discovery
//!
//! Lists fragment files in a folder. Merge results depend on the order
//! returned here, so the order is always an explicit choice.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileOrder {
    /// Sorted by file name.
    #[default]
    Name,
    /// Whatever the directory listing yields.
    Listing,
}

#[derive(Debug, Clone)]
pub struct FragmentSet {
    pub folder: PathBuf,
    pub extensions: Vec<String>,
    pub order: FileOrder,
    /// Fragment merged before all others.
    pub root: Option<String>,
    /// File names never treated as fragments.
    pub skip: Vec<String>,
}

impl FragmentSet {
    pub fn new(folder: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            folder: folder.into(),
            extensions,
            order: FileOrder::default(),
            root: None,
            skip: vec![],
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.skip.iter().any(|s| s == name) {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
    }

    /// Fragment paths in merge order. Sub-directories are not searched.
    pub fn discover(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = vec![];
        for entry in fs::read_dir(&self.folder)? {
            let path = entry?.path();
            // Follows symlinks, so linked fragments are merged too.
            if path.is_file() && self.matches(&path) {
                files.push(path);
            }
        }

        if self.order == FileOrder::Name {
            files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        }

        if let Some(root) = &self.root {
            let index = files
                .iter()
                .position(|p| p.file_name().and_then(|n| n.to_str()) == Some(root.as_str()))
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("root fragment {} not found in {}", root, self.folder.display()),
                    )
                })?;
            let root_path = files.remove(index);
            files.insert(0, root_path);
        }

        debug!(folder = %self.folder.display(), count = files.len(), "discovered fragments");
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn yaml_set(dir: &Path) -> FragmentSet {
        FragmentSet::new(dir, vec!["yaml".into(), "yml".into()])
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b.yml", "a.yaml", "notes.txt", "C.YAML"] {
            fs::write(dir.path().join(name), "x: 1").unwrap();
        }
        fs::create_dir(dir.path().join("nested.yaml")).unwrap();

        let files = yaml_set(dir.path()).discover().unwrap();
        assert_eq!(names(&files), vec!["C.YAML", "a.yaml", "b.yml"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_fragment_included() {
        let dir = TempDir::new().unwrap();
        let shared = TempDir::new().unwrap();
        let target = shared.path().join("common.yaml");
        fs::write(&target, "a: 1").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("linked.yaml")).unwrap();
        std::os::unix::fs::symlink(shared.path(), dir.path().join("linked-dir.yaml")).unwrap();

        let files = yaml_set(dir.path()).discover().unwrap();
        assert_eq!(names(&files), vec!["linked.yaml"]);
    }

    #[test]
    fn test_root_first_and_skip() {
        let dir = TempDir::new().unwrap();
        for name in ["a.yaml", "b.yaml", "openapi.yaml", "z-base.yaml"] {
            fs::write(dir.path().join(name), "x: 1").unwrap();
        }

        let mut set = yaml_set(dir.path());
        set.root = Some("z-base.yaml".into());
        set.skip = vec!["openapi.yaml".into()];
        let files = set.discover().unwrap();
        assert_eq!(names(&files), vec!["z-base.yaml", "a.yaml", "b.yaml"]);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut set = yaml_set(dir.path());
        set.root = Some("base.yaml".into());
        assert_eq!(set.discover().unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_missing_folder_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(yaml_set(&dir.path().join("absent")).discover().is_err());
    }
}
