//! # Storage Addressing
//!
//! Maps a dataset id to its on-disk location:
//!
//! ```text
//! <data_dir>/
//!   dataset_<id>/data.db    one SQLite store per dataset
//!   scratch/                transient upload files
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use super::errors::DatasetResult;
use super::id::DatasetId;

/// Directory prefix of every dataset directory
const DATASET_DIR_PREFIX: &str = "dataset_";
/// Store file name inside a dataset directory
const STORE_FILE_NAME: &str = "data.db";
/// Scratch directory for uploads being ingested
const SCRATCH_DIR_NAME: &str = "scratch";

/// Filesystem layout of all datasets under one root
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    /// Create a layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root and scratch directories if missing
    pub fn ensure_dirs(&self) -> DatasetResult<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.scratch_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one dataset's store
    pub fn dataset_dir(&self, id: &DatasetId) -> PathBuf {
        self.root
            .join(format!("{}{}", DATASET_DIR_PREFIX, id.as_str()))
    }

    /// Location of a dataset's store. Pure function of the id.
    pub fn locate(&self, id: &DatasetId) -> PathBuf {
        self.dataset_dir(id).join(STORE_FILE_NAME)
    }

    /// Whether a store exists at the derived location
    pub fn exists(&self, id: &DatasetId) -> bool {
        self.locate(id).is_file()
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join(SCRATCH_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_is_deterministic() {
        let layout = DatasetLayout::new("/srv/data");
        let id = DatasetId::parse("abc").unwrap();
        assert_eq!(layout.locate(&id), layout.locate(&id));
        assert_eq!(
            layout.locate(&id),
            PathBuf::from("/srv/data/dataset_abc/data.db")
        );
    }

    #[test]
    fn test_distinct_ids_distinct_locations() {
        let layout = DatasetLayout::new("/srv/data");
        let a = DatasetId::parse("a_b").unwrap();
        let b = DatasetId::parse("a-b").unwrap();
        assert_ne!(layout.locate(&a), layout.locate(&b));
    }

    #[test]
    fn test_exists_checks_store_file() {
        let temp = TempDir::new().unwrap();
        let layout = DatasetLayout::new(temp.path());
        let id = DatasetId::parse("present").unwrap();

        assert!(!layout.exists(&id));

        // A bare directory is not a dataset
        fs::create_dir_all(layout.dataset_dir(&id)).unwrap();
        assert!(!layout.exists(&id));

        fs::write(layout.locate(&id), b"").unwrap();
        assert!(layout.exists(&id));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp = TempDir::new().unwrap();
        let layout = DatasetLayout::new(temp.path().join("nested"));
        layout.ensure_dirs().unwrap();
        assert!(layout.scratch_dir().is_dir());
    }
}
