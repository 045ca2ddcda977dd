//! In-memory stand-ins for the NetCDF and filesystem capabilities.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::dataset::{AttributeMap, DatasetSpec};
use crate::error::{Error, Result};
use crate::store::{FileHeader, FileOps, NcStore, SensorChunk};

#[derive(Default)]
pub struct MemoryStore {
    pub headers: BTreeMap<PathBuf, FileHeader>,
    pub chunks: BTreeMap<PathBuf, SensorChunk>,
    pub written: RefCell<BTreeMap<PathBuf, DatasetSpec>>,
}

impl MemoryStore {
    pub fn written(&self, path: &Path) -> Option<DatasetSpec> {
        self.written.borrow().get(path).cloned()
    }
}

fn absent(path: &Path) -> Error {
    Error::MissingVariable { name: "fixture".into(), path: path.to_path_buf() }
}

impl NcStore for MemoryStore {
    fn read_header(&self, path: &Path) -> Result<FileHeader> {
        self.headers.get(path).cloned().ok_or_else(|| absent(path))
    }

    fn read_sensor(&self, path: &Path, _variable: &str) -> Result<SensorChunk> {
        self.chunks.get(path).cloned().ok_or_else(|| absent(path))
    }

    fn write_dataset(&self, path: &Path, dataset: &DatasetSpec) -> Result<()> {
        self.written.borrow_mut().insert(path.to_path_buf(), dataset.clone());
        Ok(())
    }
}

/// Records side effects instead of touching the disk.
#[derive(Default)]
pub struct MemoryFs {
    pub dirs: RefCell<BTreeSet<PathBuf>>,
    pub files: RefCell<BTreeMap<PathBuf, Vec<u8>>>,
    pub copies: RefCell<Vec<(PathBuf, PathBuf)>>,
    pub removed: RefCell<Vec<PathBuf>>,
    /// Copies into paths under this prefix fail with a permission error
    pub deny_copies_under: Option<PathBuf>,
}

impl MemoryFs {
    pub fn text(&self, path: &Path) -> Option<String> {
        self.files.borrow().get(path).map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

impl FileOps for MemoryFs {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.dirs.borrow_mut().insert(path.to_path_buf());
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        if self.deny_copies_under.as_deref().is_some_and(|p| to.starts_with(p)) {
            return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into());
        }
        self.copies.borrow_mut().push((from.to_path_buf(), to.to_path_buf()));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.files.borrow_mut().remove(path);
        self.removed.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.files.borrow_mut().insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn same_file(&self, a: &Path, b: &Path) -> bool {
        a == b
    }
}

/// A 1-D chunk with no height axis.
pub fn series_chunk(times: &[i64], values: &[f64], lat: f64, lon: f64) -> SensorChunk {
    SensorChunk {
        rank: 1,
        times: times.to_vec(),
        heights: vec![None],
        values: values.iter().map(|&v| Some(v)).collect(),
        latitude: lat,
        longitude: lon,
        global_attributes: AttributeMap::new(),
        variable_attributes: AttributeMap::new(),
    }
}
