//! Locating NetCDF files and sensor directories in a corpus tree.

use std::path::{Path, PathBuf};

use glob::{glob, Pattern};
use log::warn;
use walkdir::WalkDir;

use crate::urn::SensorUrn;

/// NcML descriptors share the `.nc` prefix but are not data files.
pub const DESCRIPTOR_EXTENSION: &str = "ncml";

/// `.nc`, `.nc4`, `.ncd` ... but never `.ncml`.
pub fn is_netcdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| e.starts_with("nc") && e != DESCRIPTOR_EXTENSION)
}

/// Every NetCDF file under `root`, in walk order sorted by file name.
pub fn netcdf_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("Skipping unreadable entry under {}: {err}", root.display());
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_netcdf(e.path()))
        .map(|e| e.into_path())
        .collect()
}

/// A directory named after a canonical sensor identity.
#[derive(Debug, Clone)]
pub struct SensorDir {
    pub path: PathBuf,
    pub urn: SensorUrn,
    /// Eligible data files, sorted
    pub files: Vec<PathBuf>,
}

/// Sensor directories under `root` holding at least one NetCDF file whose
/// name is not in `exclude`.
pub fn sensor_dirs(root: &Path, exclude: &[&str]) -> Vec<SensorDir> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let urn = SensorUrn::parse(e.file_name().to_str()?)?;
            let files = list_netcdf(e.path(), exclude);
            (!files.is_empty()).then(|| SensorDir { path: e.into_path(), urn, files })
        })
        .collect()
}

/// NetCDF files directly inside `dir`.
pub fn list_netcdf(dir: &Path, exclude: &[&str]) -> Vec<PathBuf> {
    let pattern = format!("{}/*.nc*", Pattern::escape(&dir.to_string_lossy()));
    let mut v: Vec<_> = match glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            warn!("Bad file pattern for {}: {e}", dir.display());
            return Vec::new();
        }
    };
    v.retain(|p| {
        is_netcdf(p)
            && p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !exclude.contains(&n))
    });
    v.sort();
    v
}
