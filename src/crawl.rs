//! Corpus crawler: read each file's identity, map it, group by station and
//! variable, and optionally copy the file into a tree keyed by sensor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::corpus::netcdf_files;
use crate::error::Result;
use crate::store::{FileOps, NcStore};
use crate::timefmt::report_stamp;
use crate::urn::{map_identity, IdentityMaps};

/// Default name of the crawl report.
pub const REPORT_FILE: &str = "sensor_files.json";

/// Metadata for one crawled file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub file: PathBuf,
    pub start: String,
    pub end: String,
    pub lat: f64,
    pub lon: f64,
    pub mapped_station: String,
    pub sensor_urn: String,
    pub mapped_sensor: String,
}

/// station identity → variable → files, stations in sorted order
pub type CrawlReport = BTreeMap<String, BTreeMap<String, Vec<FileRecord>>>;

/// Where, if anywhere, crawled files are copied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CopyPolicy {
    #[serde(default)]
    pub enabled: bool,
    pub destination: Option<PathBuf>,
}

impl CopyPolicy {
    pub fn to(destination: impl Into<PathBuf>) -> Self {
        Self { enabled: true, destination: Some(destination.into()) }
    }

    fn target(&self) -> Option<&Path> {
        self.destination.as_deref().filter(|_| self.enabled)
    }
}

/// 1. Crawl every NetCDF file under `roots`. Unreadable files, unmappable
/// identities and failed copies are logged and skipped.
pub fn crawl(
    roots: &[PathBuf],
    maps: &IdentityMaps,
    copy: &CopyPolicy,
    store: &dyn NcStore,
    fs: &dyn FileOps,
) -> CrawlReport {
    let mut out = CrawlReport::new();

    for root in roots {
        for path in netcdf_files(root) {
            match crawl_file(&path, maps, store) {
                Ok(record) => {
                    if let Some(dest) = copy.target() {
                        if let Err(e) = copy_into(&path, dest, &record.mapped_sensor, fs) {
                            warn!("Could not copy {}: {e}", path.display());
                        }
                    }
                    let variable = record.sensor_urn.rsplit(':').next().unwrap_or_default().to_string();
                    out.entry(record.mapped_station.clone())
                        .or_default()
                        .entry(variable)
                        .or_default()
                        .push(record);
                }
                Err(e) => warn!("Skipping {}: {e}", path.display()),
            }
        }
    }

    info!("Crawled {} station(s)", out.len());
    out
}

/// 2. Read one header and map its identity
fn crawl_file(path: &Path, maps: &IdentityMaps, store: &dyn NcStore) -> Result<FileRecord> {
    let header = store.read_header(path)?;
    let mapped = map_identity(&header.instrument_urn, maps)?;
    debug!("{} -> {}", header.instrument_urn, mapped.sensor_urn);

    Ok(FileRecord {
        file: path.to_path_buf(),
        start: report_stamp(header.first_time),
        end: report_stamp(header.last_time),
        lat: header.latitude,
        lon: header.longitude,
        mapped_station: mapped.station_urn,
        sensor_urn: header.instrument_urn,
        mapped_sensor: mapped.sensor_urn,
    })
}

/// 3. Copy into `destination/<mapped sensor>/`
fn copy_into(path: &Path, destination: &Path, mapped_sensor: &str, fs: &dyn FileOps) -> Result<()> {
    let sensor_dir = destination.join(mapped_sensor);
    fs.create_dir_all(&sensor_dir)?;
    let target = sensor_dir.join(path.file_name().unwrap_or_default());
    // already sorted into place
    if fs.same_file(path, &target) {
        debug!("'{}' is already in place", path.display());
        return Ok(());
    }
    debug!("Copying '{}' to '{}'", path.display(), target.display());
    fs.copy(path, &target)
}

/// 4. Write the crawl report as pretty JSON.
pub fn write_report(path: &Path, report: &CrawlReport, fs: &dyn FileOps) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs.write(path, json.as_bytes())
}
