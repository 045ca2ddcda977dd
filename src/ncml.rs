//! NcML aggregation descriptors, one per sensor directory.

use std::path::{Path, PathBuf};

use log::{info, warn};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::corpus::{sensor_dirs, SensorDir, DESCRIPTOR_EXTENSION};
use crate::error::{Error, Result};
use crate::store::{FileOps, NcStore};
use crate::timefmt::coverage_stamp;

pub const NCML_NAMESPACE: &str = "http://www.unidata.ucar.edu/namespaces/netcdf/ncml-2.2";

/// Default name of the descriptor list.
pub const MANIFEST_FILE: &str = "ncml_files.json";

/// Write a descriptor into every sensor directory under `corpus_root`.
///
/// With `target_file`, the descriptor points at that one file and takes its
/// time extent from it; directories without it are skipped. Otherwise the
/// descriptor aggregates every data file along `time` and the extent is the
/// union over them. Returns the paths written.
pub fn write_descriptors(
    corpus_root: &Path,
    filename: Option<&str>,
    target_file: Option<&str>,
    store: &dyn NcStore,
    fs: &dyn FileOps,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for dir in sensor_dirs(corpus_root, &[]) {
        let result = match target_file {
            Some(target) if !dir.files.iter().any(|f| f.file_name().is_some_and(|n| n == target)) => {
                warn!("No target file ({target}) found in {}, skipping", dir.path.display());
                continue;
            }
            _ => write_descriptor(&dir, filename, target_file, store, fs),
        };
        match result {
            Ok(path) => {
                info!("Finished writing: {}", path.display());
                written.push(path);
            }
            Err(e) if e.is_recoverable() => warn!("Skipping {}: {e}", dir.path.display()),
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

fn write_descriptor(
    dir: &SensorDir,
    filename: Option<&str>,
    target_file: Option<&str>,
    store: &dyn NcStore,
    fs: &dyn FileOps,
) -> Result<PathBuf> {
    let sources: Vec<PathBuf> = match target_file {
        Some(target) => vec![dir.path.join(target)],
        None => dir.files.clone(),
    };
    let (start, end) = time_extent(&sources, store)?;

    let location = match target_file {
        Some(target) => target.to_string(),
        None => dir.path.to_string_lossy().into_owned(),
    };
    let attributes = [
        ("time_coverage_start", coverage_stamp(start)),
        ("time_coverage_end", coverage_stamp(end)),
        ("ioos_station_urn", dir.urn.station_urn()),
        ("ioos_sensor_urn", dir.urn.to_string()),
    ];
    let document = ncml_document(&location, &attributes, target_file.is_none())?;

    let name = filename
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.{DESCRIPTOR_EXTENSION}", dir.urn));
    let path = dir.path.join(name);
    fs.write(&path, &document)?;
    Ok(path)
}

/// Earliest first time and latest last time over `sources`; unreadable files
/// are logged and left out.
fn time_extent(sources: &[PathBuf], store: &dyn NcStore) -> Result<(i64, i64)> {
    let mut extent: Option<(i64, i64)> = None;
    let mut last_error = None;
    for path in sources {
        match store.read_header(path) {
            Ok(h) => {
                extent = Some(match extent {
                    Some((s, e)) => (s.min(h.first_time), e.max(h.last_time)),
                    None => (h.first_time, h.last_time),
                });
            }
            Err(e) => {
                warn!("Could not read time extent of {}: {e}", path.display());
                last_error = Some(e);
            }
        }
    }
    match (extent, last_error) {
        (Some(extent), _) => Ok(extent),
        (None, Some(e)) => Err(e),
        (None, None) => Err(Error::InsufficientData { unique_times: 0 }),
    }
}

/// Render the descriptor XML.
pub fn ncml_document(location: &str, attributes: &[(&str, String)], aggregate: bool) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("netcdf");
    root.push_attribute(("xmlns", NCML_NAMESPACE));
    root.push_attribute(("location", location));
    writer.write_event(Event::Start(root))?;

    for (name, value) in attributes {
        let mut attr = BytesStart::new("attribute");
        attr.push_attribute(("name", *name));
        attr.push_attribute(("value", value.as_str()));
        writer.write_event(Event::Empty(attr))?;
    }

    if aggregate {
        let mut aggregation = BytesStart::new("aggregation");
        aggregation.push_attribute(("type", "joinExisting"));
        aggregation.push_attribute(("dimName", "time"));
        writer.write_event(Event::Start(aggregation))?;

        let mut scan = BytesStart::new("scan");
        scan.push_attribute(("location", location));
        scan.push_attribute(("regExp", r".*\.nc[^m]*$"));
        scan.push_attribute(("subdirs", "false"));
        writer.write_event(Event::Empty(scan))?;

        writer.write_event(Event::End(BytesEnd::new("aggregation")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("netcdf")))?;
    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

/// Write the list of descriptor paths as JSON.
pub fn write_manifest(path: &Path, descriptors: &[PathBuf], fs: &dyn FileOps) -> Result<()> {
    let json = serde_json::to_string_pretty(descriptors)?;
    fs.write(path, json.as_bytes())
}
