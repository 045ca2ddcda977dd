//! NetCDF and filesystem capabilities.
//!
//! Crawling, merging and descriptor writing reach files only through
//! [`NcStore`] and [`FileOps`], so they can run against in-memory fixtures.
//! [`NetcdfStore`] and [`LocalFs`] are the real implementations. Every NetCDF
//! handle is opened and dropped within a single call.

use std::fs;
use std::path::Path;

use log::debug;

use crate::dataset::{AttrValue, AttributeMap, DatasetSpec, VarData};
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────
/// The scalar fields the crawler needs from one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    /// `long_name` of the `instrument` variable
    pub instrument_urn: String,
    pub latitude: f64,
    pub longitude: f64,
    pub first_time: i64,
    pub last_time: i64,
}

/// Everything the merger reads from one file for one sensor variable.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorChunk {
    /// Number of dimensions of the data variable
    pub rank: usize,
    pub times: Vec<i64>,
    /// Height axis, or a single missing entry when the file has none
    pub heights: Vec<Option<f64>>,
    /// Data variable flattened row-major, masked by the file's own fill value
    pub values: Vec<Option<f64>>,
    pub latitude: f64,
    pub longitude: f64,
    pub global_attributes: AttributeMap,
    pub variable_attributes: AttributeMap,
}

pub trait NcStore {
    fn read_header(&self, path: &Path) -> Result<FileHeader>;
    fn read_sensor(&self, path: &Path, variable: &str) -> Result<SensorChunk>;
    fn write_dataset(&self, path: &Path, dataset: &DatasetSpec) -> Result<()>;
}

pub trait FileOps {
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    /// Both paths name one existing file
    fn same_file(&self, a: &Path, b: &Path) -> bool;
}

// ─────────────────────────────────────────────────────────────────────
// Local disk
// ─────────────────────────────────────────────────────────────────────
/// Local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileOps for LocalFs {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path)?)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        fs::copy(from, to)?;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        Ok(fs::remove_file(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        Ok(fs::write(path, contents)?)
    }

    fn same_file(&self, a: &Path, b: &Path) -> bool {
        match (fs::canonicalize(a), fs::canonicalize(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// NetCDF
// ─────────────────────────────────────────────────────────────────────
/// Reads and writes files through libnetcdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfStore;

impl NcStore for NetcdfStore {
    fn read_header(&self, path: &Path) -> Result<FileHeader> {
        let file = netcdf::open(path)?;

        let instrument_urn = file
            .variable("instrument")
            .and_then(|v| v.attribute_value("long_name"))
            .transpose()?
            .and_then(|v| convert(v).as_ref().and_then(AttrValue::as_str).map(str::to_string))
            .ok_or_else(|| missing("instrument:long_name", path))?;

        let times = read_times(&file, path)?;
        let (Some(&first_time), Some(&last_time)) = (times.first(), times.last()) else {
            return Err(missing("time", path));
        };

        Ok(FileHeader {
            instrument_urn,
            latitude: read_scalar(&file, "latitude", path)?,
            longitude: read_scalar(&file, "longitude", path)?,
            first_time,
            last_time,
        })
    }

    fn read_sensor(&self, path: &Path, variable: &str) -> Result<SensorChunk> {
        let file = netcdf::open(path)?;
        let var = file.variable(variable).ok_or_else(|| missing(variable, path))?;

        let variable_attributes = attribute_map(var.attributes())?;
        let file_fill = fill_of(&variable_attributes);
        let values = var
            .get_values::<f64, _>(..)?
            .into_iter()
            .map(|x| unmask(x, file_fill))
            .collect();

        let heights = match file.variable("height") {
            Some(h) => {
                let fill = fill_of(&attribute_map(h.attributes())?);
                h.get_values::<f64, _>(..)?.into_iter().map(|x| unmask(x, fill)).collect()
            }
            None => vec![None],
        };

        Ok(SensorChunk {
            rank: var.dimensions().len(),
            times: read_times(&file, path)?,
            heights,
            values,
            latitude: read_scalar(&file, "latitude", path)?,
            longitude: read_scalar(&file, "longitude", path)?,
            global_attributes: attribute_map(file.attributes())?,
            variable_attributes,
        })
    }

    fn write_dataset(&self, path: &Path, dataset: &DatasetSpec) -> Result<()> {
        let mut nc = netcdf::create(path)?;
        debug!("Opened file for writing: {}", path.display());

        for (key, value) in &dataset.attributes {
            nc.add_attribute(key, to_netcdf(value))?;
        }

        for dim in &dataset.dimensions {
            if dim.unlimited {
                nc.add_unlimited_dimension(&dim.name)?;
            } else {
                nc.add_dimension(&dim.name, dim.len)?;
            }
        }

        for spec in &dataset.variables {
            let dims: Vec<&str> = spec.dims.iter().map(String::as_str).collect();
            let shape = dataset.shape_of(&spec.dims);
            let start = vec![0; shape.len()];

            match &spec.data {
                VarData::Doubles(values) => {
                    let mut var = nc.add_variable::<f64>(&spec.name, &dims)?;
                    if let Some(fill) = spec.fill_value {
                        var.set_fill_value(fill)?;
                    }
                    for (key, value) in &spec.attributes {
                        var.put_attribute(key, to_netcdf(value))?;
                    }
                    if dims.is_empty() {
                        var.put_values(values, ..)?;
                    } else {
                        var.put_values(values, (start.as_slice(), shape.as_slice()))?;
                    }
                }
                VarData::Text(text) => {
                    let mut var = nc.add_string_variable(&spec.name, &dims)?;
                    for (key, value) in &spec.attributes {
                        var.put_attribute(key, to_netcdf(value))?;
                    }
                    var.put_string(text, ..)?;
                }
                VarData::Empty => {
                    let mut var = nc.add_variable::<i32>(&spec.name, &dims)?;
                    for (key, value) in &spec.attributes {
                        var.put_attribute(key, to_netcdf(value))?;
                    }
                }
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Read helpers
// ─────────────────────────────────────────────────────────────────────
fn missing(name: &str, path: &Path) -> Error {
    Error::MissingVariable { name: name.to_string(), path: path.to_path_buf() }
}

fn read_times(file: &netcdf::File, path: &Path) -> Result<Vec<i64>> {
    let var = file.variable("time").ok_or_else(|| missing("time", path))?;
    // whole seconds, truncated toward zero
    Ok(var.get_values::<f64, _>(..)?.into_iter().map(|t| t as i64).collect())
}

fn read_scalar(file: &netcdf::File, name: &str, path: &Path) -> Result<f64> {
    let var = file.variable(name).ok_or_else(|| missing(name, path))?;
    var.get_values::<f64, _>(..)?
        .first()
        .copied()
        .ok_or_else(|| missing(name, path))
}

fn attribute_map<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> Result<AttributeMap> {
    let mut map = AttributeMap::new();
    for attr in attrs {
        if let Some(value) = convert(attr.value()?) {
            map.insert(attr.name().to_string(), value);
        }
    }
    Ok(map)
}

fn fill_of(attrs: &AttributeMap) -> Option<f64> {
    attrs
        .get("_FillValue")
        .or_else(|| attrs.get("missing_value"))
        .and_then(AttrValue::as_f64)
}

fn unmask(x: f64, fill: Option<f64>) -> Option<f64> {
    if x.is_nan() || Some(x) == fill {
        None
    } else {
        Some(x)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Attribute conversion
// ─────────────────────────────────────────────────────────────────────
fn convert(value: netcdf::AttributeValue) -> Option<AttrValue> {
    use netcdf::AttributeValue as V;
    let widen = |v: Vec<i64>| Some(AttrValue::Ints(v));
    match value {
        V::Str(s) => Some(AttrValue::Text(s)),
        V::Strs(s) => Some(AttrValue::Texts(s)),
        V::Double(d) => Some(AttrValue::Double(d)),
        V::Float(f) => Some(AttrValue::Double(f64::from(f))),
        V::Doubles(d) => Some(AttrValue::Doubles(d)),
        V::Floats(f) => Some(AttrValue::Doubles(f.into_iter().map(f64::from).collect())),
        V::Schar(i) => Some(AttrValue::Int(i64::from(i))),
        V::Uchar(i) => Some(AttrValue::Int(i64::from(i))),
        V::Short(i) => Some(AttrValue::Int(i64::from(i))),
        V::Ushort(i) => Some(AttrValue::Int(i64::from(i))),
        V::Int(i) => Some(AttrValue::Int(i64::from(i))),
        V::Uint(i) => Some(AttrValue::Int(i64::from(i))),
        V::Longlong(i) => Some(AttrValue::Int(i)),
        V::Ulonglong(i) => i64::try_from(i).ok().map(AttrValue::Int),
        V::Schars(v) => widen(v.into_iter().map(i64::from).collect()),
        V::Uchars(v) => widen(v.into_iter().map(i64::from).collect()),
        V::Shorts(v) => widen(v.into_iter().map(i64::from).collect()),
        V::Ushorts(v) => widen(v.into_iter().map(i64::from).collect()),
        V::Ints(v) => widen(v.into_iter().map(i64::from).collect()),
        V::Uints(v) => widen(v.into_iter().map(i64::from).collect()),
        V::Longlongs(v) => widen(v),
        V::Ulonglongs(v) => v.into_iter().map(|i| i64::try_from(i).ok()).collect::<Option<Vec<_>>>().and_then(widen),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Integers that fit are written as 32-bit so classic readers can use them.
fn to_netcdf(value: &AttrValue) -> netcdf::AttributeValue {
    use netcdf::AttributeValue as V;
    match value {
        AttrValue::Text(s) => V::Str(s.clone()),
        AttrValue::Texts(s) => V::Strs(s.clone()),
        AttrValue::Double(d) => V::Double(*d),
        AttrValue::Doubles(d) => V::Doubles(d.clone()),
        AttrValue::Int(i) => match i32::try_from(*i) {
            Ok(small) => V::Int(small),
            Err(_) => V::Longlong(*i),
        },
        AttrValue::Ints(v) => match v.iter().map(|&i| i32::try_from(i)).collect::<std::result::Result<Vec<_>, _>>() {
            Ok(small) => V::Ints(small),
            Err(_) => V::Longlongs(v.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmask_uses_file_fill() {
        let fill = Some(-9999.9f32 as f64);
        assert_eq!(unmask(-9999.9f32 as f64, fill), None);
        assert_eq!(unmask(f64::NAN, None), None);
        assert_eq!(unmask(3.5, fill), Some(3.5));
    }

    #[test]
    fn test_fill_of_prefers_fill_value() {
        let mut attrs = AttributeMap::new();
        attrs.insert("missing_value".into(), AttrValue::Double(-1.0));
        assert_eq!(fill_of(&attrs), Some(-1.0));
        attrs.insert("_FillValue".into(), AttrValue::Doubles(vec![-2.0]));
        assert_eq!(fill_of(&attrs), Some(-2.0));
    }

    #[test]
    fn test_attribute_conversion() {
        assert_eq!(convert(netcdf::AttributeValue::Float(1.5)), Some(AttrValue::Double(1.5)));
        assert_eq!(convert(netcdf::AttributeValue::Short(-3)), Some(AttrValue::Int(-3)));
        assert!(matches!(to_netcdf(&AttrValue::Int(7)), netcdf::AttributeValue::Int(7)));
        assert!(matches!(
            to_netcdf(&AttrValue::Int(i64::MAX)),
            netcdf::AttributeValue::Longlong(i64::MAX)
        ));
    }
}
