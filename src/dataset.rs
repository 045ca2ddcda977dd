//! In-memory description of an output file: dimensions, variables, attributes.
//!
//! The builder assembles a [`DatasetSpec`]; a store implementation turns it into
//! bytes on disk. Keeping the description separate lets the file layout be
//! checked without touching the filesystem.

use std::collections::BTreeMap;

use serde::Serialize;

/// Attribute value as carried between input and output files.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Int(i64),
    Double(f64),
    Texts(Vec<String>),
    Ints(Vec<i64>),
    Doubles(Vec<f64>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Double(d) => Some(*d),
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Doubles(v) if v.len() == 1 => Some(v[0]),
            AttrValue::Ints(v) if v.len() == 1 => Some(v[0] as f64),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(d: f64) -> Self {
        AttrValue::Double(d)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

/// Ordered attribute set; later inserts overwrite earlier ones.
pub type AttributeMap = BTreeMap<String, AttrValue>;

/// Geometry of the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureType {
    TimeSeries,
    TimeSeriesProfile,
}

impl FeatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::TimeSeries => "timeSeries",
            FeatureType::TimeSeriesProfile => "timeSeriesProfile",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionSpec {
    pub name: String,
    pub len: usize,
    pub unlimited: bool,
}

impl DimensionSpec {
    pub fn fixed(name: &str, len: usize) -> Self {
        Self { name: name.to_string(), len, unlimited: false }
    }

    pub fn unlimited(name: &str, len: usize) -> Self {
        Self { name: name.to_string(), len, unlimited: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarData {
    /// f64 values, row-major over the variable's dimensions
    Doubles(Vec<f64>),
    /// Scalar string variable
    Text(String),
    /// i32 container variable carrying only attributes
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub name: String,
    pub dims: Vec<String>,
    pub data: VarData,
    pub attributes: AttributeMap,
    pub fill_value: Option<f64>,
}

impl VariableSpec {
    pub fn new(name: &str, dims: &[&str], data: VarData) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            data,
            attributes: AttributeMap::new(),
            fill_value: None,
        }
    }

    pub fn attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn fill(mut self, fill_value: f64) -> Self {
        self.fill_value = Some(fill_value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSpec {
    pub dimensions: Vec<DimensionSpec>,
    pub variables: Vec<VariableSpec>,
    pub attributes: AttributeMap,
}

impl DatasetSpec {
    pub fn dimension(&self, name: &str) -> Option<&DimensionSpec> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Current lengths of the named dimensions, in order.
    pub fn shape_of(&self, dims: &[String]) -> Vec<usize> {
        dims.iter()
            .map(|d| self.dimension(d).map(|spec| spec.len).unwrap_or_default())
            .collect()
    }
}
