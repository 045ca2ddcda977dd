//! Time-series file builder.
//!
//! Lays out a reconciled grid as a CF-1.6 discrete sampling geometry file:
//! `timeSeries` for a rank 1 grid, `timeSeriesProfile` with a `z` dimension for
//! rank 2. Coverage, duration and resolution attributes are always computed
//! here and never taken from the caller.

use std::path::{Path, PathBuf};

use log::{debug, error, info};

use crate::dataset::{
    AttrValue, AttributeMap, DatasetSpec, DimensionSpec, FeatureType, VarData, VariableSpec,
};
use crate::error::{Error, Result};
use crate::reconcile::{reconcile_observations, Grid, Observation, Reconciled};
use crate::store::{FileOps, NcStore};
use crate::timefmt::{coverage_stamp, file_stamp, iso_duration, modal_step};

// ─────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────
pub const CONVENTIONS:      &str = "CF-1.6";
pub const OUTPUT_EXTENSION: &str = "nc";

/// Global attributes owned by the builder; caller values are dropped.
pub const COMPUTED_GLOBALS: [&str; 10] = [
    "time_coverage_start",
    "time_coverage_end",
    "time_coverage_duration",
    "time_coverage_resolution",
    "featureType",
    "geospatial_vertical_positive",
    "geospatial_vertical_min",
    "geospatial_vertical_max",
    "geospatial_vertical_resolution",
    "Conventions",
];

const COORDINATES: &str = "time height latitude longitude";

// WGS84
const EPSG_URL:           &str = "http://www.opengis.net/def/crs/EPSG/0/4326";
const SEMI_MAJOR_AXIS:    f64  = 6_378_137.0;
const INVERSE_FLATTENING: f64  = 298.257_223_563;

const SENSOR_DEFINITION: &str = "http://mmisw.org/ont/ioos/definition/sensorID";

// ─────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────
/// Station, sensor and metadata for one output file.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub output_dir: &'a Path,
    pub latitude: f64,
    pub longitude: f64,
    pub station_urn: &'a str,
    pub sensor_urn: &'a str,
    pub global_attributes: &'a AttributeMap,
    pub variable_attributes: &'a AttributeMap,
    /// Overrides the `<start>_TO_<end>.nc` name
    pub filename: Option<&'a str>,
}

impl BuildRequest<'_> {
    /// Data variable name, the last token of the sensor identity.
    pub fn variable_name(&self) -> &str {
        self.sensor_urn.rsplit(':').next().unwrap_or(self.sensor_urn)
    }
}

/// What happened to one sensor.
#[derive(Debug)]
pub enum BuildOutcome {
    Written(PathBuf),
    /// Reconciliation rejected the data; no file was created
    Skipped(Error),
}

// ─────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────
pub struct TimeSeriesBuilder<'a> {
    store: &'a dyn NcStore,
    fs: &'a dyn FileOps,
}

impl<'a> TimeSeriesBuilder<'a> {
    pub fn new(store: &'a dyn NcStore, fs: &'a dyn FileOps) -> Self {
        Self { store, fs }
    }

    /// Reconcile `observations` and write the result. Recoverable
    /// reconciliation errors are logged and reported as
    /// [`BuildOutcome::Skipped`]; write failures are returned.
    pub fn build_observations(
        &self,
        request: &BuildRequest<'_>,
        observations: Vec<Observation>,
        fill_value: f64,
    ) -> Result<BuildOutcome> {
        match reconcile_observations(observations, fill_value) {
            Ok(reconciled) => self.build(request, &reconciled).map(BuildOutcome::Written),
            Err(e) if e.is_recoverable() => {
                error!("Skipping {}: {e}", request.sensor_urn);
                Ok(BuildOutcome::Skipped(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Write `reconciled` into `request.output_dir`, replacing any file of the same name.
    pub fn build(&self, request: &BuildRequest<'_>, reconciled: &Reconciled) -> Result<PathBuf> {
        if reconciled.times.len() < 2 {
            return Err(Error::InsufficientData { unique_times: reconciled.times.len() });
        }
        self.fs.create_dir_all(request.output_dir)?;

        let filename = request
            .filename
            .map(str::to_string)
            .unwrap_or_else(|| default_filename(reconciled));
        let path = request.output_dir.join(filename);
        if self.fs.exists(&path) {
            debug!("Removing existing {}", path.display());
            self.fs.remove_file(&path)?;
        }

        let spec = dataset_spec(request, reconciled);
        self.store.write_dataset(&path, &spec)?;
        info!("Finished writing {}", path.display());
        Ok(path)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Dataset layout
// ─────────────────────────────────────────────────────────────────────
/// `<start>_TO_<end>.nc` with minute-truncated UTC endpoints.
pub fn default_filename(reconciled: &Reconciled) -> String {
    format!(
        "{}_TO_{}.{OUTPUT_EXTENSION}",
        file_stamp(reconciled.start()),
        file_stamp(reconciled.end())
    )
}

/// Describe the output file for `reconciled` without writing anything.
pub fn dataset_spec(request: &BuildRequest<'_>, reconciled: &Reconciled) -> DatasetSpec {
    let fill = reconciled.fill_value;
    let variable_name = request.variable_name();
    let mut spec = DatasetSpec::default();

    spec.attributes = request
        .global_attributes
        .iter()
        .filter(|(k, _)| !COMPUTED_GLOBALS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    spec.attributes.extend(time_coverage(&reconciled.times));
    spec.attributes.insert("Conventions".into(), CONVENTIONS.into());

    spec.dimensions.push(DimensionSpec::unlimited("time", reconciled.times.len()));

    spec.variables.push(
        VariableSpec::new("feature_type_instance", &[], VarData::Text(request.station_urn.to_string()))
            .attr("cf_role", "timeseries_id")
            .attr("long_name", "Identifier for each feature type instance"),
    );
    spec.variables.push(
        VariableSpec::new(
            "time",
            &["time"],
            VarData::Doubles(reconciled.times.iter().map(|&t| t as f64).collect()),
        )
        .attr("units", "seconds since 1970-01-01T00:00:00Z")
        .attr("standard_name", "time")
        .attr("long_name", "time of measurement")
        .attr("calendar", "gregorian"),
    );
    spec.variables.push(
        VariableSpec::new("latitude", &[], VarData::Doubles(vec![request.latitude]))
            .attr("units", "degrees_north")
            .attr("standard_name", "latitude")
            .attr("long_name", "sensor latitude"),
    );
    spec.variables.push(
        VariableSpec::new("longitude", &[], VarData::Doubles(vec![request.longitude]))
            .attr("units", "degrees_east")
            .attr("standard_name", "longitude")
            .attr("long_name", "sensor longitude"),
    );
    spec.variables.push(
        VariableSpec::new("crs", &[], VarData::Empty)
            .attr("long_name", EPSG_URL)
            .attr("grid_mapping_name", "latitude_longitude")
            .attr("epsg_code", "EPSG:4326")
            .attr("semi_major_axis", SEMI_MAJOR_AXIS)
            .attr("inverse_flattening", INVERSE_FLATTENING),
    );

    let described = |key: &str| {
        request
            .global_attributes
            .get(key)
            .cloned()
            .unwrap_or_else(|| request.station_urn.into())
    };
    spec.variables.push(
        VariableSpec::new("platform", &[], VarData::Empty)
            .attr("ioos_code", request.station_urn)
            .attr("short_name", described("title"))
            .attr("long_name", described("description")),
    );
    spec.variables.push(
        VariableSpec::new("instrument", &[], VarData::Empty)
            .attr("definition", SENSOR_DEFINITION)
            .attr("long_name", request.sensor_urn),
    );

    let (feature_type, data_dims): (FeatureType, &[&str]) = match &reconciled.grid {
        Grid::Rank1(_) => {
            let height = reconciled.verticals.first().copied().unwrap_or(fill);
            spec.variables.push(height_variable(&[], vec![height], fill));
            (FeatureType::TimeSeries, &["time"])
        }
        Grid::Rank2 { cols, .. } => {
            spec.attributes.extend(vertical_extent(&reconciled.verticals));
            spec.dimensions.push(DimensionSpec::fixed("z", *cols));
            spec.variables.push(height_variable(&["z"], reconciled.verticals.clone(), fill));
            (FeatureType::TimeSeriesProfile, &["time", "z"])
        }
    };
    spec.attributes.insert("featureType".into(), feature_type.as_str().into());

    let mut data = VariableSpec::new(variable_name, data_dims, VarData::Doubles(reconciled.grid.values().to_vec()))
        .fill(fill);
    data.attributes = request
        .variable_attributes
        .iter()
        .filter(|(k, _)| k.as_str() != "_FillValue")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    spec.variables.push(
        data.attr("coordinates", COORDINATES)
            .attr("standard_name", variable_name),
    );

    spec
}

// ─────────────────────────────────────────────────────────────────────
// Attribute helpers
// ─────────────────────────────────────────────────────────────────────
fn height_variable(dims: &[&str], heights: Vec<f64>, fill: f64) -> VariableSpec {
    VariableSpec::new("height", dims, VarData::Doubles(heights))
        .fill(fill)
        .attr("long_name", "height of the sensor relative to sea surface")
        .attr("standard_name", "height")
        .attr("positive", "down")
        .attr("units", "m")
        .attr("axis", "Z")
}

fn time_coverage(times: &[i64]) -> AttributeMap {
    let mut attrs = AttributeMap::new();
    let (Some(&start), Some(&end)) = (times.first(), times.last()) else {
        return attrs;
    };
    attrs.insert("time_coverage_start".into(), coverage_stamp(start).into());
    attrs.insert("time_coverage_end".into(), coverage_stamp(end).into());
    attrs.insert("time_coverage_duration".into(), iso_duration(end - start).into());
    if let Some(step) = modal_step(times) {
        attrs.insert("time_coverage_resolution".into(), iso_duration(step).into());
    }
    attrs
}

fn vertical_extent(verticals: &[f64]) -> AttributeMap {
    let mut attrs = AttributeMap::new();
    let (Some(&min), Some(&max)) = (verticals.first(), verticals.last()) else {
        return attrs;
    };
    let steps: Vec<String> = verticals.windows(2).map(|w| format!("{:?}", w[1] - w[0])).collect();
    attrs.insert("geospatial_vertical_positive".into(), "down".into());
    attrs.insert("geospatial_vertical_min".into(), AttrValue::Double(min));
    attrs.insert("geospatial_vertical_max".into(), AttrValue::Double(max));
    attrs.insert("geospatial_vertical_resolution".into(), steps.join(" ").into());
    attrs
}
