//! Merger: combine every data file in a sensor directory into one
//! time-series file written back into that directory.

use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::Deserialize;

use crate::builder::{BuildOutcome, BuildRequest, TimeSeriesBuilder};
use crate::corpus::{sensor_dirs, SensorDir};
use crate::dataset::AttributeMap;
use crate::error::{Error, Result};
use crate::reconcile::{is_fill, Observation, DEFAULT_FILL_VALUE};
use crate::store::{FileOps, NcStore, SensorChunk};

/// Default name of the merge output inside each sensor directory.
pub const MERGED_FILE: &str = "merged.nc";

/// What to do when component files report different station positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinatePolicy {
    /// Log a warning and keep the first file's position
    #[default]
    WarnUseFirst,
    /// Use the mean of all positions
    Average,
    /// Skip the sensor
    Reject,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub output_filename: String,
    pub fill_value: f64,
    pub coordinate_policy: CoordinatePolicy,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            output_filename: MERGED_FILE.to_string(),
            fill_value: DEFAULT_FILL_VALUE,
            coordinate_policy: CoordinatePolicy::default(),
        }
    }
}

/// Per-sensor results of a merge pass.
#[derive(Debug, Default)]
pub struct MergeSummary {
    pub written: Vec<PathBuf>,
    /// Sensor identity and the reason it produced no file
    pub skipped: Vec<(String, Error)>,
}

/// Merge each sensor directory under `corpus_root`. Per-sensor failures are
/// logged and collected in the summary; only structural errors abort the pass.
pub fn merge(
    corpus_root: &Path,
    options: &MergeOptions,
    store: &dyn NcStore,
    fs: &dyn FileOps,
) -> Result<MergeSummary> {
    let builder = TimeSeriesBuilder::new(store, fs);
    let mut summary = MergeSummary::default();

    for dir in sensor_dirs(corpus_root, &[options.output_filename.as_str()]) {
        info!("Merging {} file(s) in {}", dir.files.len(), dir.path.display());
        let sensor = dir.urn.to_string();
        match merge_sensor(&dir, options, store, &builder) {
            Ok(BuildOutcome::Written(path)) => summary.written.push(path),
            Ok(BuildOutcome::Skipped(e)) => summary.skipped.push((sensor, e)),
            Err(e) if e.is_recoverable() => {
                error!("Error with sensor {sensor}: {e}");
                summary.skipped.push((sensor, e));
            }
            Err(e) => return Err(e),
        }
    }

    info!("Merged {} sensor(s), skipped {}", summary.written.len(), summary.skipped.len());
    Ok(summary)
}

fn merge_sensor(
    dir: &SensorDir,
    options: &MergeOptions,
    store: &dyn NcStore,
    builder: &TimeSeriesBuilder<'_>,
) -> Result<BuildOutcome> {
    let variable = dir.urn.variable();
    let mut merged = Accumulator::default();
    for path in &dir.files {
        let chunk = store.read_sensor(path, variable)?;
        merged.push(variable, path, chunk, options.fill_value)?;
    }

    let sensor = dir.urn.as_str();
    let latitude = resolve(sensor, "latitude", &merged.latitudes, options.coordinate_policy)?;
    let longitude = resolve(sensor, "longitude", &merged.longitudes, options.coordinate_policy)?;
    let station = dir.urn.station_urn();

    let request = BuildRequest {
        output_dir: &dir.path,
        latitude,
        longitude,
        station_urn: &station,
        sensor_urn: sensor,
        global_attributes: &merged.global_attributes,
        variable_attributes: &merged.variable_attributes,
        filename: Some(&options.output_filename),
    };
    builder.build_observations(&request, merged.observations, options.fill_value)
}

#[derive(Default)]
struct Accumulator {
    rank: Option<usize>,
    observations: Vec<Observation>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    global_attributes: AttributeMap,
    variable_attributes: AttributeMap,
}

impl Accumulator {
    fn push(&mut self, variable: &str, path: &Path, chunk: SensorChunk, fill_value: f64) -> Result<()> {
        let expected = *self.rank.get_or_insert(chunk.rank);
        if expected != chunk.rank {
            return Err(Error::DimensionMismatch {
                variable: variable.to_string(),
                expected,
                found: chunk.rank,
                path: path.to_path_buf(),
            });
        }

        // every time is repeated once per height, heights tiled per time
        let levels = chunk.heights.len().max(1);
        if chunk.values.len() != chunk.times.len() * levels {
            return Err(Error::DimensionMismatch {
                variable: variable.to_string(),
                expected: chunk.times.len() * levels,
                found: chunk.values.len(),
                path: path.to_path_buf(),
            });
        }
        let masked = |x: Option<f64>| x.filter(|&v| !is_fill(v, fill_value));
        for (row, &time) in chunk.times.iter().enumerate() {
            for (col, &height) in chunk.heights.iter().enumerate() {
                let value = chunk.values[row * levels + col];
                self.observations.push(Observation::new(time, masked(height), masked(value)));
            }
        }

        self.latitudes.push(chunk.latitude);
        self.longitudes.push(chunk.longitude);
        self.global_attributes.extend(chunk.global_attributes);
        self.variable_attributes.extend(chunk.variable_attributes);
        Ok(())
    }
}

fn resolve(sensor: &str, axis: &'static str, values: &[f64], policy: CoordinatePolicy) -> Result<f64> {
    let Some(&first) = values.first() else {
        return Ok(DEFAULT_FILL_VALUE);
    };
    if values.iter().all(|&v| v == first) {
        return Ok(first);
    }
    match policy {
        CoordinatePolicy::WarnUseFirst => {
            warn!("{sensor}: component files contained differing {axis}s {values:?}, using the first");
            Ok(first)
        }
        CoordinatePolicy::Average => Ok(values.iter().sum::<f64>() / values.len() as f64),
        CoordinatePolicy::Reject => Err(Error::CoordinateMismatch {
            sensor: sensor.to_string(),
            axis,
            values: values.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AttrValue, VarData};
    use crate::testing::{series_chunk, MemoryFs, MemoryStore};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const SENSOR: &str = "urn:ioos:sensor:wmo:41001:sea_water_temperature";

    /// A corpus with placeholder files whose content lives in the store.
    struct Corpus {
        dir: TempDir,
        store: MemoryStore,
    }

    impl Corpus {
        fn new() -> Self {
            Self { dir: tempdir().unwrap(), store: MemoryStore::default() }
        }

        fn add(&mut self, sensor: &str, name: &str, chunk: SensorChunk) -> PathBuf {
            let sensor_dir = self.dir.path().join(sensor);
            fs::create_dir_all(&sensor_dir).unwrap();
            let path = sensor_dir.join(name);
            fs::write(&path, b"").unwrap();
            self.store.chunks.insert(path.clone(), chunk);
            path
        }

        fn run(&self, options: &MergeOptions) -> (MergeSummary, MemoryFs) {
            let memfs = MemoryFs::default();
            let summary = merge(self.dir.path(), options, &self.store, &memfs).unwrap();
            (summary, memfs)
        }
    }

    fn data(spec: &crate::dataset::DatasetSpec, name: &str) -> Vec<f64> {
        match &spec.variable(name).unwrap().data {
            VarData::Doubles(v) => v.clone(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_merges_two_series_in_time_order() {
        let mut corpus = Corpus::new();
        corpus.add(SENSOR, "b.nc", series_chunk(&[40, 50], &[4.0, 5.0], 34.7, -72.7));
        corpus.add(SENSOR, "a.nc", series_chunk(&[10, 20, 30], &[1.0, 2.0, 3.0], 34.7, -72.7));
        corpus.add(SENSOR, "notes.ncml", series_chunk(&[99], &[9.0], 0.0, 0.0));

        let (summary, _) = corpus.run(&MergeOptions::default());
        assert!(summary.skipped.is_empty());
        let out = corpus.dir.path().join(SENSOR).join(MERGED_FILE);
        assert_eq!(summary.written, vec![out.clone()]);

        let spec = corpus.store.written(&out).unwrap();
        assert_eq!(data(&spec, "time"), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(data(&spec, "sea_water_temperature"), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(data(&spec, "latitude"), vec![34.7]);
        assert_eq!(
            spec.variable("feature_type_instance").unwrap().data,
            VarData::Text("urn:ioos:station:wmo:41001".into())
        );
    }

    #[test]
    fn test_previous_output_is_not_an_input() {
        let mut corpus = Corpus::new();
        corpus.add(SENSOR, "a.nc", series_chunk(&[0, 10], &[1.0, 2.0], 0.0, 0.0));
        corpus.add(SENSOR, MERGED_FILE, series_chunk(&[500, 600], &[7.0, 8.0], 0.0, 0.0));

        let (summary, _) = corpus.run(&MergeOptions::default());
        let spec = corpus.store.written(&summary.written[0]).unwrap();
        assert_eq!(data(&spec, "time"), vec![0.0, 10.0]);
    }

    #[test]
    fn test_profile_chunks_are_broadcast() {
        let mut chunk = series_chunk(&[0, 60], &[1.0, 2.0, 3.0, 4.0], 0.0, 0.0);
        chunk.rank = 2;
        chunk.heights = vec![Some(1.0), Some(5.0)];
        let mut corpus = Corpus::new();
        corpus.add(SENSOR, "p.nc", chunk);

        let (summary, _) = corpus.run(&MergeOptions::default());
        let spec = corpus.store.written(&summary.written[0]).unwrap();
        assert_eq!(spec.shape_of(&spec.variable("sea_water_temperature").unwrap().dims), vec![2, 2]);
        assert_eq!(data(&spec, "height"), vec![1.0, 5.0]);
        assert_eq!(data(&spec, "sea_water_temperature"), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_rank_mismatch_skips_sensor() {
        let mut profile = series_chunk(&[100, 160], &[1.0, 2.0, 3.0, 4.0], 0.0, 0.0);
        profile.rank = 2;
        profile.heights = vec![Some(1.0), Some(5.0)];
        let mut corpus = Corpus::new();
        corpus.add(SENSOR, "a.nc", series_chunk(&[0, 10], &[1.0, 2.0], 0.0, 0.0));
        corpus.add(SENSOR, "b.nc", profile);

        let (summary, memfs) = corpus.run(&MergeOptions::default());
        assert!(summary.written.is_empty());
        assert!(matches!(
            summary.skipped[0].1,
            Error::DimensionMismatch { expected: 1, found: 2, .. }
        ));
        assert!(memfs.dirs.borrow().is_empty());
    }

    #[test]
    fn test_single_timestamp_sensor_does_not_stop_siblings() {
        let lonely = "urn:ioos:sensor:wmo:41001:salinity";
        let mut corpus = Corpus::new();
        corpus.add(lonely, "a.nc", series_chunk(&[0], &[35.0], 0.0, 0.0));
        corpus.add(SENSOR, "a.nc", series_chunk(&[0, 10], &[1.0, 2.0], 0.0, 0.0));

        let (summary, _) = corpus.run(&MergeOptions::default());
        assert_eq!(summary.written.len(), 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].0, lonely);
        assert!(matches!(summary.skipped[0].1, Error::InsufficientData { unique_times: 1 }));
    }

    #[test]
    fn test_attributes_last_file_wins() {
        let mut first = series_chunk(&[0, 10], &[1.0, 2.0], 0.0, 0.0);
        first.global_attributes.insert("title".into(), "old title".into());
        first.global_attributes.insert("institution".into(), "SECOORA".into());
        first.variable_attributes.insert("units".into(), "K".into());
        let mut second = series_chunk(&[20, 30], &[3.0, 4.0], 0.0, 0.0);
        second.global_attributes.insert("title".into(), "new title".into());
        second.variable_attributes.insert("units".into(), "degree_Celsius".into());

        let mut corpus = Corpus::new();
        corpus.add(SENSOR, "1.nc", first);
        corpus.add(SENSOR, "2.nc", second);

        let (summary, _) = corpus.run(&MergeOptions::default());
        let spec = corpus.store.written(&summary.written[0]).unwrap();
        assert_eq!(spec.attribute("title"), Some(&AttrValue::from("new title")));
        assert_eq!(spec.attribute("institution"), Some(&AttrValue::from("SECOORA")));
        let var = spec.variable("sea_water_temperature").unwrap();
        assert_eq!(var.attributes.get("units"), Some(&AttrValue::from("degree_Celsius")));
    }

    #[test]
    fn test_coordinate_policies() {
        let positions = [34.0, 36.0];
        assert_eq!(resolve(SENSOR, "latitude", &positions, CoordinatePolicy::WarnUseFirst).unwrap(), 34.0);
        assert_eq!(resolve(SENSOR, "latitude", &positions, CoordinatePolicy::Average).unwrap(), 35.0);
        assert!(matches!(
            resolve(SENSOR, "latitude", &positions, CoordinatePolicy::Reject),
            Err(Error::CoordinateMismatch { axis: "latitude", .. })
        ));
        assert_eq!(resolve(SENSOR, "latitude", &[1.0, 1.0], CoordinatePolicy::Reject).unwrap(), 1.0);
    }

    #[test]
    fn test_fill_values_are_masked() {
        let mut corpus = Corpus::new();
        corpus.add(SENSOR, "a.nc", series_chunk(&[0, 10, 20], &[1.0, DEFAULT_FILL_VALUE, 3.0], 0.0, 0.0));

        let (summary, _) = corpus.run(&MergeOptions::default());
        let spec = corpus.store.written(&summary.written[0]).unwrap();
        assert_eq!(data(&spec, "sea_water_temperature"), vec![1.0, DEFAULT_FILL_VALUE, 3.0]);
    }
}
