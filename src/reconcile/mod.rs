//! Time/vertical axis reconciliation.
//!
//! Takes parallel (time, vertical, value) sequences in any order, possibly with
//! duplicated (time, vertical) pairs and sentinel-marked gaps, and produces the
//! sorted distinct time and vertical axes plus a dense grid over them:
//!
//! - zero or one distinct vertical: a time series, `Grid::Rank1`
//! - two or more distinct verticals: a time-series profile, `Grid::Rank2`
//!
//! Placement is attempted by a short ordered list of strategies (see
//! [`strategies`]); the last one, explicit scatter, handles any input.

mod strategies;


use std::cmp::Ordering;
use std::collections::HashSet;

use log::{debug, warn};

use crate::error::{Error, Result};

/// Default sentinel for absent verticals and values.
pub const DEFAULT_FILL_VALUE: f64 = -9999.9;

/// One input row after masking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub time: i64,
    pub vertical: Option<f64>,
    pub value: Option<f64>,
}

impl Observation {
    pub fn new(time: i64, vertical: Option<f64>, value: Option<f64>) -> Self {
        Self { time, vertical, value }
    }

    fn key(&self) -> (i64, Option<u64>) {
        (self.time, self.vertical.map(f64::to_bits))
    }
}

/// Dense output array, row-major with time as the outer axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Grid {
    Rank1(Vec<f64>),
    Rank2 { rows: usize, cols: usize, data: Vec<f64> },
}

impl Grid {
    pub fn rank(&self) -> usize {
        match self {
            Grid::Rank1(_) => 1,
            Grid::Rank2 { .. } => 2,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Grid::Rank1(data) => vec![data.len()],
            Grid::Rank2 { rows, cols, .. } => vec![*rows, *cols],
        }
    }

    /// Flattened cell values in row-major order.
    pub fn values(&self) -> &[f64] {
        match self {
            Grid::Rank1(data) => data,
            Grid::Rank2 { data, .. } => data,
        }
    }

    /// Cell at time index `t` and vertical index `z`; `z` is ignored for rank 1.
    pub fn get(&self, t: usize, z: usize) -> Option<f64> {
        match self {
            Grid::Rank1(data) => data.get(t).copied(),
            Grid::Rank2 { rows, cols, data } => {
                (t < *rows && z < *cols).then(|| data[t * cols + z])
            }
        }
    }
}

/// Which strategy placed the values on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// One row per time, already in order
    Direct,
    /// Rows sharing a time (real vs. missing vertical) folded together
    Collapsed,
    /// Rows form a complete time × vertical cross product
    Dense,
    /// Cross product once rows without a vertical are discarded
    DenseRealVerticals,
    /// Explicit per-row index lookup into a fill-valued array
    Scatter,
}

/// Reconciled axes and grid for one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub times: Vec<i64>,
    pub verticals: Vec<f64>,
    pub grid: Grid,
    pub fill_value: f64,
    pub placement: Placement,
}

impl Reconciled {
    pub fn is_profile(&self) -> bool {
        self.grid.rank() == 2
    }

    pub fn start(&self) -> i64 {
        self.times.first().copied().unwrap_or_default()
    }

    pub fn end(&self) -> i64 {
        self.times.last().copied().unwrap_or_default()
    }
}

/// `true` when `x` is the fill sentinel (allowing for a round trip through f32) or NaN.
pub fn is_fill(x: f64, fill_value: f64) -> bool {
    x.is_nan() || x == fill_value || (x - fill_value).abs() <= fill_value.abs() * f32::EPSILON as f64
}

fn mask(x: f64, fill_value: f64) -> Option<f64> {
    (!is_fill(x, fill_value)).then_some(x)
}

/// Reconcile parallel sequences where gaps are marked with `fill_value`.
pub fn reconcile(times: &[i64], verticals: &[f64], values: &[f64], fill_value: f64) -> Result<Reconciled> {
    if times.len() != verticals.len() || times.len() != values.len() {
        return Err(Error::LengthMismatch {
            times: times.len(),
            verticals: verticals.len(),
            values: values.len(),
        });
    }

    let observations = times
        .iter()
        .zip(verticals)
        .zip(values)
        .map(|((&t, &z), &v)| Observation::new(t, mask(z, fill_value), mask(v, fill_value)))
        .collect();

    reconcile_observations(observations, fill_value)
}

/// Reconcile already-masked observations.
pub fn reconcile_observations(observations: Vec<Observation>, fill_value: f64) -> Result<Reconciled> {
    let total = observations.len();
    let rows = dedup_sorted(observations);
    debug!("{} of {} rows unique on (time, vertical)", rows.len(), total);

    let times = unique_times(&rows);
    if times.len() < 2 {
        return Err(Error::InsufficientData { unique_times: times.len() });
    }
    let verticals = unique_verticals(&rows);

    let layout = strategies::Layout {
        rows: &rows,
        times: &times,
        verticals: &verticals,
        fill_value,
    };

    let (grid, placement) = if verticals.len() <= 1 {
        strategies::place_series(&layout)?
    } else {
        let (grid, placement) = strategies::place_profile(&layout)?;
        let dropped = rows.iter().filter(|r| r.vertical.is_none()).count();
        if dropped > 0 {
            warn!("{dropped} row(s) without a vertical cannot be placed on a {}-level profile", verticals.len());
        }
        (grid, placement)
    };
    debug!("placed {:?} grid via {:?}", grid.shape(), placement);

    Ok(Reconciled { times, verticals, grid, fill_value, placement })
}

/// Drop repeated (time, vertical) pairs, keeping the first occurrence in input
/// order, then sort by time and vertical. Missing verticals sort last and
/// `-0.0` is folded into `0.0`.
fn dedup_sorted(observations: Vec<Observation>) -> Vec<Observation> {
    let mut seen = HashSet::with_capacity(observations.len());
    let mut rows: Vec<Observation> = observations
        .into_iter()
        .map(|o| Observation { vertical: o.vertical.map(|v| v + 0.0), ..o })
        .filter(|o| seen.insert(o.key()))
        .collect();
    rows.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| cmp_vertical(a.vertical, b.vertical)));
    rows
}

fn cmp_vertical(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn unique_times(rows: &[Observation]) -> Vec<i64> {
    let mut times: Vec<i64> = rows.iter().map(|r| r.time).collect();
    times.dedup();
    times
}

fn unique_verticals(rows: &[Observation]) -> Vec<f64> {
    let mut verticals: Vec<f64> = rows.iter().filter_map(|r| r.vertical).collect();
    verticals.sort_by(f64::total_cmp);
    verticals.dedup();
    verticals
}
