//! Grid placement strategies, tried in order until one succeeds.
//!
//! Every strategy sees the same deduplicated, sorted rows and returns
//! `Ok(None)` when the data does not fit its assumption. A successful fast path
//! yields exactly what [`scatter`] would have produced for the same rows.

use super::{Grid, Observation, Placement};
use crate::error::{Error, Result};

pub(super) struct Layout<'a> {
    pub rows: &'a [Observation],
    pub times: &'a [i64],
    pub verticals: &'a [f64],
    pub fill_value: f64,
}

impl Layout<'_> {
    fn cell(&self, row: &Observation) -> f64 {
        row.value.unwrap_or(self.fill_value)
    }
}

type Strategy = fn(&Layout<'_>) -> Result<Option<Vec<f64>>>;

const SERIES: &[(Placement, Strategy)] = &[
    (Placement::Direct, direct_series),
    (Placement::Collapsed, collapse_series),
];

const PROFILE: &[(Placement, Strategy)] = &[
    (Placement::Dense, dense_all_rows),
    (Placement::DenseRealVerticals, dense_real_verticals),
    (Placement::Scatter, scatter),
];

pub(super) fn place_series(layout: &Layout<'_>) -> Result<(Grid, Placement)> {
    let (data, placement) = run(SERIES, layout)?;
    Ok((Grid::Rank1(data), placement))
}

pub(super) fn place_profile(layout: &Layout<'_>) -> Result<(Grid, Placement)> {
    let (data, placement) = run(PROFILE, layout)?;
    Ok((
        Grid::Rank2 {
            rows: layout.times.len(),
            cols: layout.verticals.len(),
            data,
        },
        placement,
    ))
}

fn run(strategies: &[(Placement, Strategy)], layout: &Layout<'_>) -> Result<(Vec<f64>, Placement)> {
    for (placement, strategy) in strategies {
        if let Some(data) = strategy(layout)? {
            return Ok((data, *placement));
        }
    }
    let first = layout.rows.first();
    Err(Error::IrregularGrid {
        time: first.map(|r| r.time).unwrap_or_default(),
        vertical: first.and_then(|r| r.vertical),
    })
}

/// Exactly one row per distinct time.
fn direct_series(layout: &Layout<'_>) -> Result<Option<Vec<f64>>> {
    if layout.rows.len() != layout.times.len() {
        return Ok(None);
    }
    Ok(Some(layout.rows.iter().map(|r| layout.cell(r)).collect()))
}

/// Fold rows sharing a time, which happens when the single real vertical and a
/// missing-vertical placeholder were both recorded for one instant.
fn collapse_series(layout: &Layout<'_>) -> Result<Option<Vec<f64>>> {
    let mut data = Vec::with_capacity(layout.times.len());
    let mut rows = layout.rows.iter().peekable();

    for &time in layout.times {
        let mut value: Option<f64> = None;
        while let Some(row) = rows.next_if(|r| r.time == time) {
            match (value, row.value) {
                (Some(first), Some(second)) if first != second => {
                    return Err(Error::ConflictingValues { time, first, second });
                }
                (None, Some(v)) => value = Some(v),
                _ => {}
            }
        }
        data.push(value.unwrap_or(layout.fill_value));
    }
    Ok(Some(data))
}

/// Rows are already a complete time-major cross product of both axes.
fn dense(layout: &Layout<'_>, rows: &[&Observation]) -> Option<Vec<f64>> {
    let cols = layout.verticals.len();
    if rows.len() != layout.times.len() * cols {
        return None;
    }
    let regular = rows.iter().enumerate().all(|(i, r)| {
        r.time == layout.times[i / cols] && r.vertical == Some(layout.verticals[i % cols])
    });
    regular.then(|| rows.iter().map(|r| layout.cell(r)).collect())
}

fn dense_all_rows(layout: &Layout<'_>) -> Result<Option<Vec<f64>>> {
    let rows: Vec<&Observation> = layout.rows.iter().collect();
    Ok(dense(layout, &rows))
}

fn dense_real_verticals(layout: &Layout<'_>) -> Result<Option<Vec<f64>>> {
    let rows: Vec<&Observation> = layout.rows.iter().filter(|r| r.vertical.is_some()).collect();
    Ok(dense(layout, &rows))
}

/// Fill-valued array with every row written at its binary-searched cell.
fn scatter(layout: &Layout<'_>) -> Result<Option<Vec<f64>>> {
    let cols = layout.verticals.len();
    let mut data = vec![layout.fill_value; layout.times.len() * cols];

    for row in layout.rows {
        let Some(vertical) = row.vertical else { continue };
        let located = layout.times.binary_search(&row.time).ok().zip(
            layout
                .verticals
                .binary_search_by(|z| z.total_cmp(&vertical))
                .ok(),
        );
        let Some((t, z)) = located else {
            return Err(Error::IrregularGrid { time: row.time, vertical: row.vertical });
        };
        data[t * cols + z] = layout.cell(row);
    }
    Ok(Some(data))
}
