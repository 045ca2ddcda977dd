//! Epoch-second formatting for file names, coverage attributes and reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// UTC instant for whole epoch seconds; out-of-range input clamps to the
/// earliest representable time.
pub fn utc(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Minute-truncated stamp used in output file names, `2014-01-01T00:00Z`.
pub fn file_stamp(secs: i64) -> String {
    utc(secs).format("%Y-%m-%dT%H:%MZ").to_string()
}

/// `time_coverage_*` and NcML attribute value, `2014-01-01T00:00:00Z`.
pub fn coverage_stamp(secs: i64) -> String {
    utc(secs).format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Crawl report value, `2014-01-01 00:00:00`.
pub fn report_stamp(secs: i64) -> String {
    utc(secs).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// ISO-8601 duration in whole seconds, `P3600S`.
pub fn iso_duration(secs: i64) -> String {
    format!("P{secs}S")
}

/// Most frequent difference between consecutive times. Ties go to the
/// smallest difference. `None` for fewer than two times.
pub fn modal_step(times: &[i64]) -> Option<i64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for pair in times.windows(2) {
        *counts.entry(pair[1] - pair[0]).or_default() += 1;
    }
    let mut best: Option<(i64, usize)> = None;
    for (&step, &count) in &counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((step, count));
        }
    }
    best.map(|(step, _)| step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamps() {
        // 2014-03-01T12:34:56Z
        let t = 1_393_677_296;
        assert_eq!(file_stamp(t), "2014-03-01T12:34Z");
        assert_eq!(coverage_stamp(t), "2014-03-01T12:34:56Z");
        assert_eq!(report_stamp(t), "2014-03-01 12:34:56");
    }

    #[test]
    fn test_modal_step_is_mode_not_mean() {
        assert_eq!(modal_step(&[0, 10, 20, 35]), Some(10));
        assert_eq!(iso_duration(modal_step(&[0, 10, 20, 35]).unwrap()), "P10S");
    }

    #[test]
    fn test_modal_step_tie_takes_smallest() {
        assert_eq!(modal_step(&[0, 30, 40, 70, 80]), Some(10));
        assert_eq!(modal_step(&[5]), None);
    }
}
