//! Time series preparation.
//!
//! Orders the rows of a dataset by its time column before grouping. Sorting is
//! stable, so rows of different series that share a timestamp keep their
//! relative order and every group ends up in time order.

use super::dataset::{Dataset, cell_to_string, is_iso_date};
use crate::error::{Error, Result};

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Returns `dataset` sorted by `time_column`.
///
/// Null timestamps are rejected. Duplicate timestamps within one series
/// (rows sharing every identifier value) are logged but kept, and so are
/// string timestamps that are not ISO-8601.
pub fn prepare(dataset: &Dataset, time_column: &str, identifiers: &[String]) -> Result<Dataset> {
    let times = dataset
        .column(time_column)
        .ok_or_else(|| Error::Dataset(format!("Time column '{time_column}' not found")))?;

    if let Some(row) = times.iter().position(Value::is_null) {
        return Err(Error::Dataset(format!(
            "Time column '{time_column}' has no value in row {row}"
        )));
    }

    if let Some(row) = first_non_iso_time(times) {
        warn!(
            time_column,
            row,
            value = %cell_to_string(&times[row]),
            "Time value is not ISO-8601, rows are ordered by plain string comparison"
        );
    }

    let mut order: Vec<usize> = (0..dataset.num_rows()).collect();
    order.sort_by(|&a, &b| compare_time(&times[a], &times[b]));

    let sorted = dataset.take(&order);
    report_duplicates(&sorted, time_column, identifiers);
    debug!(rows = sorted.num_rows(), time_column, "Rows ordered by time");
    Ok(sorted)
}

/// Numbers compare numerically and sort before strings. Strings compare
/// lexicographically, which orders zero-padded ISO-8601 timestamps that share
/// one UTC offset. Mixed offsets or unpadded dates are not reordered to the
/// instant they denote.
fn compare_time(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,
        _ => cell_to_string(a).cmp(&cell_to_string(b)),
    }
}

/// Row of the first time value that would be sorted as a plain string: a
/// non-ISO string, or any ISO string when the column mixes UTC offsets.
fn first_non_iso_time(times: &[Value]) -> Option<usize> {
    let mut offset: Option<&str> = None;
    for (row, time) in times.iter().enumerate() {
        let Some(text) = time.as_str() else {
            continue;
        };
        if !is_iso_date(text) {
            return Some(row);
        }
        let suffix = utc_offset(text);
        match offset {
            None => offset = Some(suffix),
            Some(first) if first != suffix => return Some(row),
            Some(_) => {}
        }
    }
    None
}

/// Offset suffix of an ISO-8601 date-time (`Z`, `+02:00`), or `""`.
fn utc_offset(text: &str) -> &str {
    if text.len() <= 10 {
        return "";
    }
    if text.ends_with('Z') {
        return "Z";
    }
    match text[10..].rfind(['+', '-']) {
        Some(i) => &text[10 + i..],
        None => "",
    }
}

fn report_duplicates(dataset: &Dataset, time_column: &str, identifiers: &[String]) {
    let Some(times) = dataset.column(time_column) else {
        return;
    };
    let id_columns: Vec<&[Value]> = identifiers
        .iter()
        .filter_map(|name| dataset.column(name))
        .collect();

    let mut seen: HashMap<(Vec<String>, String), usize> = HashMap::new();
    for (row, time) in times.iter().enumerate() {
        let series: Vec<String> = id_columns.iter().map(|col| col[row].to_string()).collect();
        *seen.entry((series, time.to_string())).or_default() += 1;
    }

    for ((series, time), count) in seen.into_iter().filter(|(_, count)| *count > 1) {
        warn!(
            series = %series.join(", "),
            timestamp = %time,
            count,
            "Duplicate timestamp within a series"
        );
    }
}
