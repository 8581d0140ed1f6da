//! Long-format grouping.
//!
//! A long-format dataset stacks several series, told apart by identifier
//! columns. Groups are enumerated as the Cartesian product of the distinct
//! values of every identifier, in first-appearance order. Combinations that
//! never occur in the data are skipped.

use super::dataset::{Dataset, cell_to_string};
use crate::error::{Error, Result};

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// One series: the identifier values that define it and its row indices.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesGroup {
    pub key: Vec<(String, Value)>,
    pub rows: Vec<usize>,
}

impl SeriesGroup {
    /// The group spanning every row of a wide-format dataset.
    pub fn whole(num_rows: usize) -> Self {
        Self {
            key: Vec::new(),
            rows: (0..num_rows).collect(),
        }
    }
}

impl fmt::Display for SeriesGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            return f.write_str("the whole dataset");
        }
        let parts: Vec<String> = self
            .key
            .iter()
            .map(|(column, value)| format!("{column}={}", cell_to_string(value)))
            .collect();
        write!(f, "group [{}]", parts.join(", "))
    }
}

/// Splits `dataset` into series groups.
///
/// Without identifiers the whole dataset is a single group.
pub fn group_rows(dataset: &Dataset, identifiers: &[String]) -> Result<Vec<SeriesGroup>> {
    if identifiers.is_empty() {
        return Ok(vec![SeriesGroup::whole(dataset.num_rows())]);
    }

    let columns = identifiers
        .iter()
        .map(|name| {
            dataset
                .column(name)
                .ok_or_else(|| Error::Dataset(format!("Identifier column '{name}' not found")))
        })
        .collect::<Result<Vec<_>>>()?;

    // Distinct values per identifier, plus the row index of every combination.
    let mut distinct: Vec<Vec<&Value>> = vec![Vec::new(); columns.len()];
    let mut index: HashMap<Vec<usize>, Vec<usize>> = HashMap::new();
    for row in 0..dataset.num_rows() {
        let mut combination = Vec::with_capacity(columns.len());
        for (values, column) in distinct.iter_mut().zip(&columns) {
            let cell = &column[row];
            let position = match values.iter().position(|v| *v == cell) {
                Some(p) => p,
                None => {
                    values.push(cell);
                    values.len() - 1
                }
            };
            combination.push(position);
        }
        index.entry(combination).or_default().push(row);
    }

    let mut groups = Vec::new();
    for combination in cartesian_product(&distinct.iter().map(Vec::len).collect::<Vec<_>>()) {
        let key: Vec<(String, Value)> = identifiers
            .iter()
            .zip(&combination)
            .zip(&distinct)
            .map(|((name, &p), values)| (name.clone(), values[p].clone()))
            .collect();

        match index.remove(&combination) {
            Some(rows) => groups.push(SeriesGroup { key, rows }),
            None => {
                let group = SeriesGroup {
                    key,
                    rows: Vec::new(),
                };
                debug!(%group, "Skipping identifier combination without rows");
            }
        }
    }
    Ok(groups)
}

/// Every index combination for dimensions of the given sizes, last dimension
/// varying fastest.
fn cartesian_product(sizes: &[usize]) -> Vec<Vec<usize>> {
    if sizes.contains(&0) {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut current = vec![0; sizes.len()];
    loop {
        out.push(current.clone());
        let mut dim = sizes.len();
        loop {
            if dim == 0 {
                return out;
            }
            dim -= 1;
            current[dim] += 1;
            if current[dim] < sizes[dim] {
                break;
            }
            current[dim] = 0;
        }
    }
}
