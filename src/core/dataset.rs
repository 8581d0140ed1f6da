//! In-memory tabular dataset.
//!
//! Cells are kept as JSON values in column-major order. The dataset exposes
//! its column names before any values are touched, which is what the
//! configuration layer uses for its membership checks.

use crate::error::{Error, Result};

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
}

/// Declared type of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bigint,
    Double,
    Boolean,
    Date,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: ColumnType,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dataset from row objects. Columns are ordered by first
    /// appearance; keys missing from a row become nulls.
    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let data = columns
            .iter()
            .map(|name| {
                records
                    .iter()
                    .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, data }
    }

    /// Builds a dataset from named columns of equal length.
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>) -> Result<Self> {
        let mut dataset = Self::new();
        for (name, values) in columns {
            if dataset.has_column(&name) {
                return Err(Error::Dataset(format!("Duplicate column '{name}'")));
            }
            dataset.append_column(&name, values)?;
        }
        Ok(dataset)
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.position(name).map(|i| self.data[i].as_slice())
    }

    pub fn num_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Cells of a column read as numbers; non-numeric cells are `None`.
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name)
            .map(|values| values.iter().map(cell_as_f64).collect())
    }

    /// New dataset holding the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            data: self
                .data
                .iter()
                .map(|col| rows.iter().map(|&r| col[r].clone()).collect())
                .collect(),
        }
    }

    /// Appends a column, replacing any existing column of the same name.
    pub fn append_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if !self.columns.is_empty() && values.len() != self.num_rows() {
            return Err(Error::Dataset(format!(
                "Column '{}' has {} values but the dataset has {} rows",
                name,
                values.len(),
                self.num_rows()
            )));
        }

        match self.position(name) {
            Some(i) => self.data[i] = values,
            None => {
                self.columns.push(name.to_string());
                self.data.push(values);
            }
        }
        Ok(())
    }

    /// Appends a numeric column; non-finite values are stored as nulls.
    pub fn append_numeric_column(&mut self, name: &str, values: &[f64]) -> Result<()> {
        let cells = values
            .iter()
            .map(|&v| Number::from_f64(v).map_or(Value::Null, Value::Number))
            .collect();
        self.append_column(name, cells)
    }

    /// Stacks datasets sharing the same columns.
    pub fn concat(parts: Vec<Dataset>) -> Result<Self> {
        let mut parts = parts.into_iter();
        let Some(mut out) = parts.next() else {
            return Ok(Self::new());
        };

        for part in parts {
            if part.columns != out.columns {
                return Err(Error::Dataset(format!(
                    "Cannot concatenate datasets with columns {:?} and {:?}",
                    out.columns, part.columns
                )));
            }
            for (dst, src) in out.data.iter_mut().zip(part.data) {
                dst.extend(src);
            }
        }
        Ok(out)
    }

    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        (0..self.num_rows())
            .map(|row| {
                self.columns
                    .iter()
                    .zip(&self.data)
                    .map(|(name, col)| (name.clone(), col[row].clone()))
                    .collect()
            })
            .collect()
    }

    /// Infers the declared type of every column.
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .zip(&self.data)
            .map(|(name, values)| ColumnSchema {
                name: name.clone(),
                r#type: infer_type(values),
            })
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Reads a cell as a number, accepting numeric strings.
pub fn cell_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Renders a cell for messages and group keys, without JSON string quotes.
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn iso_date() -> &'static Regex {
    static ISO_DATE: OnceLock<Regex> = OnceLock::new();
    ISO_DATE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$")
            .expect("valid ISO-8601 pattern")
    })
}

/// Whether `s` is an ISO-8601 date or date-time.
pub fn is_iso_date(s: &str) -> bool {
    iso_date().is_match(s)
}

fn infer_type(values: &[Value]) -> ColumnType {
    let mut present = values.iter().filter(|v| !v.is_null()).peekable();
    if present.peek().is_none() {
        return ColumnType::String;
    }

    let present: Vec<&Value> = present.collect();
    if present.iter().all(|v| v.is_i64() || v.is_u64()) {
        ColumnType::Bigint
    } else if present.iter().all(|v| v.is_number()) {
        ColumnType::Double
    } else if present.iter().all(|v| v.is_boolean()) {
        ColumnType::Boolean
    } else if present.iter().all(|v| v.as_str().is_some_and(is_iso_date)) {
        ColumnType::Date
    } else {
        ColumnType::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<Map<String, Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_from_records_fills_missing_cells() {
        let ds = Dataset::from_records(records(json!([
            {"date": "2024-01-01", "sales": 1},
            {"date": "2024-01-02", "store": "A"},
        ])));

        assert_eq!(ds.column_names(), &["date", "sales", "store"]);
        assert_eq!(ds.num_rows(), 2);
        assert_eq!(ds.column("sales").unwrap(), &[json!(1), Value::Null]);
    }

    #[test]
    fn test_take_and_concat() {
        let ds = Dataset::from_columns(vec![
            ("t".into(), vec![json!(1), json!(2), json!(3)]),
            ("v".into(), vec![json!(10), json!(20), json!(30)]),
        ])
        .unwrap();

        let head = ds.take(&[2, 0]);
        assert_eq!(head.column("v").unwrap(), &[json!(30), json!(10)]);

        let all = Dataset::concat(vec![head, ds.take(&[1])]).unwrap();
        assert_eq!(all.column("t").unwrap(), &[json!(3), json!(1), json!(2)]);
    }

    #[test]
    fn test_concat_rejects_mismatched_columns() {
        let a = Dataset::from_columns(vec![("a".into(), vec![json!(1)])]).unwrap();
        let b = Dataset::from_columns(vec![("b".into(), vec![json!(1)])]).unwrap();
        assert!(Dataset::concat(vec![a, b]).is_err());
        assert!(Dataset::concat(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_append_column_checks_length() {
        let mut ds = Dataset::from_columns(vec![("a".into(), vec![json!(1), json!(2)])]).unwrap();
        assert!(ds.append_column("b", vec![json!(1)]).is_err());

        ds.append_numeric_column("b", &[1.5, f64::NAN]).unwrap();
        assert_eq!(ds.column("b").unwrap(), &[json!(1.5), Value::Null]);
    }

    #[test]
    fn test_numeric_column() {
        let ds = Dataset::from_columns(vec![(
            "v".into(),
            vec![json!(1), json!("2.5"), json!("x"), Value::Null],
        )])
        .unwrap();
        assert_eq!(ds.numeric_column("v").unwrap(), vec![Some(1.0), Some(2.5), None, None]);
        assert!(ds.numeric_column("missing").is_none());
    }

    #[test]
    fn test_schema_inference() {
        let ds = Dataset::from_columns(vec![
            ("id".into(), vec![json!(1), json!(2)]),
            ("value".into(), vec![json!(1), json!(2.5)]),
            ("flag".into(), vec![json!(true), Value::Null]),
            ("date".into(), vec![json!("2024-01-01"), json!("2024-01-02T10:00:00Z")]),
            ("store".into(), vec![json!("A"), json!(3)]),
            ("empty".into(), vec![Value::Null, Value::Null]),
        ])
        .unwrap();

        let types: Vec<ColumnType> = ds.schema().into_iter().map(|c| c.r#type).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Bigint,
                ColumnType::Double,
                ColumnType::Boolean,
                ColumnType::Date,
                ColumnType::String,
                ColumnType::String,
            ]
        );
    }
}
