//! Dataset files.
//!
//! Input is a JSON array of row objects, or an object whose `rows` field is
//! such an array (the shape this module writes). Output always carries an
//! explicit schema next to the rows:
//!
//! ```json
//! {"schema": {"columns": [{"name": "date", "type": "date"}]}, "rows": [...]}
//! ```

use crate::core::Dataset;

use anyhow::{Context, anyhow};
use serde_json::{Map, Value, json};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Parses a dataset from JSON text.
pub fn parse_dataset(content: &str) -> anyhow::Result<Dataset> {
    let value: Value = serde_json::from_str(content).context("Input is not valid JSON")?;
    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(mut object) => match object.remove("rows") {
            Some(Value::Array(rows)) => rows,
            _ => return Err(anyhow!("Input object has no 'rows' array")),
        },
        _ => {
            return Err(anyhow!(
                "Input must be an array of rows or an object with a 'rows' array"
            ));
        }
    };

    let records = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Object(record) => Ok(record),
            other => Err(anyhow!("Row {i} is not an object: {other}")),
        })
        .collect::<anyhow::Result<Vec<Map<String, Value>>>>()?;

    Ok(Dataset::from_records(records))
}

/// Renders a dataset with its inferred schema.
pub fn render_dataset(dataset: &Dataset) -> Value {
    json!({
        "schema": { "columns": dataset.schema() },
        "rows": dataset.to_records(),
    })
}

pub async fn read_dataset<P: AsRef<Path>>(path: P) -> anyhow::Result<Dataset> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read dataset '{}'", path.display()))?;
    parse_dataset(&content).with_context(|| format!("Failed to parse dataset '{}'", path.display()))
}

/// Writes `dataset` to `path`, creating parent directories as needed.
pub async fn write_dataset<P: AsRef<Path>>(
    path: P,
    dataset: &Dataset,
    pretty: bool,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }

    let value = render_dataset(dataset);
    let mut bytes = if pretty {
        serde_json::to_vec_pretty(&value)?
    } else {
        serde_json::to_vec(&value)?
    };
    bytes.push(b'\n');

    let mut file = fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create '{}'", path.display()))?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    tracing::debug!(path = %path.display(), rows = dataset.num_rows(), "Dataset written");
    Ok(())
}
