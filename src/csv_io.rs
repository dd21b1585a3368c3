// 📂 CSV adapter - load sheets into Datasets and persist results
// File glue only; the engines never touch the filesystem.

use crate::model::{Dataset, Value};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Dataset identifier for a path: its file name.
pub fn dataset_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Load one CSV file; cells are type-inferred, short rows padded.
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let columns: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut dataset = Dataset::new(dataset_id(path), columns);
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read row {} of {:?}", idx + 1, path))?;
        dataset.push_row(record.iter().map(Value::infer).collect());
    }

    info!(dataset = %dataset.id, rows = dataset.len(), "loaded CSV");
    Ok(dataset)
}

/// Load every readable file; unreadable ones are logged and skipped.
pub fn read_datasets<P: AsRef<Path>>(paths: &[P]) -> Vec<Dataset> {
    paths
        .iter()
        .filter_map(|p| match read_dataset(p) {
            Ok(dataset) => Some(dataset),
            Err(error) => {
                warn!(path = ?p.as_ref(), error = %format!("{:#}", error), "skipping unreadable dataset");
                None
            }
        })
        .collect()
}

pub fn write_dataset<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("Failed to create CSV file: {:?}", path))?;

    writer.write_record(&dataset.columns).context("Failed to write CSV header")?;
    for row in &dataset.rows {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .context("Failed to write CSV row")?;
    }
    writer.flush().context("Failed to flush CSV file")?;

    info!(path = ?path, rows = dataset.len(), "wrote CSV");
    Ok(())
}
