//! Per-file CSV reports.
//!
//! Rows are files, columns are metric names in first-seen order. A file
//! that is missing a value for some column (a dropped record, or a metric
//! added mid-run) gets an empty cell rather than a placeholder number.

use std::path::Path;

use indexmap::{IndexMap, IndexSet};

use crate::error::Result;
use crate::metrics::Metric;

/// Merge the per-file score views of several metrics into one table.
///
/// Later metrics win on column collisions, matching the order reports are
/// assembled in.
pub fn collect_rows(
    metrics: &[Box<dyn Metric>],
    noisy: bool,
) -> IndexMap<String, IndexMap<String, f32>> {
    let mut rows: IndexMap<String, IndexMap<String, f32>> = IndexMap::new();
    for metric in metrics {
        for (filename, values) in metric.flattened(noisy) {
            let row = rows.entry(filename).or_default();
            for (name, value) in values {
                row.insert(name, value);
            }
        }
    }
    rows
}

/// Write one score table as CSV with a `filename` key column.
pub fn write_csv(path: &Path, rows: &IndexMap<String, IndexMap<String, f32>>) -> Result<()> {
    let mut columns: IndexSet<&str> = IndexSet::new();
    for values in rows.values() {
        for name in values.keys() {
            columns.insert(name.as_str());
        }
    }

    let mut writer = csv::Writer::from_path(path)?;

    let mut header = Vec::with_capacity(columns.len() + 1);
    header.push("filename".to_string());
    header.extend(columns.iter().map(|c| c.to_string()));
    writer.write_record(&header)?;

    for (filename, values) in rows {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(filename.clone());
        for column in &columns {
            record.push(
                values
                    .get(*column)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
