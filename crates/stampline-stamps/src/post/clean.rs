//! Column cleanup of an exported table: drop columns, cut timestamps to
//! their date, coerce amounts to integers.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};

/// Column name whose values are coerced by default
pub const DEFAULT_INT_COLUMN: &str = "Amount";

/// Operations applied by [`clean_table`], in field order.
#[derive(Debug, Clone, Default)]
pub struct CleanOps {
    /// Removed when present; absent names are ignored
    pub drop_columns: Vec<String>,
    /// Keep only the text before the first `T` (`2024-03-01T12:00:00` -> `2024-03-01`)
    pub date_only: Vec<String>,
    /// Truncate to an integer; an empty or non-numeric cell is an error
    pub to_int: Vec<String>,
}

impl CleanOps {
    pub fn is_empty(&self) -> bool {
        self.drop_columns.is_empty() && self.date_only.is_empty() && self.to_int.is_empty()
    }
}

/// Outcome counters of [`clean_table`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub rows: usize,
    pub dropped_columns: usize,
    /// Cells whose text changed
    pub changed_cells: usize,
}

/// Read `input`, apply `ops` and write the result to `output`.
///
/// `output` may equal `input`; the whole table is read before writing.
pub fn clean_table(input: &Path, output: &Path, ops: &CleanOps) -> Result<CleanStats> {
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();

    let keep: Vec<usize> = (0..headers.len())
        .filter(|&i| !ops.drop_columns.contains(&headers[i]))
        .collect();
    let date_cols = column_indexes(&headers, &ops.date_only, input)?;
    let int_cols = column_indexes(&headers, &ops.to_int, input)?;

    let mut stats = CleanStats {
        dropped_columns: headers.len() - keep.len(),
        ..Default::default()
    };
    let mut rows = Vec::new();
    for (n, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read {}", input.display()))?;
        let mut row: Vec<String> = record.iter().map(String::from).collect();
        row.resize(headers.len(), String::new());

        for &i in &date_cols {
            if let Some(pos) = row[i].find('T') {
                row[i].truncate(pos);
                stats.changed_cells += 1;
            }
        }
        for &i in &int_cols {
            let Some(value) = to_int(&row[i]) else {
                // Data rows start on line 2
                bail!(
                    "{} line {}: {} value '{}' is not a number",
                    input.display(),
                    n + 2,
                    headers[i],
                    row[i]
                );
            };
            let value = value.to_string();
            if value != row[i] {
                row[i] = value;
                stats.changed_cells += 1;
            }
        }

        rows.push(keep.iter().map(|&i| std::mem::take(&mut row[i])).collect::<Vec<_>>());
        stats.rows += 1;
    }
    drop(reader);

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(keep.iter().map(|&i| &headers[i]))?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(stats)
}

fn column_indexes(headers: &[String], names: &[String], input: &Path) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| anyhow!("{}: no {name} column", input.display()))
        })
        .collect()
}

/// Integer value of `cell`, truncating any fraction toward zero.
fn to_int(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    if let Ok(v) = cell.parse::<i64>() {
        return Some(v);
    }
    let v = cell.parse::<f64>().ok()?;
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    if !v.is_finite() || v >= i64::MAX as f64 || v < i64::MIN as f64 {
        return None;
    }
    Some(v.trunc() as i64)
}
