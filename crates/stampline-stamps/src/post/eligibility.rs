//! Eligibility marking and cleanup of a merged holder table.
//!
//! Adds an `eligible` column (`No` for P2WSH script-hash addresses), fills
//! empty balance cells with `0` and drops rows repeating an address with
//! the same balances.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use rustc_hash::FxHashSet;

pub const ELIGIBLE_COLUMN: &str = "eligible";

static P2WSH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^bc1q[02-9ac-hj-np-z]{58}$").expect("invalid P2WSH pattern")
});

/// Native segwit v0 script-hash address (62 characters)
pub fn is_p2wsh(address: &str) -> bool {
    P2WSH.is_match(address)
}

/// Outcome counters of [`mark_eligibility`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EligibilityStats {
    pub rows: usize,
    pub ineligible: usize,
    pub duplicates: usize,
}

/// Read `input`, mark eligibility and write the cleaned table to `output`.
///
/// `output` may equal `input`; the whole table is read before writing.
pub fn mark_eligibility(input: &Path, output: &Path) -> Result<EligibilityStats> {
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let mut headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let Some(address_col) = headers.iter().position(|h| h == "address") else {
        bail!("{}: no address column", input.display());
    };
    let eligible_col = match headers.iter().position(|h| h == ELIGIBLE_COLUMN) {
        Some(i) => i,
        None => {
            headers.push(ELIGIBLE_COLUMN.to_string());
            headers.len() - 1
        }
    };
    // Balance columns: everything except identity, eligibility and block range
    let balance_cols: Vec<usize> = (0..headers.len())
        .filter(|&i| i != address_col && i != eligible_col && !headers[i].ends_with("blockHeight"))
        .collect();

    let mut stats = EligibilityStats::default();
    let mut seen = FxHashSet::default();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(String::from).collect();
        row.resize(headers.len(), String::new());

        let eligible = !is_p2wsh(row[address_col].trim());
        row[eligible_col] = String::from(if eligible { "Yes" } else { "No" });
        for &i in &balance_cols {
            if row[i].trim().is_empty() {
                row[i] = "0".to_string();
            }
        }

        let mut key = vec![row[address_col].clone()];
        key.extend(balance_cols.iter().map(|&i| row[i].clone()));
        if !seen.insert(key) {
            stats.duplicates += 1;
            continue;
        }
        if !eligible {
            stats.ineligible += 1;
        }
        stats.rows += 1;
        rows.push(row);
    }
    drop(reader);

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(&headers)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(stats)
}
