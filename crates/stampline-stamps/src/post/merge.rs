//! Merge per-ticker holder files into one wide table.
//!
//! Input rows are `address,balance,blockHeight` (ticker taken from a
//! `staging-<ticker>_holders.csv` file name) or carry their own `tick`
//! column as written by the `src20-holders` job. Output has one row per
//! address: `address,<ticker...>,lowest_blockHeight,highest_blockHeight`.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rustc_hash::FxHashMap;

/// File name prefix of per-ticker holder files
pub const STAGING_PREFIX: &str = "staging-";
const HOLDERS_SUFFIX: &str = "_holders.csv";

/// Balance and block range of one address for one ticker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerTotals {
    pub balance: f64,
    pub low_block: u64,
    pub high_block: u64,
}

impl TickerTotals {
    fn add(&mut self, balance: f64, block: u64) {
        self.balance += balance;
        self.low_block = self.low_block.min(block);
        self.high_block = self.high_block.max(block);
    }
}

/// Aggregated holders, addresses in first-seen order.
#[derive(Debug, Default)]
pub struct Merged {
    tickers: BTreeSet<String>,
    addresses: Vec<String>,
    index: FxHashMap<String, usize>,
    totals: Vec<FxHashMap<String, TickerTotals>>,
}

impl Merged {
    fn add(&mut self, address: &str, tick: &str, balance: f64, block: u64) {
        self.tickers.insert(tick.to_string());
        let i = match self.index.get(address) {
            Some(&i) => i,
            None => {
                self.index.insert(address.to_string(), self.addresses.len());
                self.addresses.push(address.to_string());
                self.totals.push(FxHashMap::default());
                self.addresses.len() - 1
            }
        };
        self.totals[i]
            .entry(tick.to_string())
            .and_modify(|t| t.add(balance, block))
            .or_insert(TickerTotals {
                balance,
                low_block: block,
                high_block: block,
            });
    }

    /// Sorted ticker columns
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.tickers.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn totals(&self, address: &str, tick: &str) -> Option<TickerTotals> {
        let i = *self.index.get(address)?;
        self.totals[i].get(tick).copied()
    }

    /// Header and rows of the merged table
    fn rows(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut header = vec!["address".to_string()];
        header.extend(self.tickers.iter().cloned());
        header.push("lowest_blockHeight".to_string());
        header.push("highest_blockHeight".to_string());

        let rows = self
            .addresses
            .iter()
            .zip(&self.totals)
            .map(|(address, totals)| {
                let mut row = Vec::with_capacity(header.len());
                row.push(address.clone());
                for tick in &self.tickers {
                    row.push(totals.get(tick).map_or("0".to_string(), |t| t.balance.to_string()));
                }
                let low = totals.values().map(|t| t.low_block).min().unwrap_or(0);
                let high = totals.values().map(|t| t.high_block).max().unwrap_or(0);
                row.push(low.to_string());
                row.push(high.to_string());
                row
            })
            .collect();
        (header, rows)
    }

    /// Write the merged table, replacing `path`. Returns the row count.
    pub fn write_csv(&self, path: &Path) -> Result<usize> {
        let (header, rows) = self.rows();
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(&header)?;
        for row in &rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(rows.len())
    }

    /// Human-readable listing used by `--dry-run`
    pub fn print(&self, mut out: impl Write) -> std::io::Result<()> {
        for (address, totals) in self.addresses.iter().zip(&self.totals) {
            writeln!(out, "Address: {address}")?;
            for tick in &self.tickers {
                if let Some(t) = totals.get(tick) {
                    writeln!(
                        out,
                        "  {tick}: balance={} low_block={} high_block={}",
                        t.balance, t.low_block, t.high_block
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Holder files in `dir` matching `staging-*.csv`, sorted.
pub fn holder_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join(format!("{STAGING_PREFIX}*.csv"));
    let pattern = pattern.to_string_lossy();
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Bad glob pattern {pattern}"))?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();
    Ok(files)
}

/// Ticker encoded in a `staging-<ticker>_holders.csv` file name
pub fn ticker_from_file_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(STAGING_PREFIX)?;
    let tick = rest
        .strip_suffix(HOLDERS_SUFFIX)
        .or_else(|| rest.strip_suffix(".csv"))?;
    (!tick.is_empty()).then(|| tick.to_string())
}

/// Aggregate every file into one [`Merged`] table.
pub fn merge_files(files: &[PathBuf]) -> Result<Merged> {
    let mut merged = Merged::default();
    for path in files {
        let rows = merge_file(path, &mut merged)
            .with_context(|| format!("Failed to merge {}", path.display()))?;
        log::info!("{}: {rows} rows", path.display());
    }
    Ok(merged)
}

fn merge_file(path: &Path, merged: &mut Merged) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);

    let (Some(address_col), Some(balance_col), Some(block_col)) =
        (column("address"), column("balance"), column("blockHeight"))
    else {
        bail!("expected columns address, balance, blockHeight");
    };
    let tick_col = column("tick");
    let file_tick = ticker_from_file_name(path);
    if tick_col.is_none() && file_tick.is_none() {
        bail!("no tick column and no ticker in the file name");
    }

    let mut rows = 0;
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();
        let tick = match (tick_col, &file_tick) {
            (Some(i), _) if !field(i).is_empty() => field(i).to_string(),
            (_, Some(tick)) => tick.clone(),
            _ => bail!("row {}: empty tick", line + 2),
        };
        let balance: f64 = field(balance_col)
            .parse()
            .with_context(|| format!("row {}: bad balance '{}'", line + 2, field(balance_col)))?;
        let block: u64 = field(block_col)
            .parse()
            .with_context(|| format!("row {}: bad blockHeight '{}'", line + 2, field(block_col)))?;
        merged.add(field(address_col), &tick, balance, block);
        rows += 1;
    }
    Ok(rows)
}
