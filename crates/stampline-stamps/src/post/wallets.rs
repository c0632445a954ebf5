//! Wallet address extraction, counting and validation

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{is_btc_address, sibling_with_suffix};

/// File name prefixes scanned by [`collect_wallets`]
pub const WALLET_FILE_PREFIXES: [&str; 2] = ["col-", "src-"];

/// Files in `dir` whose name starts with a wallet file prefix, sorted.
pub fn wallet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.file_type()?.is_file()
            && WALLET_FILE_PREFIXES.iter().any(|p| name.starts_with(p))
        {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Every cell of `files` that is a valid address, deduplicated and sorted.
pub fn collect_wallets(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut addresses = BTreeSet::new();
    for path in files {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let before = addresses.len();
        for record in reader.records() {
            let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
            addresses.extend(record.iter().filter(|c| is_btc_address(c)).map(String::from));
        }
        log::debug!("{}: {} new addresses", path.display(), addresses.len() - before);
    }
    Ok(addresses.into_iter().collect())
}

/// Write one address per line, replacing `path`.
pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

/// Occurrence counts of a single-column holder file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddressCounts {
    /// Valid addresses with their occurrence count, first-seen order
    pub counts: Vec<(String, usize)>,
    /// Rejected cells, in file order
    pub invalid: Vec<String>,
}

/// Count valid addresses in the first column of `input` (header skipped).
pub fn count_addresses(input: &Path) -> Result<AddressCounts> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;

    let mut result = AddressCounts::default();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    for record in reader.records() {
        let record = record?;
        let address = record.get(0).unwrap_or("").trim();
        if !is_btc_address(address) {
            log::warn!("invalid address format: {address}");
            result.invalid.push(address.to_string());
            continue;
        }
        match index.get(address) {
            Some(&i) => result.counts[i].1 += 1,
            None => {
                index.insert(address.to_string(), result.counts.len());
                result.counts.push((address.to_string(), 1));
            }
        }
    }
    Ok(result)
}

/// Write `<stem>.counted.csv` and `<stem>.invalid.log` next to `input`.
pub fn write_counts(input: &Path, counts: &AddressCounts) -> Result<(PathBuf, PathBuf)> {
    let counted = sibling_with_suffix(input, ".counted.csv");
    let invalid = sibling_with_suffix(input, ".invalid.log");

    let mut writer = csv::Writer::from_path(&counted)
        .with_context(|| format!("Failed to create {}", counted.display()))?;
    writer.write_record(["address", "count"])?;
    for (address, count) in &counts.counts {
        writer.write_record([address.as_str(), &count.to_string()])?;
    }
    writer.flush()?;

    write_lines(&invalid, &counts.invalid)?;
    Ok((counted, invalid))
}

/// Unique non-empty creator and destination addresses of an actions file.
pub fn action_addresses(input: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let headers = reader.headers()?.clone();
    let cols: Vec<usize> = ["creator", "destination"]
        .iter()
        .filter_map(|name| headers.iter().position(|h| h.trim() == *name))
        .collect();
    if cols.is_empty() {
        bail!("{}: no creator or destination column", input.display());
    }

    let mut seen = FxHashSet::default();
    let mut addresses = Vec::new();
    for record in reader.records() {
        let record = record?;
        for &col in &cols {
            let address = record.get(col).unwrap_or("").trim();
            if !address.is_empty() && seen.insert(address.to_string()) {
                addresses.push(address.to_string());
            }
        }
    }
    Ok(addresses)
}

/// Write a one-column `address` CSV, replacing `output`.
pub fn write_address_csv(output: &Path, addresses: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(["address"])?;
    for address in addresses {
        writer.write_record([address])?;
    }
    writer.flush()?;
    Ok(())
}
