//! Fetch jobs and their work-item sources

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};

/// A domain fetch: which endpoint, which record type, which projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    /// Holders of SRC20 tickers; work items are tickers
    Src20Holders,
    /// Holders of stamp assets; work items are stamp asset ids
    StampHolders,
    /// SRC20 balances of wallets; work items are addresses
    Balances,
    /// SRC20 actions of tickers; work items are tickers
    Actions,
}

impl Job {
    pub const ALL: [Job; 4] = [
        Job::Src20Holders,
        Job::StampHolders,
        Job::Balances,
        Job::Actions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Job::Src20Holders => "src20-holders",
            Job::StampHolders => "stamp-holders",
            Job::Balances => "balances",
            Job::Actions => "actions",
        }
    }

    /// Output file name used when none is given
    pub fn default_file_name(self) -> &'static str {
        match self {
            Job::Src20Holders => "src20_holders.csv",
            Job::StampHolders => "stamp_holders.csv",
            Job::Balances => "balances_snapshot_src20.csv",
            Job::Actions => "src20_actions.csv",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Job {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Job::ALL
            .into_iter()
            .find(|job| job.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Job::ALL.iter().map(|j| j.name()).collect();
                format!("unknown job '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Read work items from a file, one per non-empty line.
///
/// Order and duplicates are kept.
pub fn load_items(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read work items from {}", path.display()))?;
    Ok(parse_items(&content))
}

pub fn parse_items(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
