//! File transforms run after fetching: merge, allocate, wallet extraction,
//! table cleanup and JSON dump conversion

pub mod allocate;
pub mod clean;
pub mod eligibility;
pub mod json;
pub mod merge;
pub mod wallets;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static BTC_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(bc1|[13])[a-zA-HJ-NP-Z0-9]{25,39}$").expect("invalid address pattern")
});

/// Legacy, P2SH or bech32 address shape. Not a checksum validation.
pub fn is_btc_address(s: &str) -> bool {
    BTC_ADDRESS.is_match(s)
}

/// `dir/stem<suffix>` for `path` = `dir/stem.ext`
pub(crate) fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}"))
}
