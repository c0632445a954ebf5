//! File transforms over collected CSVs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use stampline_core::{SharedProgress, fmt_num};
use stampline_stamps::post as transform;

use super::print_summary;
use crate::config::Config;

/// Default merge output name inside the holders directory
const MERGED_FILE: &str = "all_holders.merged.csv";
/// Default wallets output name inside the collections directory
const WALLETS_FILE: &str = "col-MERGED.txt";

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Holder CSVs, or directories scanned for staging-*.csv
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output CSV (default: <first directory>/all_holders.merged.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the merged totals instead of writing a file
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct AllocateArgs {
    /// Merged holder CSV
    pub input: PathBuf,

    /// Output CSV (default: <input stem>_allocations.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WalletsArgs {
    /// Directory containing col-*/src-* CSVs
    pub dir: PathBuf,

    /// Output file (default: <dir>/col-MERGED.txt)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CountArgs {
    /// Single-column holder CSV
    pub input: PathBuf,
}

#[derive(Args, Debug)]
pub struct AddressesArgs {
    /// Actions CSV
    pub input: PathBuf,

    /// Output CSV (default: <input stem>_addresses.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EligibilityArgs {
    /// Merged holder CSV
    pub input: PathBuf,

    /// Output CSV (default: rewrite the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// CSV to clean
    pub input: PathBuf,

    /// Output CSV (default: rewrite the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Columns to remove; unknown names are ignored
    #[arg(long = "drop", value_delimiter = ',')]
    pub drop_columns: Vec<String>,

    /// Columns cut to the date before a `T` time part
    #[arg(long = "date-only", value_delimiter = ',')]
    pub date_only: Vec<String>,

    /// Columns truncated to integers
    #[arg(long = "int", value_delimiter = ',')]
    pub to_int: Vec<String>,
}

#[derive(Args, Debug)]
pub struct JsonArgs {
    /// JSON files, directories, or file name prefixes matched as <prefix>*.json
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output CSV
    #[arg(short, long)]
    pub output: PathBuf,

    /// Fields removed from every object
    #[arg(long = "drop-field", value_delimiter = ',', default_value = transform::json::DEFAULT_DROP_FIELD)]
    pub drop_fields: Vec<String>,
}

/// Expand directories into their holder files
fn resolve_holder_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = transform::merge::holder_files(input)?;
            if found.is_empty() {
                log::warn!("No holder files in {}", input.display());
            }
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn merge_output(args: &MergeArgs) -> PathBuf {
    if let Some(output) = &args.output {
        return output.clone();
    }
    args.inputs
        .iter()
        .find(|p| p.is_dir())
        .map_or_else(|| PathBuf::from(MERGED_FILE), |dir| dir.join(MERGED_FILE))
}

pub fn merge(args: MergeArgs, progress: &SharedProgress) -> Result<()> {
    let files = resolve_holder_files(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No holder files to merge");
    }

    let stage = progress.stage_line("merge");
    stage.set_message(format!("{} files", files.len()));
    let merged = transform::merge::merge_files(&files);
    stage.finish_and_clear();
    let merged = merged?;

    if args.dry_run {
        merged
            .print(std::io::stdout().lock())
            .context("Failed to print merged holders")?;
        return Ok(());
    }

    let output = merge_output(&args);
    let rows = merged.write_csv(&output)?;
    print_summary(
        "Merge",
        &[
            ("Files", files.len().to_string()),
            ("Tickers", merged.tickers().collect::<Vec<_>>().join(", ")),
            ("Addresses", fmt_num(rows)),
            ("Output", output.display().to_string()),
        ],
    );
    Ok(())
}

pub fn allocate(args: AllocateArgs, config: &Config) -> Result<()> {
    let rules = config.allocation.to_rules();
    rules
        .validate()
        .context("Set [allocation] assets in the config file")?;

    let allocations = transform::allocate::allocate(&args.input, &rules)?;
    let output = args
        .output
        .unwrap_or_else(|| transform::allocate::allocations_path(&args.input));
    transform::allocate::write_allocations(&output, &allocations)?;

    let total: u64 = allocations.iter().map(|(_, amount)| amount).sum();
    let receiving = allocations.iter().filter(|(_, amount)| *amount > 0).count();
    print_summary(
        "Allocate",
        &[
            ("Addresses", fmt_num(allocations.len())),
            ("Receiving", fmt_num(receiving)),
            ("Total allocation", total.to_string()),
            ("Output", output.display().to_string()),
        ],
    );
    Ok(())
}

pub fn wallets(args: WalletsArgs) -> Result<()> {
    let files = transform::wallets::wallet_files(&args.dir)?;
    if files.is_empty() {
        anyhow::bail!("No col-*/src-* files in {}", args.dir.display());
    }
    let wallets = transform::wallets::collect_wallets(&files)?;
    let output = args.output.unwrap_or_else(|| args.dir.join(WALLETS_FILE));
    transform::wallets::write_lines(&output, &wallets)?;

    print_summary(
        "Wallets",
        &[
            ("Files", files.len().to_string()),
            ("Unique wallets", fmt_num(wallets.len())),
            ("Output", output.display().to_string()),
        ],
    );
    Ok(())
}

pub fn count(args: CountArgs) -> Result<()> {
    let counts = transform::wallets::count_addresses(&args.input)?;
    let (counted, invalid) = transform::wallets::write_counts(&args.input, &counts)?;

    print_summary(
        "Count",
        &[
            ("Unique addresses", fmt_num(counts.counts.len())),
            ("Invalid", fmt_num(counts.invalid.len())),
            ("Counts", counted.display().to_string()),
            ("Invalid log", invalid.display().to_string()),
        ],
    );
    Ok(())
}

fn addresses_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_addresses.csv"))
}

pub fn addresses(args: AddressesArgs) -> Result<()> {
    let addresses = transform::wallets::action_addresses(&args.input)?;
    let output = args.output.unwrap_or_else(|| addresses_path(&args.input));
    transform::wallets::write_address_csv(&output, &addresses)?;

    print_summary(
        "Addresses",
        &[
            ("Unique addresses", fmt_num(addresses.len())),
            ("Output", output.display().to_string()),
        ],
    );
    Ok(())
}

pub fn eligibility(args: EligibilityArgs) -> Result<()> {
    let output = args.output.unwrap_or_else(|| args.input.clone());
    let stats = transform::eligibility::mark_eligibility(&args.input, &output)?;

    print_summary(
        "Eligibility",
        &[
            ("Rows", fmt_num(stats.rows)),
            ("Ineligible", fmt_num(stats.ineligible)),
            ("Duplicates dropped", fmt_num(stats.duplicates)),
            ("Output", output.display().to_string()),
        ],
    );
    Ok(())
}

pub fn clean(args: CleanArgs) -> Result<()> {
    let ops = transform::clean::CleanOps {
        drop_columns: args.drop_columns,
        date_only: args.date_only,
        to_int: args.to_int,
    };
    if ops.is_empty() {
        anyhow::bail!("Nothing to do: pass --drop, --date-only or --int");
    }
    let output = args.output.unwrap_or_else(|| args.input.clone());
    let stats = transform::clean::clean_table(&args.input, &output, &ops)?;

    print_summary(
        "Clean",
        &[
            ("Rows", fmt_num(stats.rows)),
            ("Columns dropped", stats.dropped_columns.to_string()),
            ("Cells changed", fmt_num(stats.changed_cells)),
            ("Output", output.display().to_string()),
        ],
    );
    Ok(())
}

pub fn json_to_csv(args: JsonArgs) -> Result<()> {
    let files = transform::json::json_inputs(&args.inputs)?;
    let stats = transform::json::jsons_to_csv(&files, &args.output, &args.drop_fields)?;

    print_summary(
        "JSON to CSV",
        &[
            ("Files", stats.files.to_string()),
            ("Rows", fmt_num(stats.rows)),
            ("Columns", stats.columns.to_string()),
            ("Output", args.output.display().to_string()),
        ],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn directories_expand_to_staging_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("staging-kevin_holders.csv"), "").unwrap();
        fs::write(dir.path().join("notes.csv"), "").unwrap();
        let extra = dir.path().join("extra.csv");

        let files = resolve_holder_files(&[dir.path().to_path_buf(), extra.clone()]).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("staging-kevin_holders.csv"), extra]
        );
    }

    #[test]
    fn merge_output_defaults_into_first_directory() {
        let dir = TempDir::new().unwrap();
        let args = MergeArgs {
            inputs: vec![PathBuf::from("a.csv"), dir.path().to_path_buf()],
            output: None,
            dry_run: false,
        };
        assert_eq!(merge_output(&args), dir.path().join(MERGED_FILE));

        let args = MergeArgs {
            inputs: vec![PathBuf::from("a.csv")],
            output: None,
            dry_run: false,
        };
        assert_eq!(merge_output(&args), PathBuf::from(MERGED_FILE));
    }

    #[test]
    fn addresses_path_uses_input_stem() {
        assert_eq!(
            addresses_path(Path::new("data/src20_actions.csv")),
            PathBuf::from("data/src20_actions_addresses.csv")
        );
    }

    #[test]
    fn clean_without_operations_is_refused() {
        let args = CleanArgs {
            input: PathBuf::from("missing.csv"),
            output: None,
            drop_columns: Vec::new(),
            date_only: Vec::new(),
            to_int: Vec::new(),
        };
        let err = clean(args).unwrap_err().to_string();
        assert!(err.starts_with("Nothing to do"), "{err}");
    }
}
