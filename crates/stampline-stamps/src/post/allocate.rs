//! Allocation amounts per address from a merged holder table

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::sibling_with_suffix;

/// Which held assets earn an allocation and how much.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationRules {
    /// Each asset with a positive balance earns `per_asset`
    pub assets: Vec<String>,
    pub per_asset: u64,
    /// Asset earning `bonus` on top when held
    pub bonus_asset: Option<String>,
    pub bonus: u64,
}

impl AllocationRules {
    pub fn validate(&self) -> Result<()> {
        if self.assets.is_empty() && self.bonus_asset.is_none() {
            bail!("no allocation assets configured");
        }
        if self.assets.iter().any(|a| a.trim().is_empty()) {
            bail!("allocation asset names must not be empty");
        }
        Ok(())
    }
}

/// `<input stem>_allocations.csv` next to the input
pub fn allocations_path(input: &Path) -> PathBuf {
    sibling_with_suffix(input, "_allocations.csv")
}

/// Compute `address,allocation` for every row of `input`.
///
/// Asset columns match case-insensitively; assets absent from the header
/// count as not held. Empty cells count as zero.
pub fn allocate(input: &Path, rules: &AllocationRules) -> Result<Vec<(String, u64)>> {
    rules.validate()?;
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
    };

    let Some(address_col) = column("address") else {
        bail!("{}: no address column", input.display());
    };
    let asset_cols: Vec<usize> = rules
        .assets
        .iter()
        .filter_map(|asset| {
            let col = column(asset);
            if col.is_none() {
                log::warn!("{}: no column for asset {asset}", input.display());
            }
            col
        })
        .collect();
    let bonus_col = rules.bonus_asset.as_deref().and_then(column);

    let mut allocations = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let held = |col: usize| -> Result<bool> {
            let cell = record.get(col).unwrap_or("").trim();
            if cell.is_empty() {
                return Ok(false);
            }
            let value: f64 = cell
                .parse()
                .with_context(|| format!("row {}: bad balance '{cell}'", line + 2))?;
            Ok(value > 0.0)
        };

        let mut amount = 0;
        for &col in &asset_cols {
            if held(col)? {
                amount += rules.per_asset;
            }
        }
        if let Some(col) = bonus_col {
            if held(col)? {
                amount += rules.bonus;
            }
        }
        let address = record.get(address_col).unwrap_or("").trim().to_string();
        allocations.push((address, amount));
    }
    Ok(allocations)
}

/// Write `address,allocation` rows, replacing `output`.
pub fn write_allocations(output: &Path, allocations: &[(String, u64)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(["address", "allocation"])?;
    for (address, amount) in allocations {
        writer.write_record([address.as_str(), &amount.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rules() -> AllocationRules {
        AllocationRules {
            assets: vec!["STAMP".into(), "KEVIN".into(), "UTXO".into()],
            per_asset: 3000,
            bonus_asset: Some("SPAD".into()),
            bonus: 9000,
        }
    }

    #[test]
    fn sums_assets_and_bonus() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("all_holders.merged.csv");
        fs::write(
            &input,
            "address,KEVIN,SPAD,stamp,lowest_blockHeight,highest_blockHeight\n\
             bc1a,10,0,1,1,2\n\
             bc1b,0,5,0,1,2\n\
             bc1c,,,,1,2\n\
             bc1d,1,1,1,1,2\n",
        )
        .unwrap();

        let allocations = allocate(&input, &rules()).unwrap();
        assert_eq!(
            allocations,
            vec![
                ("bc1a".to_string(), 6000),
                ("bc1b".to_string(), 9000),
                ("bc1c".to_string(), 0),
                ("bc1d".to_string(), 15000),
            ]
        );

        let output = allocations_path(&input);
        assert_eq!(output, dir.path().join("all_holders.merged_allocations.csv"));
        write_allocations(&output, &allocations).unwrap();
        let content = fs::read_to_string(&output).unwrap();
        assert!(content.starts_with("address,allocation\nbc1a,6000\n"));
    }

    #[test]
    fn rules_must_name_assets() {
        assert!(AllocationRules::default().validate().is_err());
        let rules = AllocationRules {
            assets: vec![" ".into()],
            ..rules()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn bad_cell_is_an_error() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("m.csv");
        fs::write(&input, "address,KEVIN\nbc1a,many\n").unwrap();
        let err = allocate(&input, &rules()).unwrap_err();
        assert!(format!("{err:#}").contains("bad balance 'many'"));
    }
}
