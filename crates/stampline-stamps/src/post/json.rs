//! Flatten raw JSON dumps (arrays or JSON lines) into one CSV table

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};

/// Field removed from every object by default: inline image payloads
pub const DEFAULT_DROP_FIELD: &str = "stamp_base64";

/// Outcome counters of [`jsons_to_csv`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonStats {
    pub files: usize,
    pub rows: usize,
    pub columns: usize,
}

/// Expand each input into JSON files.
///
/// A directory yields its `*.json` entries, an existing file itself, and
/// anything else is a name prefix matched as `<prefix>*.json`.
pub fn json_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
            continue;
        }
        let pattern = if input.is_dir() {
            input.join("*.json").to_string_lossy().into_owned()
        } else {
            format!("{}*.json", input.to_string_lossy())
        };
        let mut matched: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("Bad glob pattern {pattern}"))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        if matched.is_empty() {
            bail!("No JSON files match {pattern}");
        }
        matched.sort();
        files.extend(matched);
    }
    Ok(files)
}

/// Objects of one JSON file: a top-level array is flattened, and several
/// top-level values (JSON lines) are read in sequence.
pub fn read_objects(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut objects = Vec::new();
    for (n, value) in serde_json::Deserializer::from_reader(BufReader::new(file))
        .into_iter::<Value>()
        .enumerate()
    {
        let value = value.with_context(|| format!("{}: invalid JSON", path.display()))?;
        let values = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        for value in values {
            match value {
                Value::Object(object) => objects.push(object),
                other => bail!(
                    "{}: value {} is not an object: {other}",
                    path.display(),
                    n + 1
                ),
            }
        }
    }
    Ok(objects)
}

/// Concatenate the objects of `files` into `output`.
///
/// Columns are the union of keys in first-seen order; a missing key is an
/// empty cell. Nothing is written when the inputs hold no objects.
pub fn jsons_to_csv(files: &[PathBuf], output: &Path, drop_fields: &[String]) -> Result<JsonStats> {
    let mut stats = JsonStats::default();
    let mut columns: Vec<String> = Vec::new();
    let mut known = FxHashSet::default();
    let mut rows = Vec::new();
    for path in files {
        let mut objects = read_objects(path)?;
        for object in &mut objects {
            for field in drop_fields {
                object.shift_remove(field);
            }
            for key in object.keys() {
                if known.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }
        log::info!("{}: {} objects", path.display(), objects.len());
        stats.files += 1;
        stats.rows += objects.len();
        rows.extend(objects);
    }
    stats.columns = columns.len();

    if rows.is_empty() {
        log::warn!("No data to save to {}", output.display());
        return Ok(stats);
    }

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(&columns)?;
    for object in &rows {
        writer.write_record(columns.iter().map(|c| cell(object.get(c))))?;
    }
    writer.flush()?;
    Ok(stats)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn drop_default() -> Vec<String> {
        vec![DEFAULT_DROP_FIELD.to_string()]
    }

    #[test]
    fn arrays_and_lines_are_concatenated() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("fetchAllStamps_1.json");
        let b = dir.path().join("fetchAllStamps_2.json");
        fs::write(
            &a,
            r#"[{"stamp": 1, "creator": "bc1qa", "stamp_base64": "iVBOR"},
                {"stamp": 2, "creator": null, "locked": true}]"#,
        )
        .unwrap();
        fs::write(
            &b,
            "{\"stamp\": 3, \"creator\": \"bc1qc\", \"meta\": {\"k\": \"v\"}}\n\
             {\"stamp\": 4, \"creator\": \"a, b\"}\n",
        )
        .unwrap();
        let out = dir.path().join("allStamps.csv");

        let files = json_inputs(&[dir.path().join("fetchAllStamps")]).unwrap();
        assert_eq!(files, vec![a, b]);
        let stats = jsons_to_csv(&files, &out, &drop_default()).unwrap();
        assert_eq!(
            stats,
            JsonStats {
                files: 2,
                rows: 4,
                columns: 4
            }
        );
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "stamp,creator,locked,meta\n\
             1,bc1qa,,\n\
             2,,true,\n\
             3,bc1qc,,\"{\"\"k\"\":\"\"v\"\"}\"\n\
             4,\"a, b\",,\n"
        );
    }

    #[test]
    fn directory_input_takes_json_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.json"), "[]").unwrap();
        fs::write(dir.path().join("a.json"), "[]").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = json_inputs(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.json"), dir.path().join("b.json")]
        );
    }

    #[test]
    fn unmatched_prefix_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(json_inputs(&[dir.path().join("missing")]).is_err());
    }

    #[test]
    fn empty_inputs_write_nothing() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("empty.json");
        fs::write(&input, "[]").unwrap();
        let out = dir.path().join("out.csv");

        let stats = jsons_to_csv(&[input], &out, &drop_default()).unwrap();
        assert_eq!(stats.rows, 0);
        assert!(!out.exists());
    }

    #[test]
    fn non_object_value_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("numbers.json");
        fs::write(&input, "[1, 2]").unwrap();

        let err = read_objects(&input).unwrap_err().to_string();
        assert!(err.contains("not an object"), "{err}");
    }
}
