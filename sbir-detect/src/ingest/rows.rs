//! Input row reading
//!
//! Rows arrive as JSON Lines: one flat JSON object per line. Values are
//! normalized to strings so award and contract parsing see one shape
//! regardless of how the exporter typed a column.

use sbir_common::db::models::RawRecord;
use sbir_common::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

/// Read every row of a JSON Lines file
pub fn read_rows_jsonl(path: &Path) -> Result<Vec<RawRecord>> {
    let file = std::fs::File::open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open {}: {}", path.display(), e),
        ))
    })?;
    let rows = read_rows(std::io::BufReader::new(file))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Read input rows");
    Ok(rows)
}

/// Read JSON Lines rows from any buffered reader; blank lines are skipped
pub fn read_rows<R: BufRead>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_row(&line)
            .map_err(|e| Error::InvalidInput(format!("line {}: {}", idx + 1, e)))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Parse one JSON object into a string-valued record
///
/// Nulls are dropped; numbers and booleans are stringified; nested values
/// keep their JSON text.
pub fn parse_row(line: &str) -> Result<RawRecord> {
    let object: serde_json::Map<String, Value> = serde_json::from_str(line)?;
    let mut fields = BTreeMap::new();
    for (key, value) in object {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        };
        fields.insert(key, text);
    }
    Ok(RawRecord(fields))
}
