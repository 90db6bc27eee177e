//! Key extraction
//!
//! Turns a raw record line into the index key according to a configured
//! format descriptor. Extraction is pure and stateless per record.

use serde_json::Value;

use crate::error::Result;
use crate::GzipiError;

/// Describes how the index key is located inside a record line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFormat {
    /// Parse the line as a JSON object and take the string value at `field`
    Json { field: String },

    /// Split the line on `delimiter` (no quoting) and take column `column`
    Csv { column: usize, delimiter: u8 },

    /// The whole line (minus terminator) is the key
    Raw,
}

impl RecordFormat {
    /// Extract the key bytes from a record line.
    ///
    /// A trailing newline on `line` is ignored. Fails with
    /// [`GzipiError::Format`] when the line does not match the descriptor or
    /// when the key contains TAB or newline (either would corrupt the
    /// line-oriented index).
    pub fn extract_key(&self, line: &[u8]) -> Result<Vec<u8>> {
        let line = strip_terminator(line);
        let key = match self {
            RecordFormat::Json { field } => {
                let value: Value = serde_json::from_slice(line)
                    .map_err(|e| GzipiError::Format(format!("invalid JSON record: {}", e)))?;
                match value.get(field.as_str()) {
                    Some(Value::String(s)) => s.as_bytes().to_vec(),
                    Some(_) => {
                        return Err(GzipiError::Format(format!(
                            "JSON field {:?} is not a string",
                            field
                        )))
                    }
                    None => {
                        return Err(GzipiError::Format(format!(
                            "JSON field {:?} is missing",
                            field
                        )))
                    }
                }
            }
            RecordFormat::Csv { column, delimiter } => line
                .split(|&b| b == *delimiter)
                .nth(*column)
                .map(|col| col.to_vec())
                .ok_or_else(|| {
                    GzipiError::Format(format!("CSV record has no column {}", column))
                })?,
            RecordFormat::Raw => line.to_vec(),
        };

        if key.iter().any(|&b| b == b'\t' || b == b'\n') {
            return Err(GzipiError::Format(
                "key contains TAB or newline".to_string(),
            ));
        }
        Ok(key)
    }
}

/// Strip a single trailing newline from a record line
pub(crate) fn strip_terminator(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\n') => &line[..line.len() - 1],
        _ => line,
    }
}
