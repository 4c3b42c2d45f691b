use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// One master row: the identifier plus the metadata columns copied verbatim
/// into every record of that identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterRow {
    pub identifier: String,
    pub metadata: Map<String, Value>,
}

/// Ordered external metadata keyed by identifier.
#[derive(Debug, Default, Clone)]
pub struct MasterTable {
    rows: Vec<MasterRow>,
    index: HashMap<String, usize>,
}

/// First continuous digit run of a cell, e.g. `"PIA-00412 (v2)"` → `"00412"`.
pub fn normalize_id(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(u), _) => u.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.is_finite() => format!("{}", f as i64),
            _ => n.to_string(),
        },
        _ => return None,
    };
    DIGITS_RE.find(&text).map(|m| m.as_str().to_string())
}

impl MasterTable {
    /// Parse a JSON array of objects. `id_column` names the identifier
    /// column; without it the first column of each row is used.
    pub fn from_json(text: &str, id_column: Option<&str>) -> Result<Self> {
        let parsed: Value = serde_json::from_str(text).context("master file is not valid JSON")?;
        let Value::Array(items) = parsed else {
            bail!("master file must be a JSON array of objects");
        };

        let mut rows = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let Value::Object(metadata) = item else {
                bail!("master row {} is not an object", idx + 1);
            };
            let cell = match id_column {
                Some(col) => metadata.get(col),
                None => metadata.values().next(),
            };
            match cell.and_then(normalize_id) {
                Some(identifier) => rows.push(MasterRow {
                    identifier,
                    metadata,
                }),
                None => warn!(row = idx + 1, "Master row has no identifier, skipped"),
            }
        }

        Ok(Self::from_rows(rows))
    }

    /// Duplicate identifiers keep the first row.
    pub fn from_rows(rows: Vec<MasterRow>) -> Self {
        let mut table = MasterTable::default();
        for row in rows {
            if table.index.contains_key(&row.identifier) {
                warn!(identifier = %row.identifier, "Duplicate master identifier, keeping first row");
                continue;
            }
            table.index.insert(row.identifier.clone(), table.rows.len());
            table.rows.push(row);
        }
        table
    }

    pub fn rows(&self) -> &[MasterRow] {
        &self.rows
    }

    pub fn get(&self, identifier: &str) -> Option<&MasterRow> {
        self.index.get(identifier).map(|&idx| &self.rows[idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_id_takes_first_digit_run() {
        assert_eq!(normalize_id(&json!("PIA-00412 (v2)")).as_deref(), Some("00412"));
        assert_eq!(normalize_id(&json!(12345)).as_deref(), Some("12345"));
        assert_eq!(normalize_id(&json!(12345.0)).as_deref(), Some("12345"));
        assert_eq!(normalize_id(&json!("none")), None);
        assert_eq!(normalize_id(&json!(null)), None);
    }

    #[test]
    fn from_json_keeps_column_order() {
        let text = r#"[
            {"Request ID": "REQ 101", "Title": "Ad platform", "Owner": "Ana"},
            {"Request ID": 102, "Title": "Beacons"}
        ]"#;
        let table = MasterTable::from_json(text, None).unwrap();
        assert_eq!(table.len(), 2);

        let row = table.get("101").unwrap();
        let columns: Vec<&str> = row.metadata.keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["Request ID", "Title", "Owner"]);
        assert_eq!(table.rows()[1].identifier, "102");
    }

    #[test]
    fn from_json_named_column_and_duplicates() {
        let text = r##"[
            {"Title": "First", "Id": "7"},
            {"Title": "No id", "Id": "n/a"},
            {"Title": "Second", "Id": "#7"}
        ]"##;
        let table = MasterTable::from_json(text, Some("Id")).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("7").unwrap().metadata["Title"], json!("First"));
    }

    #[test]
    fn from_json_rejects_non_array() {
        assert!(MasterTable::from_json(r#"{"Id": 1}"#, None).is_err());
        assert!(MasterTable::from_json(r#"[1, 2]"#, None).is_err());
    }
}
