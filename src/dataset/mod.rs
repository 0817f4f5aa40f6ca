//! Dataset loading and description.
//!
//! The records file is a JSON array of `{"id": .., "data": {..}}` objects.
//! The `data` block is flattened into columns and the top-level `id` kept as
//! its own column. The summary feeds prompt construction only; generated
//! scripts re-load the file themselves through the `dataset_io` helper.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct ColumnStats {
    pub count: usize,
    pub nulls: usize,
    pub unique: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Most frequent value, for non-numeric columns.
    pub top: Option<(String, usize)>,
}

#[derive(Debug, Clone)]
pub struct ColumnSummary {
    pub dtype: String,
    pub stats: ColumnStats,
}

/// Per-column types and descriptive statistics, renderable as prompt text.
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: BTreeMap<String, ColumnSummary>,
}

/// Load the records file and describe its columns.
pub fn summarize_file(path: &Path) -> Result<DatasetSummary> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset '{}'", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("dataset '{}' is not valid JSON", path.display()))?;
    let items = value
        .as_array()
        .with_context(|| format!("dataset '{}' must be a JSON array", path.display()))?;

    let mut records: Vec<BTreeMap<String, Value>> = Vec::new();
    for item in items {
        let Some(obj) = item.as_object() else { continue };
        let mut base = BTreeMap::new();
        if let Some(id) = obj.get("id") {
            base.insert("id".to_string(), id.clone());
        }
        if let Some(Value::Object(data)) = obj.get("data") {
            for (k, v) in data {
                base.insert(k.clone(), v.clone());
            }
        }
        if !base.is_empty() {
            records.push(base);
        }
    }

    Ok(summarize_records(&records))
}

fn summarize_records(records: &[BTreeMap<String, Value>]) -> DatasetSummary {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for record in records {
        names.extend(record.keys().map(|k| k.as_str()));
    }

    let mut columns = BTreeMap::new();
    for name in names {
        let values: Vec<Option<&Value>> = records.iter().map(|r| r.get(name)).collect();
        columns.insert(name.to_string(), summarize_column(&values));
    }

    DatasetSummary { rows: records.len(), columns }
}

fn summarize_column(values: &[Option<&Value>]) -> ColumnSummary {
    let mut stats = ColumnStats::default();
    let mut numbers: Vec<f64> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut freq: HashMap<String, usize> = HashMap::new();
    let mut kinds: BTreeSet<&'static str> = BTreeSet::new();

    for value in values {
        match value {
            None | Some(Value::Null) => stats.nulls += 1,
            Some(v) => {
                stats.count += 1;
                let rendered = render_value(v);
                seen.insert(rendered.clone());
                *freq.entry(rendered).or_insert(0) += 1;
                match v {
                    Value::Bool(_) => {
                        kinds.insert("bool");
                    }
                    Value::Number(n) => {
                        if let Some(f) = n.as_f64() {
                            numbers.push(f);
                        }
                        kinds.insert(if n.is_i64() || n.is_u64() { "int" } else { "float" });
                    }
                    Value::String(_) => {
                        kinds.insert("str");
                    }
                    _ => {
                        kinds.insert("object");
                    }
                }
            }
        }
    }

    stats.unique = seen.len();
    if !numbers.is_empty() {
        stats.min = numbers.iter().copied().reduce(f64::min);
        stats.max = numbers.iter().copied().reduce(f64::max);
        stats.mean = Some(numbers.iter().sum::<f64>() / numbers.len() as f64);
    }
    stats.top = freq
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(v, n)| (v, n));

    ColumnSummary { dtype: dtype_name(&kinds), stats }
}

fn dtype_name(kinds: &BTreeSet<&'static str>) -> String {
    let name = match kinds.len() {
        0 => "empty",
        1 => match kinds.iter().next().copied().unwrap_or("object") {
            "int" => "int64",
            "float" => "float64",
            "bool" => "bool",
            "str" => "object",
            other => other,
        },
        2 if kinds.contains("int") && kinds.contains("float") => "float64",
        _ => "mixed",
    };
    name.to_string()
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl DatasetSummary {
    /// Column → dtype listing, one line per column.
    pub fn render_types(&self) -> String {
        let mut out = String::new();
        for (name, col) in &self.columns {
            let _ = writeln!(out, "{}: {}", name, col.dtype);
        }
        out
    }

    /// Descriptive statistics, one line per column.
    pub fn render_stats(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "rows: {}", self.rows);
        for (name, col) in &self.columns {
            let s = &col.stats;
            let _ = write!(
                out,
                "{}: count={} nulls={} unique={}",
                name, s.count, s.nulls, s.unique
            );
            if let (Some(min), Some(max), Some(mean)) = (s.min, s.max, s.mean) {
                let _ = write!(out, " min={} max={} mean={:.2}", min, max, mean);
            } else if let Some((top, n)) = &s.top {
                let _ = write!(out, " top={:?} freq={}", clip(top, 40), n);
            }
            out.push('\n');
        }
        out
    }
}

fn clip(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn summary_of(json: &str) -> DatasetSummary {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        summarize_file(file.path()).unwrap()
    }

    #[test]
    fn test_records_flattened_with_id() {
        let summary = summary_of(
            r#"[
                {"id": 1, "data": {"salary": 100, "city": "Berlin"}},
                {"id": 2, "data": {"salary": 140, "city": "Berlin"}},
                {"id": 3, "data": {"salary": null, "city": "Hamburg"}}
            ]"#,
        );
        assert_eq!(summary.rows, 3);
        assert_eq!(
            summary.columns.keys().cloned().collect::<Vec<_>>(),
            vec!["city", "id", "salary"]
        );
    }

    #[test]
    fn test_numeric_column_stats() {
        let summary = summary_of(
            r#"[
                {"id": 1, "data": {"salary": 100}},
                {"id": 2, "data": {"salary": 140}},
                {"id": 3, "data": {"salary": null}}
            ]"#,
        );
        let salary = &summary.columns["salary"];
        assert_eq!(salary.dtype, "int64");
        assert_eq!(salary.stats.count, 2);
        assert_eq!(salary.stats.nulls, 1);
        assert_eq!(salary.stats.min, Some(100.0));
        assert_eq!(salary.stats.max, Some(140.0));
        assert_eq!(salary.stats.mean, Some(120.0));
    }

    #[test]
    fn test_string_column_top_value() {
        let summary = summary_of(
            r#"[
                {"id": 1, "data": {"city": "Berlin"}},
                {"id": 2, "data": {"city": "Berlin"}},
                {"id": 3, "data": {"city": "Hamburg"}}
            ]"#,
        );
        let city = &summary.columns["city"];
        assert_eq!(city.dtype, "object");
        assert_eq!(city.stats.unique, 2);
        assert_eq!(city.stats.top, Some(("Berlin".to_string(), 2)));
    }

    #[test]
    fn test_mixed_int_float_is_float() {
        let summary = summary_of(
            r#"[
                {"id": 1, "data": {"score": 1}},
                {"id": 2, "data": {"score": 1.5}}
            ]"#,
        );
        assert_eq!(summary.columns["score"].dtype, "float64");
    }

    #[test]
    fn test_render_is_plain_text() {
        let summary = summary_of(r#"[{"id": 1, "data": {"salary": 100}}]"#);
        let types = summary.render_types();
        assert!(types.contains("salary: int64"), "types: {}", types);
        let stats = summary.render_stats();
        assert!(stats.starts_with("rows: 1"), "stats: {}", stats);
        assert!(stats.contains("salary: count=1"), "stats: {}", stats);
    }
}
