use std::io::{self, Write};

use ashare_core::Envelope;
use serde_json::{Map, Value};

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(
    envelope: &Envelope<Value>,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            writeln!(out, "{payload}")?;
        }
        OutputFormat::Table => render_table(&mut out, envelope)?,
    }

    Ok(())
}

fn render_table<W: Write>(out: &mut W, envelope: &Envelope<Value>) -> Result<(), CliError> {
    writeln!(out, "request_id  : {}", envelope.meta.request_id)?;
    writeln!(out, "generated_at: {}", envelope.meta.generated_at)?;
    writeln!(
        out,
        "sources     : {}",
        envelope
            .meta
            .source_chain
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    )?;
    writeln!(out, "latency_ms  : {}", envelope.meta.latency_ms)?;

    if !envelope.meta.warnings.is_empty() {
        writeln!(out, "warnings:")?;
        for warning in &envelope.meta.warnings {
            writeln!(out, "  - {warning}")?;
        }
    }

    match tabular_rows(&envelope.data) {
        Some((label, rows)) => {
            writeln!(out, "{label}:")?;
            for line in table_lines(rows) {
                writeln!(out, "  {line}")?;
            }
        }
        None => {
            writeln!(out, "data:")?;
            for line in serde_json::to_string_pretty(&envelope.data)?.lines() {
                writeln!(out, "  {line}")?;
            }
        }
    }

    if !envelope.errors.is_empty() {
        writeln!(out, "errors:")?;
        for error in &envelope.errors {
            writeln!(out, "  - {}: {}", error.code, error.message)?;
        }
    }

    Ok(())
}

/// First non-empty array-of-objects field of `data`, which is what each
/// command puts its rows in.
fn tabular_rows(data: &Value) -> Option<(&str, Vec<Map<String, Value>>)> {
    let object = data.as_object()?;
    object.iter().find_map(|(key, value)| {
        let items = value.as_array().filter(|items| !items.is_empty())?;
        let rows = items
            .iter()
            .map(|item| item.as_object().map(flatten))
            .collect::<Option<Vec<_>>>()?;
        Some((key.as_str(), rows))
    })
}

/// Nested objects become `parent.child` columns.
fn flatten(object: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(&mut flat, "", object);
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: &str, object: &Map<String, Value>) {
    for (key, value) in object {
        let column = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(flat, &column, inner),
            other => {
                flat.insert(column, other.clone());
            }
        }
    }
}

fn table_lines(rows: Vec<Map<String, Value>>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(column).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            cells
                .iter()
                .map(|row| display_width(&row[index]))
                .chain(std::iter::once(display_width(column)))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(cells.len() + 1);
    lines.push(pad_row(&columns, &widths));
    lines.extend(cells.iter().map(|row| pad_row(row, &widths)));
    lines
}

fn pad_row(values: &[String], widths: &[usize]) -> String {
    values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let padding = width.saturating_sub(display_width(value));
            format!("{value}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_owned()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// CJK characters take two terminal columns.
fn display_width(text: &str) -> usize {
    text.chars()
        .map(|ch| if (ch as u32) >= 0x1100 { 2 } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn picks_the_first_array_of_objects() {
        let data = json!({
            "catalog_size": 3,
            "results": [
                {"code": "600519", "name": "贵州茅台", "quote": {"price": 1700.0}},
                {"code": "000001", "name": "平安银行"}
            ]
        });

        let (label, rows) = tabular_rows(&data).expect("rows");
        assert_eq!(label, "results");
        assert_eq!(rows[0].get("quote.price"), Some(&json!(1700.0)));

        let nested = json!({"quotes": [{"quote": {"snapshot": {"price": 10.5}}}]});
        let (_, nested_rows) = tabular_rows(&nested).expect("rows");
        assert_eq!(nested_rows[0].get("quote.snapshot.price"), Some(&json!(10.5)));

        let lines = table_lines(rows);
        assert_eq!(lines[0], "code    name      quote.price");
        assert_eq!(lines[2], "000001  平安银行");
    }

    #[test]
    fn scalars_only_fall_back_to_json() {
        assert!(tabular_rows(&json!({"count": 1})).is_none());
        assert!(tabular_rows(&json!({"dates": ["2024-03-29"]})).is_none());
        assert!(tabular_rows(&json!({"failed": [], "rows": []})).is_none());
    }
}
