//! CSV export of query results.
//!
//! Files are UTF-8 with a byte-order mark so spreadsheet tools pick the
//! right encoding for Chinese names.

use std::io::{Read, Write};

use serde::Serialize;

use crate::cache::CachedQuote;
use crate::error::CoreError;
use crate::{SecurityCode, Symbol};

pub const BOM: &[u8] = b"\xEF\xBB\xBF";

pub const HEADER: [&str; 9] = [
    "code",
    "name",
    "price",
    "prev_close",
    "open",
    "change_abs",
    "change_pct",
    "fetched_at",
    "freshness",
];

/// A catalog match, optionally overlaid with its live quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotedSymbol {
    #[serde(flatten)]
    pub symbol: Symbol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<CachedQuote>,
}

impl QuotedSymbol {
    pub fn bare(symbol: Symbol) -> Self {
        Self {
            symbol,
            quote: None,
        }
    }
}

impl From<Symbol> for QuotedSymbol {
    fn from(symbol: Symbol) -> Self {
        Self::bare(symbol)
    }
}

pub fn write_csv<W: Write>(mut writer: W, rows: &[QuotedSymbol]) -> Result<(), CoreError> {
    writer.write_all(BOM)?;

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(HEADER)?;
    for row in rows {
        csv_writer.write_record(record(row))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn to_csv_bytes(rows: &[QuotedSymbol]) -> Result<Vec<u8>, CoreError> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, rows)?;
    Ok(buffer)
}

/// Reads back the `(code, name)` pairs of an exported file.
pub fn read_pairs<R: Read>(reader: R) -> Result<Vec<(SecurityCode, String)>, CoreError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').trim().to_owned())
        .collect();
    let code_index = header_index(&headers, "code")?;
    let name_index = header_index(&headers, "name")?;

    let mut pairs = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let code = SecurityCode::normalize(record.get(code_index).unwrap_or_default())?;
        let name = record.get(name_index).unwrap_or_default().to_owned();
        pairs.push((code, name));
    }
    Ok(pairs)
}

fn header_index(headers: &[String], column: &str) -> Result<usize, CoreError> {
    headers
        .iter()
        .position(|header| header == column)
        .ok_or_else(|| CoreError::MissingColumn {
            column: column.to_owned(),
        })
}

fn record(row: &QuotedSymbol) -> Vec<String> {
    let mut fields = vec![row.symbol.code.to_string(), row.symbol.name.clone()];

    match &row.quote {
        Some(quote) => {
            let snapshot = &quote.snapshot;
            fields.extend([
                snapshot.price.to_string(),
                snapshot.prev_close.to_string(),
                snapshot.open.to_string(),
                optional(snapshot.change_abs),
                optional(snapshot.change_pct),
                snapshot.fetched_at.format_rfc3339(),
                quote.freshness.as_str().to_owned(),
            ]);
        }
        None => fields.extend(std::iter::repeat(String::new()).take(HEADER.len() - 2)),
    }

    fields
}

fn optional(value: Option<f64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Freshness;
    use crate::{InstrumentKind, ProviderId, QuoteSnapshot};

    fn symbol(code: &str, name: &str) -> Symbol {
        Symbol::new(
            SecurityCode::parse(code).expect("valid code"),
            name,
            InstrumentKind::Stock,
        )
    }

    #[test]
    fn starts_with_bom_and_header() {
        let bytes = to_csv_bytes(&[]).expect("export works");

        assert!(bytes.starts_with(BOM));
        let text = String::from_utf8(bytes[BOM.len()..].to_vec()).expect("utf-8");
        assert_eq!(
            text.trim_end(),
            "code,name,price,prev_close,open,change_abs,change_pct,fetched_at,freshness"
        );
    }

    #[test]
    fn rows_without_quotes_leave_quote_columns_empty() {
        let bytes = to_csv_bytes(&[QuotedSymbol::bare(symbol("000001", "平安银行"))])
            .expect("export works");
        let text = String::from_utf8(bytes).expect("utf-8");

        assert!(text.lines().any(|line| line == "000001,平安银行,,,,,,,"));
    }

    #[test]
    fn quoted_rows_carry_price_and_freshness() {
        let snapshot = QuoteSnapshot::new(
            SecurityCode::parse("600519").expect("valid code"),
            Some(String::from("贵州茅台")),
            1700.0,
            1680.0,
            1690.5,
            ProviderId::Tencent,
        )
        .expect("valid snapshot");
        let row = QuotedSymbol {
            symbol: symbol("600519", "贵州茅台"),
            quote: Some(CachedQuote {
                snapshot,
                freshness: Freshness::Stale,
            }),
        };

        let text = String::from_utf8(to_csv_bytes(&[row]).expect("export works")).expect("utf-8");
        let line = text.lines().nth(1).expect("data line");

        assert!(line.starts_with("600519,贵州茅台,1700,1680,1690.5,20,"));
        assert!(line.ends_with(",stale"));
    }

    #[test]
    fn read_pairs_requires_code_column() {
        let error = read_pairs("name\n平安银行\n".as_bytes()).expect_err("must fail");
        assert!(matches!(error, CoreError::MissingColumn { column } if column == "code"));
    }
}
