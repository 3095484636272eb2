use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{ProviderId, SecurityCode, UtcDateTime, ValidationError};

/// Instrument class of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Stock,
    Etf,
}

impl InstrumentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Etf => "etf",
        }
    }
}

impl Display for InstrumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub code: SecurityCode,
    pub name: String,
    pub kind: InstrumentKind,
}

impl Symbol {
    pub fn new(code: SecurityCode, name: impl Into<String>, kind: InstrumentKind) -> Self {
        Self {
            code,
            name: name.into(),
            kind,
        }
    }
}

/// Normalized live quote for one security.
///
/// `change_abs` and `change_pct` are derived from `price` and `prev_close`.
/// Both are `None` when `prev_close` is zero; such a snapshot is partial but
/// still usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub code: SecurityCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub price: f64,
    pub prev_close: f64,
    pub open: f64,
    pub change_abs: Option<f64>,
    /// Percent units: `1.25` means +1.25%.
    pub change_pct: Option<f64>,
    pub fetched_at: UtcDateTime,
    pub source: ProviderId,
}

impl QuoteSnapshot {
    pub fn new(
        code: SecurityCode,
        name: Option<String>,
        price: f64,
        prev_close: f64,
        open: f64,
        source: ProviderId,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("price", price)?;
        validate_non_negative("prev_close", prev_close)?;
        validate_non_negative("open", open)?;

        let (change_abs, change_pct) = if prev_close == 0.0 {
            (None, None)
        } else {
            let change = price - prev_close;
            (Some(change), Some(change / prev_close * 100.0))
        };

        Ok(Self {
            code,
            name: name.filter(|value| !value.trim().is_empty()),
            price,
            prev_close,
            open,
            change_abs,
            change_pct,
            fetched_at: UtcDateTime::now(),
            source,
        })
    }

    pub fn with_fetched_at(mut self, fetched_at: UtcDateTime) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    pub fn is_partial(&self) -> bool {
        self.change_pct.is_none()
    }
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> SecurityCode {
        SecurityCode::parse("600519").expect("valid code")
    }

    #[test]
    fn derives_change_fields_from_prev_close() {
        let quote = QuoteSnapshot::new(code(), None, 110.0, 100.0, 101.0, ProviderId::Tencent)
            .expect("valid quote");

        assert_eq!(quote.change_abs, Some(10.0));
        let pct = quote.change_pct.expect("percentage present");
        assert!((pct - 10.0).abs() < 1e-9);
        assert!(!quote.is_partial());
    }

    #[test]
    fn zero_prev_close_yields_partial_snapshot() {
        let quote = QuoteSnapshot::new(code(), None, 12.0, 0.0, 0.0, ProviderId::Sina)
            .expect("partial quote is still valid");

        assert!(quote.is_partial());
        assert_eq!(quote.change_abs, None);
        assert_eq!(quote.price, 12.0);
    }

    #[test]
    fn rejects_non_finite_price() {
        let err = QuoteSnapshot::new(code(), None, f64::NAN, 1.0, 1.0, ProviderId::Tencent)
            .expect_err("must fail");
        assert!(matches!(err, ValidationError::NonFiniteValue { field: "price" }));
    }
}
