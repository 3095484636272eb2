//! Code → exchange-qualified identifier.
//!
//! The mapping is the prefix convention the quote providers use, not
//! authoritative listing metadata: `6xxxxx` and `5xxxxx` go to Shanghai,
//! everything else to Shenzhen. Beijing-exchange codes (`4xxxxx`,
//! `8xxxxx`) and Shanghai B-shares (`9xxxxx`) are therefore resolved to
//! Shenzhen; providers simply return no record for them.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::SecurityCode;

/// Listing exchange as understood by the quote providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    Shanghai,
    Shenzhen,
}

impl Exchange {
    /// Two-letter prefix used by Tencent and Sina (`sh600519`).
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Shanghai => "sh",
            Self::Shenzhen => "sz",
        }
    }

    /// Market id used in Eastmoney `secid`s (`1.600519`).
    pub const fn eastmoney_market(self) -> u8 {
        match self {
            Self::Shanghai => 1,
            Self::Shenzhen => 0,
        }
    }
}

/// A code together with the exchange marker providers require.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeQualifiedId {
    pub exchange: Exchange,
    pub code: SecurityCode,
}

impl ExchangeQualifiedId {
    /// `sh600519` / `sz000001`.
    pub fn prefixed(&self) -> String {
        format!("{}{}", self.exchange.prefix(), self.code)
    }

    /// `1.600519` / `0.000001`.
    pub fn secid(&self) -> String {
        format!("{}.{}", self.exchange.eastmoney_market(), self.code)
    }
}

impl Display for ExchangeQualifiedId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.exchange.prefix(), self.code)
    }
}

pub fn resolve(code: &SecurityCode) -> ExchangeQualifiedId {
    let exchange = match code.as_str().as_bytes().first() {
        Some(b'6') | Some(b'5') => Exchange::Shanghai,
        _ => Exchange::Shenzhen,
    };

    ExchangeQualifiedId {
        exchange,
        code: code.clone(),
    }
}
