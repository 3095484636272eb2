//! # Domain Models
//!
//! Canonical domain types shared by the catalog, the quote feeds, the
//! snapshot cache and the CLI.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SecurityCode`] | Validated six-digit code |
//! | [`Symbol`] | Catalog entry (code, name, kind) |
//! | [`InstrumentKind`] | Stock or ETF |
//! | [`QuoteSnapshot`] | Normalized live quote |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Codes are validated at construction, so everything downstream of
//! [`SecurityCode`] can assume six ASCII digits.

mod code;
mod models;
mod timestamp;

pub use code::SecurityCode;
pub use models::{InstrumentKind, QuoteSnapshot, Symbol};
pub use timestamp::{shanghai_today, UtcDateTime};
