//! # Domain Models
//!
//! Validated value types shared by the cache, the screener and the monitor.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Normalized ticker |
//! | [`Frequency`] | Statement reporting frequency with alias parsing |
//! | [`UtcDateTime`] | UTC timestamp |
//! | [`CompanyInfo`] | Profile plus enterprise value |
//! | [`IncomeStatement`], [`BalanceSheet`], [`CashFlow`] | Statement periods |
//! | [`Dividend`] | Cash dividend event |
//! | [`PriceSnapshot`] | Latest price as an exact decimal |
//! | [`PriceBar`] | Daily OHLCV bar carried in a snapshot's history |

mod frequency;
mod models;
mod symbol;
mod timestamp;

pub use frequency::Frequency;
pub use models::{
    latest, BalanceSheet, CashFlow, CompanyInfo, Dividend, IncomeStatement, PriceBar,
    PriceSnapshot,
};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
