use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::Duration;

use super::Category;
use crate::{
    BalanceSheet, CashFlow, CompanyInfo, Dividend, Frequency, IncomeStatement, PriceSnapshot,
    Symbol, UtcDateTime,
};

/// Subject of a cache record: a ticker, qualified by frequency for statements.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub symbol: Symbol,
    pub frequency: Option<Frequency>,
}

impl CacheKey {
    pub fn new(symbol: Symbol, frequency: Option<Frequency>) -> Self {
        Self { symbol, frequency }
    }

    pub fn ticker(symbol: Symbol) -> Self {
        Self::new(symbol, None)
    }

    /// File stem under the category directory: `AAPL` or `AAPL@quarterly`.
    pub fn file_stem(&self) -> String {
        match self.frequency {
            Some(frequency) => format!("{}@{}", self.symbol, frequency.as_str()),
            None => self.symbol.as_str().to_owned(),
        }
    }

    /// Inverse of [`CacheKey::file_stem`]; `None` for names this store did not write.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let (ticker, frequency) = match stem.split_once('@') {
            Some((ticker, frequency)) => (ticker, Some(Frequency::parse(frequency).ok()?)),
            None => (stem, None),
        };
        let symbol = Symbol::parse(ticker).ok()?;
        (symbol.as_str() == ticker).then(|| Self::new(symbol, frequency))
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_stem())
    }
}

/// Typed cache payload; the variant always matches the record's category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "data", rename_all = "snake_case")]
pub enum CachePayload {
    CompanyInfo(CompanyInfo),
    IncomeStatement(Vec<IncomeStatement>),
    BalanceSheet(Vec<BalanceSheet>),
    CashFlow(Vec<CashFlow>),
    Dividends(Vec<Dividend>),
    PriceData(PriceSnapshot),
}

impl CachePayload {
    pub const fn category(&self) -> Category {
        match self {
            Self::CompanyInfo(_) => Category::CompanyInfo,
            Self::IncomeStatement(_) => Category::IncomeStatement,
            Self::BalanceSheet(_) => Category::BalanceSheet,
            Self::CashFlow(_) => Category::CashFlow,
            Self::Dividends(_) => Category::Dividends,
            Self::PriceData(_) => Category::PriceData,
        }
    }
}

/// On-disk record. Written whole and replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub category: Category,
    pub key: CacheKey,
    pub fetched_at: UtcDateTime,
    /// Category TTL in force when the record was written.
    pub ttl_hours: u32,
    pub payload: CachePayload,
}

impl CacheRecord {
    pub fn expires_at(&self) -> UtcDateTime {
        self.fetched_at.plus_hours(self.ttl_hours)
    }

    /// Valid iff `now - fetched_at < ttl`.
    pub fn is_fresh_at(&self, now: UtcDateTime) -> bool {
        is_fresh(self.fetched_at, self.ttl_hours, now)
    }
}

pub(crate) fn is_fresh(fetched_at: UtcDateTime, ttl_hours: u32, now: UtcDateTime) -> bool {
    now.since(fetched_at) < Duration::hours(i64::from(ttl_hours))
}

/// Metadata kept for every record so status queries never read payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IndexEntry {
    pub(crate) category: Category,
    pub(crate) key: CacheKey,
    pub(crate) fetched_at: UtcDateTime,
    pub(crate) ttl_hours: u32,
    pub(crate) size_bytes: u64,
}

impl IndexEntry {
    pub(crate) fn index_key(category: Category, key: &CacheKey) -> String {
        format!("{}/{}", category.as_str(), key.file_stem())
    }

    pub(crate) fn is_fresh_at(&self, now: UtcDateTime) -> bool {
        is_fresh(self.fetched_at, self.ttl_hours, now)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CacheIndex {
    pub(crate) entries: BTreeMap<String, IndexEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_round_trips_frequency_qualifier() {
        let key = CacheKey::new(
            Symbol::parse("BRK.B").expect("valid"),
            Some(Frequency::Yearly),
        );
        assert_eq!(key.file_stem(), "BRK.B@yearly");
        assert_eq!(CacheKey::from_file_stem("BRK.B@yearly"), Some(key));
    }

    #[test]
    fn foreign_file_stems_are_ignored() {
        assert_eq!(CacheKey::from_file_stem("aapl"), None);
        assert_eq!(CacheKey::from_file_stem("AAPL@weekly"), None);
        assert_eq!(CacheKey::from_file_stem(".tmpX1b2"), None);
    }

    #[test]
    fn freshness_boundary_is_exclusive() {
        let fetched_at = UtcDateTime::parse("2024-05-01T12:00:00Z").expect("valid");
        let record = CacheRecord {
            category: Category::PriceData,
            key: CacheKey::ticker(Symbol::parse("AAPL").expect("valid")),
            fetched_at,
            ttl_hours: 1,
            payload: CachePayload::PriceData(PriceSnapshot::new(
                Symbol::parse("AAPL").expect("valid"),
                rust_decimal::Decimal::ONE_HUNDRED,
                fetched_at,
            )),
        };

        assert!(record.is_fresh_at(fetched_at));
        assert!(!record.is_fresh_at(fetched_at.plus_hours(1)));
        assert_eq!(record.expires_at(), fetched_at.plus_hours(1));
    }
}
