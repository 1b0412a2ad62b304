//! Market-data provider contract and its implementations.
//!
//! | Provider | Use |
//! |----------|-----|
//! | [`YahooProvider`] | Live data over HTTP |
//! | [`FixtureProvider`] | Deterministic in-memory data for tests and `--mock` runs |

mod fixture;
mod yahoo;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::cache::{CachePayload, Category};
use crate::{BalanceSheet, CashFlow, CompanyInfo, Dividend, Frequency, IncomeStatement, PriceSnapshot, Symbol};

pub use fixture::{FixtureProvider, TickerFixture};
pub use yahoo::{YahooConfig, YahooProvider};

/// Failure class of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The provider has no data for the subject. Never retried.
    NotFound,
    /// Transient transport or upstream failure.
    Unavailable,
    /// The provider answered but the payload could not be used.
    InvalidData,
}

impl ProviderErrorKind {
    /// Reason code reported for exclusions and per-rule failures.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::InvalidData => "invalid_data",
        }
    }
}

impl Display for ProviderErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured provider error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
}

impl ProviderError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidData,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Only unavailability is worth another attempt.
    pub const fn retryable(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::Unavailable)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::NotFound => "provider.not_found",
            ProviderErrorKind::Unavailable => "provider.unavailable",
            ProviderErrorKind::InvalidData => "provider.invalid_data",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// Financial statement family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Income,
    Balance,
    CashFlow,
}

impl StatementKind {
    pub const fn category(self) -> Category {
        match self {
            Self::Income => Category::IncomeStatement,
            Self::Balance => Category::BalanceSheet,
            Self::CashFlow => Category::CashFlow,
        }
    }

    pub const fn from_category(category: Category) -> Option<Self> {
        match category {
            Category::IncomeStatement => Some(Self::Income),
            Category::BalanceSheet => Some(Self::Balance),
            Category::CashFlow => Some(Self::CashFlow),
            _ => None,
        }
    }
}

/// Statement rows of one family, in provider order.
#[derive(Debug, Clone, PartialEq)]
pub enum Statements {
    Income(Vec<IncomeStatement>),
    Balance(Vec<BalanceSheet>),
    CashFlow(Vec<CashFlow>),
}

impl Statements {
    pub const fn kind(&self) -> StatementKind {
        match self {
            Self::Income(_) => StatementKind::Income,
            Self::Balance(_) => StatementKind::Balance,
            Self::CashFlow(_) => StatementKind::CashFlow,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Income(rows) => rows.len(),
            Self::Balance(rows) => rows.len(),
            Self::CashFlow(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Statements> for CachePayload {
    fn from(statements: Statements) -> Self {
        match statements {
            Statements::Income(rows) => Self::IncomeStatement(rows),
            Statements::Balance(rows) => Self::BalanceSheet(rows),
            Statements::CashFlow(rows) => Self::CashFlow(rows),
        }
    }
}

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// External market-data source.
///
/// Every call fails with [`ProviderErrorKind::NotFound`] when the subject has
/// no data and [`ProviderErrorKind::Unavailable`] on transient failures.
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn company_info<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, CompanyInfo>;

    fn statements<'a>(
        &'a self,
        symbol: &'a Symbol,
        kind: StatementKind,
        frequency: Frequency,
    ) -> ProviderFuture<'a, Statements>;

    fn dividends<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, Vec<Dividend>>;

    fn price<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, PriceSnapshot>;
}
