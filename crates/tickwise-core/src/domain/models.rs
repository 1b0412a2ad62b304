use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Symbol, UtcDateTime, ValidationError};

/// Company profile and valuation snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub symbol: Symbol,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub currency: Option<String>,
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
}

impl CompanyInfo {
    pub fn new(symbol: Symbol, name: Option<String>) -> Self {
        Self {
            symbol,
            name,
            sector: None,
            industry: None,
            currency: None,
            market_cap: None,
            enterprise_value: None,
        }
    }

    pub fn with_enterprise_value(mut self, enterprise_value: Option<f64>) -> Self {
        self.enterprise_value = enterprise_value;
        self
    }

    pub fn with_market_cap(mut self, market_cap: Option<f64>) -> Self {
        self.market_cap = market_cap;
        self
    }
}

/// One reporting period of an income statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub period_end: UtcDateTime,
    pub total_revenue: Option<f64>,
    pub ebit: Option<f64>,
    pub net_income: Option<f64>,
}

/// One reporting period of a balance sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub period_end: UtcDateTime,
    pub total_assets: Option<f64>,
    pub total_debt: Option<f64>,
    pub stockholders_equity: Option<f64>,
    pub cash_and_equivalents: Option<f64>,
    pub invested_capital: Option<f64>,
}

/// One reporting period of a cash-flow statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub period_end: UtcDateTime,
    pub operating_cash_flow: Option<f64>,
    pub capital_expenditure: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

/// Cash dividend paid per share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    pub ex_date: UtcDateTime,
    pub amount: f64,
}

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: UtcDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<u64>,
}

impl PriceBar {
    pub fn close_only(date: UtcDateTime, close: f64) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        }
    }
}

/// Latest traded price for a ticker, plus the trailing year of daily bars
/// when the provider returns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: Symbol,
    pub price: Decimal,
    pub currency: Option<String>,
    pub as_of: UtcDateTime,
    /// Oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<PriceBar>,
}

impl PriceSnapshot {
    pub fn new(symbol: Symbol, price: Decimal, as_of: UtcDateTime) -> Self {
        Self {
            symbol,
            price,
            currency: None,
            as_of,
            history: Vec::new(),
        }
    }

    /// Attach daily bars, sorted oldest first.
    pub fn with_history(mut self, mut history: Vec<PriceBar>) -> Self {
        history.sort_by_key(|bar| bar.date);
        self.history = history;
        self
    }

    /// Build a snapshot from a provider float using its shortest round-trip
    /// representation, so `187.5` becomes exactly `187.5` rather than the
    /// nearest binary fraction.
    pub fn from_f64(symbol: Symbol, price: f64, as_of: UtcDateTime) -> Result<Self, ValidationError> {
        if !price.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "price" });
        }
        let price = price
            .to_string()
            .parse::<Decimal>()
            .map_err(|_| ValidationError::NonFiniteValue { field: "price" })?;
        Ok(Self::new(symbol, price, as_of))
    }
}

/// Row with the most recent period end, regardless of provider ordering.
pub fn latest<T, F>(rows: &[T], period_end: F) -> Option<&T>
where
    F: Fn(&T) -> UtcDateTime,
{
    rows.iter().max_by_key(|row| period_end(row))
}
