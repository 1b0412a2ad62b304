//! Per-ticker analysis built on cached provider data.
//!
//! | Analysis | Input | Output |
//! |----------|-------|--------|
//! | Price movement | Daily bars | Daily and 7/30/90-session changes, range, volume |
//! | Technical | Daily closes | MACD, RSI, moving averages, Bollinger bands, signal |
//! | Dividends | Dividend events | Yearly totals, trend, trailing year, consistency |
//!
//! Every input goes through [`DataAccess`], so an analysis reuses whatever the
//! screener or monitor already cached.

mod dividend;
mod price;
mod technical;

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::data_access::DataAccess;
use crate::provider::{ProviderError, ProviderErrorKind};
use crate::{CompanyInfo, RunStatus, Symbol, UtcDateTime};

pub use dividend::{dividend_history, DividendAnalysis, DividendTrend, YearlyDividends};
pub use price::{price_movement, PeriodChange, PriceMovement, MOVEMENT_WINDOWS};
pub use technical::{
    ema_series, sma, technical_indicators, BollingerBands, Macd, MovingAverages, Rsi, Signal,
    TechnicalIndicators, MIN_CLOSES,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAnalysis {
    pub symbol: Symbol,
    pub price: Decimal,
    pub currency: Option<String>,
    pub as_of: UtcDateTime,
    /// `None` when the provider returned fewer than two daily bars.
    pub movement: Option<PriceMovement>,
    /// `None` when there are too few closes for the indicators.
    pub technical: Option<TechnicalIndicators>,
}

/// A section of [`CompanyAnalysis`] that could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionFailure {
    pub section: &'static str,
    pub reason: ProviderErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyAnalysis {
    pub symbol: Symbol,
    pub status: RunStatus,
    pub company: Option<CompanyInfo>,
    pub price: Option<PriceAnalysis>,
    /// `None` when the section failed or the ticker pays no dividends.
    pub dividends: Option<DividendAnalysis>,
    pub failures: Vec<SectionFailure>,
}

pub struct Analyzer {
    access: Arc<DataAccess>,
}

impl Analyzer {
    pub fn new(access: Arc<DataAccess>) -> Self {
        Self { access }
    }

    pub async fn price_analysis(&self, symbol: &Symbol) -> Result<PriceAnalysis, ProviderError> {
        let snapshot = self.access.price(symbol).await?;
        let closes: Vec<f64> = snapshot.history.iter().map(|bar| bar.close).collect();
        let movement = price_movement(&snapshot.history);
        let technical = technical_indicators(&closes);
        debug!(
            %symbol,
            bars = snapshot.history.len(),
            technical = technical.is_some(),
            "price analysis complete"
        );

        Ok(PriceAnalysis {
            symbol: snapshot.symbol,
            price: snapshot.price,
            currency: snapshot.currency,
            as_of: snapshot.as_of,
            movement,
            technical,
        })
    }

    /// `Ok(None)` when the ticker has no dividend history.
    pub async fn dividend_analysis(
        &self,
        symbol: &Symbol,
        as_of: UtcDateTime,
    ) -> Result<Option<DividendAnalysis>, ProviderError> {
        let dividends = self.access.dividends(symbol).await?;
        debug!(%symbol, payments = dividends.len(), "dividend analysis");
        Ok(dividend_history(&dividends, as_of))
    }

    /// Run every section concurrently. A failed section is reported and the
    /// others still complete.
    pub async fn analyze(&self, symbol: &Symbol) -> CompanyAnalysis {
        let (company, price, dividends) = tokio::join!(
            self.access.company_info(symbol),
            self.price_analysis(symbol),
            self.dividend_analysis(symbol, UtcDateTime::now()),
        );

        let mut failures = Vec::new();
        let company = section("company", symbol, company, &mut failures);
        let price = section("price", symbol, price, &mut failures);
        let dividends = section("dividends", symbol, dividends, &mut failures).flatten();

        let unavailable = failures
            .iter()
            .filter(|failure| failure.reason == ProviderErrorKind::Unavailable)
            .count();
        let status = RunStatus::from_counts(SECTIONS, failures.len(), unavailable);
        info!(%symbol, status = status.as_str(), failed = failures.len(), "analysis complete");

        CompanyAnalysis {
            symbol: symbol.clone(),
            status,
            company,
            price,
            dividends,
            failures,
        }
    }
}

const SECTIONS: usize = 3;

fn section<T>(
    name: &'static str,
    symbol: &Symbol,
    result: Result<T, ProviderError>,
    failures: &mut Vec<SectionFailure>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(%symbol, section = name, %error, "analysis section failed");
            failures.push(SectionFailure {
                section: name,
                reason: error.kind(),
                message: error.message().to_owned(),
            });
            None
        }
    }
}
