//! Cache-first access to market data.
//!
//! Every read goes through [`DataAccess::fetch`]: a fresh cache record is
//! returned as is, anything else is fetched from the provider (with bounded
//! retry for transient failures) and written back. Stale records are never
//! served, even when the provider is down.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheKey, CachePayload, CacheStore, Category};
use crate::provider::{MarketDataProvider, ProviderError, StatementKind};
use crate::retry::RetryConfig;
use crate::{
    BalanceSheet, CashFlow, CompanyInfo, Dividend, Frequency, IncomeStatement, PriceSnapshot,
    Symbol, ValidationError,
};

/// How a fetch interacts with the on-disk cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Serve fresh records; fetch and store on a miss.
    #[default]
    Use,
    /// Always fetch, then store the result.
    Refresh,
    /// Always fetch; never read or write the cache.
    Bypass,
}

impl CacheMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Use => "use",
            Self::Refresh => "refresh",
            Self::Bypass => "bypass",
        }
    }

    const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

impl Display for CacheMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "use" => Ok(Self::Use),
            "refresh" => Ok(Self::Refresh),
            "bypass" => Ok(Self::Bypass),
            _ => Err(ValidationError::UnknownCacheMode {
                value: s.to_owned(),
            }),
        }
    }
}

pub struct DataAccess {
    provider: Arc<dyn MarketDataProvider>,
    cache: Arc<CacheStore>,
    mode: CacheMode,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

impl DataAccess {
    pub fn new(provider: Arc<dyn MarketDataProvider>, cache: Arc<CacheStore>) -> Self {
        Self {
            provider,
            cache,
            mode: CacheMode::Use,
            retry: RetryConfig::default(),
            attempt_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Upper bound on a single provider attempt; a timed-out attempt counts
    /// as a transient failure.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Return data of `category` for `symbol`.
    ///
    /// `frequency` only applies to statement categories and defaults to
    /// quarterly there; it is ignored for the others.
    pub async fn fetch(
        &self,
        category: Category,
        symbol: &Symbol,
        frequency: Option<Frequency>,
    ) -> Result<CachePayload, ProviderError> {
        let frequency = category
            .uses_frequency()
            .then(|| frequency.unwrap_or_default());
        let key = CacheKey::new(symbol.clone(), frequency);

        if self.mode.reads() {
            if let Some(payload) = self.cache.get(category, &key) {
                return Ok(payload);
            }
        }

        let attempted = self
            .retry
            .run(
                |_| self.call_provider(category, symbol, frequency),
                ProviderError::retryable,
            )
            .await;

        let payload = match attempted.result {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    %category,
                    %symbol,
                    attempts = attempted.attempts,
                    kind = %error.kind(),
                    %error,
                    "provider fetch failed"
                );
                return Err(error);
            }
        };
        debug!(%category, %symbol, attempts = attempted.attempts, "fetched from provider");

        if self.mode.writes() {
            if let Err(error) = self.cache.put(category, &key, payload.clone()) {
                warn!(%category, %symbol, %error, "failed to write cache record");
            }
        }
        Ok(payload)
    }

    async fn call_provider(
        &self,
        category: Category,
        symbol: &Symbol,
        frequency: Option<Frequency>,
    ) -> Result<CachePayload, ProviderError> {
        let provider = self.provider.as_ref();
        let call = async {
            if let Some(kind) = StatementKind::from_category(category) {
                return provider
                    .statements(symbol, kind, frequency.unwrap_or_default())
                    .await
                    .map(CachePayload::from);
            }
            match category {
                Category::CompanyInfo => provider
                    .company_info(symbol)
                    .await
                    .map(CachePayload::CompanyInfo),
                Category::Dividends => provider.dividends(symbol).await.map(CachePayload::Dividends),
                _ => provider.price(symbol).await.map(CachePayload::PriceData),
            }
        };

        match tokio::time::timeout(self.attempt_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::unavailable(format!(
                "{category} request for {symbol} timed out after {}ms",
                self.attempt_timeout.as_millis()
            ))),
        }
    }

    pub async fn company_info(&self, symbol: &Symbol) -> Result<CompanyInfo, ProviderError> {
        match self.fetch(Category::CompanyInfo, symbol, None).await? {
            CachePayload::CompanyInfo(info) => Ok(info),
            other => Err(unexpected(Category::CompanyInfo, &other)),
        }
    }

    pub async fn income_statements(
        &self,
        symbol: &Symbol,
        frequency: Frequency,
    ) -> Result<Vec<IncomeStatement>, ProviderError> {
        match self
            .fetch(Category::IncomeStatement, symbol, Some(frequency))
            .await?
        {
            CachePayload::IncomeStatement(rows) => Ok(rows),
            other => Err(unexpected(Category::IncomeStatement, &other)),
        }
    }

    pub async fn balance_sheets(
        &self,
        symbol: &Symbol,
        frequency: Frequency,
    ) -> Result<Vec<BalanceSheet>, ProviderError> {
        match self
            .fetch(Category::BalanceSheet, symbol, Some(frequency))
            .await?
        {
            CachePayload::BalanceSheet(rows) => Ok(rows),
            other => Err(unexpected(Category::BalanceSheet, &other)),
        }
    }

    pub async fn cash_flows(
        &self,
        symbol: &Symbol,
        frequency: Frequency,
    ) -> Result<Vec<CashFlow>, ProviderError> {
        match self.fetch(Category::CashFlow, symbol, Some(frequency)).await? {
            CachePayload::CashFlow(rows) => Ok(rows),
            other => Err(unexpected(Category::CashFlow, &other)),
        }
    }

    pub async fn dividends(&self, symbol: &Symbol) -> Result<Vec<Dividend>, ProviderError> {
        match self.fetch(Category::Dividends, symbol, None).await? {
            CachePayload::Dividends(rows) => Ok(rows),
            other => Err(unexpected(Category::Dividends, &other)),
        }
    }

    pub async fn price(&self, symbol: &Symbol) -> Result<PriceSnapshot, ProviderError> {
        match self.fetch(Category::PriceData, symbol, None).await? {
            CachePayload::PriceData(snapshot) => Ok(snapshot),
            other => Err(unexpected(Category::PriceData, &other)),
        }
    }
}

fn unexpected(expected: Category, payload: &CachePayload) -> ProviderError {
    ProviderError::invalid_data(format!(
        "expected {expected} data, got {}",
        payload.category()
    ))
}
