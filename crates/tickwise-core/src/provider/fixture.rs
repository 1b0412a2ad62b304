use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use time::macros::date;

use super::{MarketDataProvider, ProviderError, ProviderFuture, StatementKind, Statements};
use crate::cache::Category;
use crate::{
    BalanceSheet, CashFlow, CompanyInfo, Dividend, Frequency, IncomeStatement, PriceBar,
    PriceSnapshot, Symbol, UtcDateTime,
};

/// Canned data for one ticker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickerFixture {
    pub company_info: Option<CompanyInfo>,
    pub income: BTreeMap<Frequency, Vec<IncomeStatement>>,
    pub balance: BTreeMap<Frequency, Vec<BalanceSheet>>,
    pub cash_flow: BTreeMap<Frequency, Vec<CashFlow>>,
    pub dividends: Vec<Dividend>,
    pub price: Option<Decimal>,
    /// Daily closes, oldest first. The newest is dated at the quote time.
    pub closes: Vec<f64>,
}

impl TickerFixture {
    /// Company info, income statement and balance sheet carrying exactly the
    /// inputs of the magic formula, at both frequencies.
    pub fn fundamentals(
        symbol: &Symbol,
        name: &str,
        enterprise_value: Option<f64>,
        ebit: Option<f64>,
        invested_capital: Option<f64>,
    ) -> Self {
        let company_info = CompanyInfo::new(symbol.clone(), Some(name.to_owned()))
            .with_enterprise_value(enterprise_value);

        let mut fixture = Self {
            company_info: Some(company_info),
            ..Self::default()
        };
        for frequency in Frequency::ALL {
            let period_end = fixture_period_end(frequency);
            fixture.income.insert(
                frequency,
                vec![IncomeStatement {
                    period_end,
                    total_revenue: ebit.map(|ebit| ebit * 4.0),
                    ebit,
                    net_income: ebit.map(|ebit| ebit * 0.8),
                }],
            );
            fixture.balance.insert(
                frequency,
                vec![BalanceSheet {
                    period_end,
                    total_assets: invested_capital.map(|capital| capital * 2.0),
                    total_debt: None,
                    stockholders_equity: None,
                    cash_and_equivalents: None,
                    invested_capital,
                }],
            );
        }
        fixture
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_dividends(mut self, dividends: Vec<Dividend>) -> Self {
        self.dividends = dividends;
        self
    }

    pub fn with_closes(mut self, closes: Vec<f64>) -> Self {
        self.closes = closes;
        self
    }

    /// Deterministic year of closes, six years of quarterly dividends.
    fn with_market_history(self, seed: u64) -> Self {
        let last = self.price.and_then(|price| price.to_f64()).unwrap_or(100.0);
        self.with_closes(trending_closes(seed, last))
            .with_dividends(quarterly_dividends(seed))
    }

    /// Plausible, stable figures derived from the ticker text.
    pub fn synthesized(symbol: &Symbol) -> Self {
        let seed = symbol_seed(symbol);
        let enterprise_value = 50e9 + (seed % 900) as f64 * 1e9;
        let ebit = enterprise_value * (0.02 + (seed % 60) as f64 / 1_000.0);
        let invested_capital = ebit / (0.10 + (seed % 150) as f64 / 100.0);

        let mut fixture = Self::fundamentals(
            symbol,
            &format!("{symbol} Holdings"),
            Some(enterprise_value),
            Some(ebit),
            Some(invested_capital),
        )
        .with_price(Decimal::new(500 + (seed % 4_000) as i64, 1))
        .with_market_history(seed);

        for frequency in Frequency::ALL {
            fixture.cash_flow.insert(
                frequency,
                vec![CashFlow {
                    period_end: fixture_period_end(frequency),
                    operating_cash_flow: Some(ebit * 1.1),
                    capital_expenditure: Some(-ebit * 0.2),
                    free_cash_flow: Some(ebit * 0.9),
                }],
            );
        }
        fixture
    }
}

#[derive(Debug, Clone)]
struct FailurePlan {
    error: ProviderError,
    /// `None` fails every call.
    remaining: Option<u32>,
}

/// In-memory provider with failure injection and call accounting.
#[derive(Debug, Default)]
pub struct FixtureProvider {
    tickers: BTreeMap<Symbol, TickerFixture>,
    synthesize_unknown: bool,
    latency: Duration,
    failures: Mutex<BTreeMap<Symbol, FailurePlan>>,
    calls: Mutex<Vec<(Category, Symbol)>>,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider used by offline runs: a few well-known tickers plus
    /// synthesized data for any other valid symbol.
    pub fn demo() -> Self {
        let mut provider = Self {
            synthesize_unknown: true,
            ..Self::default()
        };
        for (ticker, name, ev, ebit, capital, price) in DEMO_TICKERS {
            if let Ok(symbol) = Symbol::parse(ticker) {
                let fixture =
                    TickerFixture::fundamentals(&symbol, name, Some(ev), Some(ebit), Some(capital))
                        .with_price(Decimal::new(price, 2))
                        .with_market_history(symbol_seed(&symbol));
                provider.tickers.insert(symbol, fixture);
            }
        }
        provider
    }

    pub fn with_ticker(mut self, symbol: Symbol, fixture: TickerFixture) -> Self {
        self.tickers.insert(symbol, fixture);
        self
    }

    /// Every call for `symbol` fails with `error`.
    pub fn fail_always(self, symbol: Symbol, error: ProviderError) -> Self {
        self.plan_failure(symbol, error, None)
    }

    /// The next `times` calls for `symbol` fail with `error`, later calls succeed.
    pub fn fail_times(self, symbol: Symbol, times: u32, error: ProviderError) -> Self {
        self.plan_failure(symbol, error, Some(times))
    }

    /// Delay applied to every call before it answers.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("call log should not be poisoned").len()
    }

    pub fn calls_for(&self, category: Category, symbol: &Symbol) -> usize {
        self.calls
            .lock()
            .expect("call log should not be poisoned")
            .iter()
            .filter(|(c, s)| *c == category && s == symbol)
            .count()
    }

    fn plan_failure(self, symbol: Symbol, error: ProviderError, remaining: Option<u32>) -> Self {
        self.failures
            .lock()
            .expect("failure plan should not be poisoned")
            .insert(symbol, FailurePlan { error, remaining });
        self
    }

    async fn answer<T>(
        &self,
        category: Category,
        symbol: &Symbol,
        select: impl FnOnce(&TickerFixture) -> Option<T>,
    ) -> Result<T, ProviderError> {
        self.calls
            .lock()
            .expect("call log should not be poisoned")
            .push((category, symbol.clone()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(error) = self.take_failure(symbol) {
            return Err(error);
        }

        let synthesized;
        let fixture = match self.tickers.get(symbol) {
            Some(fixture) => fixture,
            None if self.synthesize_unknown => {
                synthesized = TickerFixture::synthesized(symbol);
                &synthesized
            }
            None => {
                return Err(ProviderError::not_found(format!(
                    "no fixture data for {symbol}"
                )))
            }
        };

        select(fixture).ok_or_else(|| {
            ProviderError::not_found(format!("no {category} fixture for {symbol}"))
        })
    }

    fn take_failure(&self, symbol: &Symbol) -> Option<ProviderError> {
        let mut failures = self
            .failures
            .lock()
            .expect("failure plan should not be poisoned");
        let plan = failures.get_mut(symbol)?;
        match plan.remaining.as_mut() {
            None => Some(plan.error.clone()),
            Some(0) => None,
            Some(remaining) => {
                *remaining -= 1;
                Some(plan.error.clone())
            }
        }
    }
}

impl MarketDataProvider for FixtureProvider {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn company_info<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, CompanyInfo> {
        Box::pin(self.answer(Category::CompanyInfo, symbol, |f| f.company_info.clone()))
    }

    fn statements<'a>(
        &'a self,
        symbol: &'a Symbol,
        kind: StatementKind,
        frequency: Frequency,
    ) -> ProviderFuture<'a, Statements> {
        Box::pin(self.answer(kind.category(), symbol, move |f| match kind {
            StatementKind::Income => f.income.get(&frequency).cloned().map(Statements::Income),
            StatementKind::Balance => f.balance.get(&frequency).cloned().map(Statements::Balance),
            StatementKind::CashFlow => {
                f.cash_flow.get(&frequency).cloned().map(Statements::CashFlow)
            }
        }))
    }

    fn dividends<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, Vec<Dividend>> {
        Box::pin(self.answer(Category::Dividends, symbol, |f| Some(f.dividends.clone())))
    }

    fn price<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, PriceSnapshot> {
        Box::pin(self.answer(Category::PriceData, symbol, |f| {
            f.price.map(|price| {
                let as_of = UtcDateTime::now();
                let mut snapshot = PriceSnapshot::new(symbol.clone(), price, as_of)
                    .with_history(daily_bars(&f.closes, as_of));
                snapshot.currency = Some(String::from("USD"));
                snapshot
            })
        }))
    }
}

/// (ticker, name, enterprise value, EBIT, invested capital, price in cents)
const DEMO_TICKERS: [(&str, &str, f64, f64, f64, i64); 6] = [
    ("AAPL", "Apple Inc.", 3.0e12, 96.0e9, 65.13e9, 18_744),
    ("MSFT", "Microsoft Corporation", 3.1e12, 117.8e9, 260.62e9, 41_532),
    ("GOOGL", "Alphabet Inc.", 2.0e12, 70.0e9, 240.55e9, 16_451),
    ("AMZN", "Amazon.com, Inc.", 1.9e12, 68.6e9, 412.0e9, 18_329),
    ("NVDA", "NVIDIA Corporation", 2.2e12, 47.0e9, 43.5e9, 50_000),
    ("META", "Meta Platforms, Inc.", 1.2e12, 50.2e9, 160.0e9, 47_211),
];

fn fixture_period_end(frequency: Frequency) -> UtcDateTime {
    match frequency {
        Frequency::Quarterly => UtcDateTime::from_date(date!(2024 - 03 - 31)),
        Frequency::Yearly => UtcDateTime::from_date(date!(2023 - 12 - 31)),
    }
}

/// Bars for `closes`, one per day, the newest dated `as_of`.
fn daily_bars(closes: &[f64], as_of: UtcDateTime) -> Vec<PriceBar> {
    let newest = closes.len().saturating_sub(1);
    closes
        .iter()
        .enumerate()
        .map(|(index, &close)| PriceBar {
            high: Some(close * 1.01),
            low: Some(close * 0.99),
            volume: Some(1_000_000 + (index as u64 * 7_919) % 500_000),
            ..PriceBar::close_only(as_of.minus_days((newest - index) as u32), close)
        })
        .collect()
}

/// 260 sessions drifting up into `last` with a seeded oscillation on top.
fn trending_closes(seed: u64, last: f64) -> Vec<f64> {
    const SESSIONS: usize = 260;
    let phase = (seed % 628) as f64 / 100.0;
    let wave = |session: usize| (session as f64 * 0.21 + phase).sin() * 0.04;
    let newest = SESSIONS - 1;
    (0..SESSIONS)
        .map(|session| {
            let drift = 0.15 * (newest - session) as f64 / newest as f64;
            last * (1.0 - drift + wave(session) - wave(newest))
        })
        .collect()
}

/// Quarterly payments from 2019 through 2024, raised about 5% a year.
fn quarterly_dividends(seed: u64) -> Vec<Dividend> {
    let base = 0.10 + (seed % 40) as f64 / 100.0;
    let mut dividends = Vec::new();
    for (offset, year) in (2019..=2024).enumerate() {
        let amount = base * 1.05_f64.powi(offset as i32);
        for month in ["02", "05", "08", "11"] {
            if let Ok(ex_date) = UtcDateTime::parse_date(&format!("{year}-{month}-09")) {
                dividends.push(Dividend { ex_date, amount });
            }
        }
    }
    dividends
}

fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol
        .as_str()
        .bytes()
        .fold(0_u64, |acc, byte| acc.wrapping_mul(33).wrapping_add(u64::from(byte)))
}
