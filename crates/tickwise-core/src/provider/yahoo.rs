use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{MarketDataProvider, ProviderError, ProviderFuture, StatementKind, Statements};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::{
    BalanceSheet, CashFlow, CompanyInfo, Dividend, Frequency, IncomeStatement, PriceBar,
    PriceSnapshot, Symbol, UtcDateTime,
};

const QUERY1: &str = "https://query1.finance.yahoo.com";
const QUERY2: &str = "https://query2.finance.yahoo.com";
const REFERER: &str = "https://finance.yahoo.com/";
const CRUMB_TTL: Duration = Duration::from_secs(3600);
/// 1985-08-23; earlier than any period the timeseries endpoint serves.
const TIMESERIES_START: i64 = 493_590_046;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YahooConfig {
    pub timeout: Duration,
    pub requests_per_second: u32,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            requests_per_second: 4,
        }
    }
}

/// Session crumb required by the quoteSummary endpoint. The matching cookie
/// lives in the HTTP client's cookie jar.
#[derive(Debug, Default)]
struct CrumbCache {
    current: Mutex<Option<(String, Instant)>>,
}

impl CrumbCache {
    async fn get(&self, http: &dyn HttpClient, timeout: Duration) -> Result<String, ProviderError> {
        let mut current = self.current.lock().await;
        if let Some((crumb, fetched)) = current.as_ref() {
            if fetched.elapsed() < CRUMB_TTL {
                return Ok(crumb.clone());
            }
        }

        let crumb = fetch_crumb(http, timeout).await?;
        *current = Some((crumb.clone(), Instant::now()));
        Ok(crumb)
    }

    async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}

async fn fetch_crumb(http: &dyn HttpClient, timeout: Duration) -> Result<String, ProviderError> {
    // Only sets session cookies; the status is irrelevant.
    let cookie_request = HttpRequest::get("https://fc.yahoo.com")
        .with_header("referer", REFERER)
        .with_timeout(timeout);
    http.execute(cookie_request).await.map_err(|e| {
        ProviderError::unavailable(format!("failed to fetch yahoo session cookie: {}", e.message()))
    })?;

    for host in [QUERY1, QUERY2] {
        let request = HttpRequest::get(format!("{host}/v1/test/getcrumb"))
            .with_header("referer", REFERER)
            .with_timeout(timeout);
        let Ok(response) = http.execute(request).await else {
            continue;
        };
        let body = response.body.trim();
        if response.status == 429 || body.to_ascii_lowercase().contains("too many requests") {
            return Err(ProviderError::unavailable("yahoo rate limited while fetching crumb"));
        }
        if response.is_success()
            && !body.is_empty()
            && body.len() < 100
            && !body.contains(' ')
            && !body.contains('<')
        {
            return Ok(body.to_owned());
        }
    }

    Err(ProviderError::unavailable("failed to fetch yahoo crumb from all endpoints"))
}

/// Live provider over Yahoo Finance's public JSON endpoints.
pub struct YahooProvider {
    http: Arc<dyn HttpClient>,
    config: YahooConfig,
    crumb: CrumbCache,
    limiter: DirectRateLimiter,
}

impl YahooProvider {
    pub fn new(config: YahooConfig) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), config)
    }

    pub fn with_http_client(http: Arc<dyn HttpClient>, config: YahooConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            http,
            config,
            crumb: CrumbCache::default(),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    async fn get(&self, url: String) -> Result<HttpResponse, ProviderError> {
        self.limiter.until_ready().await;
        debug!(%url, "yahoo request");
        let request = HttpRequest::get(url)
            .with_header("referer", REFERER)
            .with_timeout(self.config.timeout);
        self.http.execute(request).await.map_err(|e| {
            ProviderError::unavailable(format!("yahoo transport error: {}", e.message()))
        })
    }

    async fn fetch_company_info(&self, symbol: &Symbol) -> Result<CompanyInfo, ProviderError> {
        let mut response = self.get(self.quote_summary_url(symbol).await?).await?;
        if response.status == 401 {
            warn!(%symbol, "yahoo rejected crumb, refreshing");
            self.crumb.invalidate().await;
            response = self.get(self.quote_summary_url(symbol).await?).await?;
        }
        check_status(&response, symbol)?;
        parse_company_info(&response.body, symbol)
    }

    async fn quote_summary_url(&self, symbol: &Symbol) -> Result<String, ProviderError> {
        let crumb = self.crumb.get(self.http.as_ref(), self.config.timeout).await?;
        Ok(format!(
            "{QUERY1}/v10/finance/quoteSummary/{}?modules=price,summaryProfile,defaultKeyStatistics&crumb={}",
            urlencoding::encode(symbol.as_str()),
            urlencoding::encode(&crumb)
        ))
    }

    async fn fetch_statements(
        &self,
        symbol: &Symbol,
        kind: StatementKind,
        frequency: Frequency,
    ) -> Result<Statements, ProviderError> {
        let prefix = timeseries_prefix(frequency);
        let types = statement_fields(kind)
            .iter()
            .map(|field| format!("{prefix}{field}"))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{QUERY2}/ws/fundamentals-timeseries/v1/finance/timeseries/{sym}?symbol={sym}&type={types}&period1={TIMESERIES_START}&period2={now}",
            sym = urlencoding::encode(symbol.as_str()),
            now = UtcDateTime::now().unix_timestamp(),
        );

        let response = self.get(url).await?;
        check_status(&response, symbol)?;
        let periods = parse_timeseries(&response.body, prefix)?;
        if periods.is_empty() {
            return Err(ProviderError::not_found(format!(
                "no {} {kind:?} statements for {symbol}",
                frequency.as_str()
            )));
        }
        Ok(build_statements(kind, periods))
    }

    async fn fetch_chart(&self, symbol: &Symbol, query: &str) -> Result<ChartResult, ProviderError> {
        let url = format!(
            "{QUERY1}/v8/finance/chart/{}?{query}",
            urlencoding::encode(symbol.as_str())
        );
        let response = self.get(url).await?;
        check_status(&response, symbol)?;

        let chart: ChartResponse = serde_json::from_str(&response.body)
            .map_err(|e| ProviderError::invalid_data(format!("failed to parse yahoo chart: {e}")))?;
        if let Some(error) = chart.chart.error {
            return Err(ProviderError::not_found(format!(
                "yahoo chart error for {symbol}: {}",
                error.description.unwrap_or(error.code)
            )));
        }
        chart
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| ProviderError::not_found(format!("no chart data for {symbol}")))
    }

    async fn fetch_dividends(&self, symbol: &Symbol) -> Result<Vec<Dividend>, ProviderError> {
        let chart = self
            .fetch_chart(symbol, "range=10y&interval=1mo&events=div")
            .await?;
        let mut dividends = chart
            .events
            .map(|events| events.dividends.into_values().collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .map(|event| {
                UtcDateTime::from_unix_timestamp(event.date)
                    .map(|ex_date| Dividend {
                        ex_date,
                        amount: event.amount,
                    })
                    .map_err(|e| ProviderError::invalid_data(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        dividends.sort_by_key(|dividend| dividend.ex_date);
        Ok(dividends)
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceSnapshot, ProviderError> {
        let chart = self.fetch_chart(symbol, "range=1y&interval=1d").await?;
        let history = chart.daily_bars()?;
        let price = chart
            .meta
            .regular_market_price
            .ok_or_else(|| ProviderError::not_found(format!("no market price for {symbol}")))?;
        let as_of = match chart.meta.regular_market_time {
            Some(seconds) => UtcDateTime::from_unix_timestamp(seconds)
                .map_err(|e| ProviderError::invalid_data(e.to_string()))?,
            None => UtcDateTime::now(),
        };

        let mut snapshot = PriceSnapshot::from_f64(symbol.clone(), price, as_of)
            .map_err(|e| ProviderError::invalid_data(e.to_string()))?;
        snapshot.currency = chart.meta.currency;
        Ok(snapshot.with_history(history))
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn company_info<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, CompanyInfo> {
        Box::pin(self.fetch_company_info(symbol))
    }

    fn statements<'a>(
        &'a self,
        symbol: &'a Symbol,
        kind: StatementKind,
        frequency: Frequency,
    ) -> ProviderFuture<'a, Statements> {
        Box::pin(self.fetch_statements(symbol, kind, frequency))
    }

    fn dividends<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, Vec<Dividend>> {
        Box::pin(self.fetch_dividends(symbol))
    }

    fn price<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, PriceSnapshot> {
        Box::pin(self.fetch_price(symbol))
    }
}

fn check_status(response: &HttpResponse, symbol: &Symbol) -> Result<(), ProviderError> {
    match response.status {
        200..=299 => Ok(()),
        404 => Err(ProviderError::not_found(format!("yahoo has no data for {symbol}"))),
        429 => Err(ProviderError::unavailable("yahoo rate limited the request")),
        401 | 403 => Err(ProviderError::unavailable(format!(
            "yahoo refused the request with status {}",
            response.status
        ))),
        status if status >= 500 => Err(ProviderError::unavailable(format!(
            "yahoo returned status {status}"
        ))),
        status => Err(ProviderError::invalid_data(format!(
            "yahoo returned unexpected status {status}"
        ))),
    }
}

const fn timeseries_prefix(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Quarterly => "quarterly",
        Frequency::Yearly => "annual",
    }
}

fn statement_fields(kind: StatementKind) -> &'static [&'static str] {
    match kind {
        StatementKind::Income => &["TotalRevenue", "EBIT", "NetIncome"],
        StatementKind::Balance => &[
            "TotalAssets",
            "TotalDebt",
            "StockholdersEquity",
            "CashAndCashEquivalents",
            "InvestedCapital",
        ],
        StatementKind::CashFlow => &["OperatingCashFlow", "CapitalExpenditure", "FreeCashFlow"],
    }
}

type PeriodValues = BTreeMap<String, BTreeMap<String, f64>>;

/// Pivot the per-field timeseries into `period end -> field -> value`.
fn parse_timeseries(body: &str, prefix: &str) -> Result<PeriodValues, ProviderError> {
    let root: Value = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_data(format!("failed to parse yahoo timeseries: {e}"))
    })?;
    let results = root
        .pointer("/timeseries/result")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::invalid_data("yahoo timeseries response has no result"))?;

    let mut periods = PeriodValues::new();
    for result in results {
        let Some(series_type) = result.pointer("/meta/type/0").and_then(Value::as_str) else {
            continue;
        };
        let Some(field) = series_type.strip_prefix(prefix) else {
            continue;
        };
        let Some(points) = result.get(series_type).and_then(Value::as_array) else {
            continue;
        };

        for point in points {
            let date = point.get("asOfDate").and_then(Value::as_str);
            let value = point.pointer("/reportedValue/raw").and_then(Value::as_f64);
            if let (Some(date), Some(value)) = (date, value) {
                periods
                    .entry(date.to_owned())
                    .or_default()
                    .insert(field.to_owned(), value);
            }
        }
    }
    Ok(periods)
}

/// Rows most recent first; periods whose date cannot be parsed are dropped.
fn build_statements(kind: StatementKind, periods: PeriodValues) -> Statements {
    let rows = periods.into_iter().rev().filter_map(|(date, values)| {
        let period_end = UtcDateTime::parse_date(&date).ok()?;
        Some((period_end, values))
    });

    match kind {
        StatementKind::Income => Statements::Income(
            rows.map(|(period_end, v)| IncomeStatement {
                period_end,
                total_revenue: v.get("TotalRevenue").copied(),
                ebit: v.get("EBIT").copied(),
                net_income: v.get("NetIncome").copied(),
            })
            .collect(),
        ),
        StatementKind::Balance => Statements::Balance(
            rows.map(|(period_end, v)| BalanceSheet {
                period_end,
                total_assets: v.get("TotalAssets").copied(),
                total_debt: v.get("TotalDebt").copied(),
                stockholders_equity: v.get("StockholdersEquity").copied(),
                cash_and_equivalents: v.get("CashAndCashEquivalents").copied(),
                invested_capital: v.get("InvestedCapital").copied(),
            })
            .collect(),
        ),
        StatementKind::CashFlow => Statements::CashFlow(
            rows.map(|(period_end, v)| CashFlow {
                period_end,
                operating_cash_flow: v.get("OperatingCashFlow").copied(),
                capital_expenditure: v.get("CapitalExpenditure").copied(),
                free_cash_flow: v.get("FreeCashFlow").copied(),
            })
            .collect(),
        ),
    }
}

fn parse_company_info(body: &str, symbol: &Symbol) -> Result<CompanyInfo, ProviderError> {
    let response: QuoteSummaryResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_data(format!("failed to parse yahoo quote summary: {e}"))
    })?;
    if let Some(error) = response.quote_summary.error {
        return Err(ProviderError::not_found(format!(
            "yahoo quote summary error for {symbol}: {}",
            error.description.unwrap_or(error.code)
        )));
    }
    let result = response
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ProviderError::not_found(format!("no company info for {symbol}")))?;

    let price = result.price.unwrap_or_default();
    let profile = result.summary_profile.unwrap_or_default();
    let stats = result.default_key_statistics.unwrap_or_default();

    let mut info = CompanyInfo::new(symbol.clone(), price.long_name.or(price.short_name))
        .with_market_cap(price.market_cap.and_then(RawValue::value))
        .with_enterprise_value(stats.enterprise_value.and_then(RawValue::value));
    info.sector = profile.sector;
    info.industry = profile.industry;
    info.currency = price.currency;
    Ok(info)
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryEnvelope,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    summary_profile: Option<ProfileModule>,
    #[serde(default)]
    default_key_statistics: Option<KeyStatisticsModule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    market_cap: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileModule {
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatisticsModule {
    #[serde(default)]
    enterprise_value: Option<RawValue>,
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`; only `raw` matters.
#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

impl RawValue {
    fn value(self) -> Option<f64> {
        self.raw.filter(|value| value.is_finite())
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    events: Option<ChartEvents>,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

impl ChartResult {
    /// Zip timestamps with the first quote series. Sessions without a close
    /// (halts, the still-open bar) are skipped.
    fn daily_bars(&self) -> Result<Vec<PriceBar>, ProviderError> {
        let Some(quote) = self
            .indicators
            .as_ref()
            .and_then(|indicators| indicators.quote.first())
        else {
            return Ok(Vec::new());
        };
        let at = |series: &[Option<f64>], index: usize| series.get(index).copied().flatten();

        let mut bars = Vec::with_capacity(self.timestamp.len());
        for (index, &seconds) in self.timestamp.iter().enumerate() {
            let Some(close) = at(&quote.close, index).filter(|close| close.is_finite()) else {
                continue;
            };
            let date = UtcDateTime::from_unix_timestamp(seconds)
                .map_err(|e| ProviderError::invalid_data(e.to_string()))?;
            bars.push(PriceBar {
                date,
                open: at(&quote.open, index),
                high: at(&quote.high, index),
                low: at(&quote.low, index),
                close,
                volume: quote.volume.get(index).copied().flatten(),
            });
        }
        Ok(bars)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: BTreeMap<String, DividendEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpError;
    use crate::provider::ProviderErrorKind;
    use rust_decimal_macros::dec;
    use std::future::Future;
    use std::pin::Pin;

    /// Answers each request with the first route whose fragment appears in the URL.
    #[derive(Debug)]
    struct RoutedHttpClient {
        routes: Vec<(&'static str, u16, String)>,
        requests: std::sync::Mutex<Vec<String>>,
    }

    impl RoutedHttpClient {
        fn new(routes: Vec<(&'static str, u16, String)>) -> Arc<Self> {
            let mut all = vec![
                ("fc.yahoo.com", 404, String::new()),
                ("getcrumb", 200, String::from("crumb-123")),
            ];
            all.extend(routes);
            Arc::new(Self {
                routes: all,
                requests: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn urls(&self) -> Vec<String> {
            self.requests.lock().expect("request log").clone()
        }
    }

    impl HttpClient for RoutedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests.lock().expect("request log").push(request.url.clone());
            let response = self
                .routes
                .iter()
                .find(|(fragment, _, _)| request.url.contains(fragment))
                .map(|(_, status, body)| HttpResponse::new(*status, body.clone()))
                .ok_or_else(|| HttpError::new("connection refused"));
            Box::pin(async move { response })
        }
    }

    fn provider(client: Arc<RoutedHttpClient>) -> YahooProvider {
        YahooProvider::with_http_client(
            client,
            YahooConfig {
                timeout: Duration::from_secs(1),
                requests_per_second: 1_000,
            },
        )
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    #[tokio::test]
    async fn company_info_reads_name_and_enterprise_value() {
        let body = serde_json::json!({
            "quoteSummary": {
                "result": [{
                    "price": {"longName": "Apple Inc.", "currency": "USD", "marketCap": {"raw": 3.0e12}},
                    "summaryProfile": {"sector": "Technology", "industry": "Consumer Electronics"},
                    "defaultKeyStatistics": {"enterpriseValue": {"raw": 3.1e12, "fmt": "3.1T"}}
                }],
                "error": null
            }
        });
        let client = RoutedHttpClient::new(vec![("quoteSummary", 200, body.to_string())]);

        let info = provider(client.clone())
            .company_info(&symbol("AAPL"))
            .await
            .expect("company info");

        assert_eq!(info.name.as_deref(), Some("Apple Inc."));
        assert_eq!(info.enterprise_value, Some(3.1e12));
        assert_eq!(info.sector.as_deref(), Some("Technology"));
        assert!(client.urls().iter().any(|url| url.contains("crumb=crumb-123")));
    }

    #[tokio::test]
    async fn http_404_maps_to_not_found() {
        let client = RoutedHttpClient::new(vec![("chart", 404, String::from("{}"))]);
        let err = provider(client)
            .price(&symbol("ZZZZ"))
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ProviderErrorKind::NotFound);
    }

    #[tokio::test]
    async fn server_errors_and_transport_failures_are_unavailable() {
        let client = RoutedHttpClient::new(vec![("chart", 503, String::new())]);
        let err = provider(client)
            .price(&symbol("AAPL"))
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ProviderErrorKind::Unavailable);

        let client = RoutedHttpClient::new(Vec::new());
        let err = provider(client)
            .dividends(&symbol("AAPL"))
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ProviderErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn price_comes_from_chart_meta() {
        let body = serde_json::json!({
            "chart": {
                "result": [{"meta": {"currency": "USD", "regularMarketPrice": 187.44, "regularMarketTime": 1714579200}}],
                "error": null
            }
        });
        let client = RoutedHttpClient::new(vec![("chart", 200, body.to_string())]);

        let snapshot = provider(client)
            .price(&symbol("AAPL"))
            .await
            .expect("price");
        assert_eq!(snapshot.price, dec!(187.44));
        assert_eq!(snapshot.currency.as_deref(), Some("USD"));
        assert_eq!(snapshot.as_of.unix_timestamp(), 1_714_579_200);
        assert!(snapshot.history.is_empty());
    }

    #[tokio::test]
    async fn daily_bars_skip_sessions_without_a_close() {
        let body = serde_json::json!({
            "chart": {
                "result": [{
                    "meta": {"currency": "USD", "regularMarketPrice": 12.5, "regularMarketTime": 1714665600},
                    "timestamp": [1714579200, 1714492800, 1714665600],
                    "indicators": {"quote": [{
                        "open": [10.0, 9.5, null],
                        "high": [11.0, 10.0, null],
                        "low": [9.8, 9.1, null],
                        "close": [10.5, 9.9, null],
                        "volume": [1200, 900, null]
                    }]}
                }],
                "error": null
            }
        });
        let client = RoutedHttpClient::new(vec![("chart", 200, body.to_string())]);

        let snapshot = provider(client.clone())
            .price(&symbol("AAPL"))
            .await
            .expect("price");

        let closes: Vec<f64> = snapshot.history.iter().map(|bar| bar.close).collect();
        assert_eq!(closes, vec![9.9, 10.5]);
        assert_eq!(snapshot.history[1].high, Some(11.0));
        assert_eq!(snapshot.history[1].volume, Some(1200));
        assert_eq!(snapshot.price, dec!(12.5));
        assert!(client
            .urls()
            .iter()
            .any(|url| url.contains("range=1y&interval=1d")));
    }

    #[tokio::test]
    async fn timeseries_is_pivoted_into_rows_newest_first() {
        let body = serde_json::json!({
            "timeseries": {
                "result": [
                    {
                        "meta": {"symbol": ["AAPL"], "type": ["quarterlyEBIT"]},
                        "quarterlyEBIT": [
                            {"asOfDate": "2023-12-31", "reportedValue": {"raw": 40.0}},
                            {"asOfDate": "2024-03-31", "reportedValue": {"raw": 28.0}}
                        ]
                    },
                    {
                        "meta": {"symbol": ["AAPL"], "type": ["quarterlyTotalRevenue"]},
                        "quarterlyTotalRevenue": [
                            {"asOfDate": "2024-03-31", "reportedValue": {"raw": 90.0}},
                            null
                        ]
                    },
                    {"meta": {"symbol": ["AAPL"], "type": ["quarterlyNetIncome"]}}
                ],
                "error": null
            }
        });
        let client = RoutedHttpClient::new(vec![("timeseries", 200, body.to_string())]);

        let statements = provider(client.clone())
            .statements(&symbol("AAPL"), StatementKind::Income, Frequency::Quarterly)
            .await
            .expect("statements");

        let Statements::Income(rows) = statements else {
            panic!("expected income rows");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period_end.format_rfc3339(), "2024-03-31T00:00:00Z");
        assert_eq!(rows[0].ebit, Some(28.0));
        assert_eq!(rows[0].total_revenue, Some(90.0));
        assert_eq!(rows[1].total_revenue, None);
        assert!(client.urls().iter().any(|url| url.contains("quarterlyEBIT")));
    }

    #[tokio::test]
    async fn empty_timeseries_is_not_found() {
        let body = serde_json::json!({"timeseries": {"result": [], "error": null}});
        let client = RoutedHttpClient::new(vec![("timeseries", 200, body.to_string())]);

        let err = provider(client)
            .statements(&symbol("AAPL"), StatementKind::Balance, Frequency::Yearly)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ProviderErrorKind::NotFound);
    }
}
