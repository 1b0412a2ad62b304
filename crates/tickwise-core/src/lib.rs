//! # Tickwise Core
//!
//! Cached market-data access, Magic Formula screening and price alerts.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`analysis`] | Price movement, technical indicators and dividend history |
//! | [`cache`] | TTL and category aware on-disk cache |
//! | [`config`] | YAML configuration and validation |
//! | [`data_access`] | Cache-first fetches with bounded retry |
//! | [`domain`] | Symbols, timestamps, statements and prices |
//! | [`error`] | Validation, configuration and cache errors |
//! | [`http_client`] | HTTP client abstraction |
//! | [`monitor`] | Threshold rules and the price monitor |
//! | [`notify`] | Alert rendering and delivery |
//! | [`provider`] | Market-data providers (Yahoo, fixtures) |
//! | [`retry`] | Bounded retry with backoff |
//! | [`screening`] | Magic Formula ranking |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickwise_core::cache::{CachePolicy, CacheStore};
//! use tickwise_core::data_access::DataAccess;
//! use tickwise_core::provider::FixtureProvider;
//! use tickwise_core::screening::MagicFormulaScreener;
//! use tickwise_core::{Frequency, Symbol};
//!
//! let cache = Arc::new(CacheStore::open("/tmp/tickwise-cache", CachePolicy::default())?);
//! let access = Arc::new(DataAccess::new(Arc::new(FixtureProvider::demo()), cache));
//! let screener = MagicFormulaScreener::new(access, 4);
//! let tickers = ["AAPL", "MSFT", "GOOGL"].map(|t| Symbol::parse(t).unwrap());
//! let report = screener.screen(&tickers, Frequency::Quarterly).await;
//! for stock in &report.ranked {
//!     println!("{} {} score={}", stock.position, stock.symbol, stock.score);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Screener    │   │   Analyzer   │   │ PriceMonitor │──▶ Notifier ──▶ Transport
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        └──────────────────┼──────────────────┘
//!                           ▼
//!                    ┌──────────────┐     ┌──────────────┐
//!                    │  DataAccess  │────▶│  CacheStore  │
//!                    └──────┬───────┘     └──────────────┘
//!                           ▼
//!                 ┌────────────────────┐
//!                 │ MarketDataProvider │──▶ HttpClient
//!                 └────────────────────┘
//! ```

pub mod analysis;
pub mod cache;
pub mod config;
pub mod data_access;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod monitor;
pub mod notify;
pub mod provider;
pub mod retry;
pub mod run_status;
pub mod screening;

pub use domain::{
    latest, BalanceSheet, CashFlow, CompanyInfo, Dividend, Frequency, IncomeStatement, PriceBar,
    PriceSnapshot, Symbol, UtcDateTime,
};
pub use error::{CacheError, ConfigError, ValidationError};
pub use run_status::RunStatus;
