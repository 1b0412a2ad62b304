//! CLI argument definitions for tickwise.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `magic` | Rank tickers with the Magic Formula |
//! | `monitor` | Evaluate price thresholds and send alerts |
//! | `cache` | Inspect and clear the local cache |
//! | `fetch` | Fetch one data category for a ticker |
//! | `price` | Price movement and technical indicators |
//! | `dividend` | Dividend history, trend and consistency |
//! | `analysis` | Company, price and dividend analysis together |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | lookup | Path to the YAML config file |
//! | `--format` | `table` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--mock` | `false` | Use built-in fixture data instead of the network |
//! | `--cache-mode` | `use` | Cache behaviour (use, refresh, bypass) |
//!
//! # Examples
//!
//! ```bash
//! tickwise magic AAPL MSFT GOOGL --frequency yearly
//! tickwise monitor run
//! tickwise cache clear --ticker AAPL
//! tickwise fetch income_statement AAPL --frequency q --format json --pretty
//! tickwise analysis MSFT --mock
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tickwise_core::data_access::CacheMode;

/// Stock screening and price alerts on top of a local data cache.
#[derive(Debug, Parser)]
#[command(
    name = "tickwise",
    author,
    version,
    about = "Magic Formula screening and price alerts with a local data cache"
)]
pub struct Cli {
    /// Path to the YAML config file.
    ///
    /// Falls back to $TICKWISE_CONFIG, then $TICKWISE_HOME/config.yml,
    /// then ~/.tickwise/config.yml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Serve built-in fixture data instead of calling the market-data provider.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// How fetches use the local cache.
    #[arg(long, global = true, value_enum, default_value_t = CacheModeArg::Use)]
    pub cache_mode: CacheModeArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns for terminal display.
    Table,
    /// Single JSON object.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheModeArg {
    /// Serve fresh cached data, fetch on a miss.
    Use,
    /// Always fetch, then update the cache.
    Refresh,
    /// Always fetch and leave the cache untouched.
    Bypass,
}

impl From<CacheModeArg> for CacheMode {
    fn from(value: CacheModeArg) -> Self {
        match value {
            CacheModeArg::Use => Self::Use,
            CacheModeArg::Refresh => Self::Refresh,
            CacheModeArg::Bypass => Self::Bypass,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rank tickers by earnings yield and return on capital.
    ///
    /// # Examples
    ///
    ///   tickwise magic AAPL MSFT GOOGL
    ///   tickwise magic AAPL MSFT --frequency annual --top 1
    Magic(MagicArgs),

    /// Evaluate configured price thresholds.
    Monitor(MonitorArgs),

    /// Inspect or clear the local cache.
    Cache(CacheArgs),

    /// Fetch one data category for a ticker through the cache.
    ///
    /// # Examples
    ///
    ///   tickwise fetch price_data AAPL
    ///   tickwise fetch balance AAPL --frequency yearly
    Fetch(FetchArgs),

    /// Daily movement, 7/30/90-session changes and technical indicators.
    ///
    /// # Examples
    ///
    ///   tickwise price AAPL
    ///   tickwise price NVDA --format json
    Price(TickerArgs),

    /// Yearly dividend totals, growth trend and payment consistency.
    Dividend(TickerArgs),

    /// Company profile plus price and dividend analysis in one report.
    Analysis(TickerArgs),
}

#[derive(Debug, Args)]
pub struct MagicArgs {
    /// Tickers to screen.
    #[arg(required = true)]
    pub tickers: Vec<String>,

    /// Statement frequency: q, quarter, quarterly, y, year, yearly or annual.
    #[arg(long, short, default_value = "quarterly")]
    pub frequency: String,

    /// Only show the best N ranked tickers.
    #[arg(long)]
    pub top: Option<usize>,
}

#[derive(Debug, Args)]
pub struct MonitorArgs {
    #[command(subcommand)]
    pub command: MonitorCommand,
}

#[derive(Debug, Subcommand)]
pub enum MonitorCommand {
    /// Fetch prices, evaluate every rule and notify about triggered ones.
    Run,
    /// Show monitor configuration.
    Status,
    /// Validate rules and send a test notification.
    Test,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Per-category entry counts, sizes and ages.
    Status,
    /// List cached records, newest first.
    List(CacheFilterArgs),
    /// Remove records for a ticker, a category, or everything.
    Clear(CacheFilterArgs),
    /// Remove expired records.
    Purge,
}

#[derive(Debug, Args)]
pub struct CacheFilterArgs {
    /// Only records for this ticker.
    #[arg(long)]
    pub ticker: Option<String>,

    /// Only records of this category.
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Data category (company_info, income_statement, balance_sheet,
    /// cash_flow, dividends, price_data).
    pub category: String,

    pub ticker: String,

    /// Statement frequency; ignored for non-statement categories.
    #[arg(long, short)]
    pub frequency: Option<String>,
}

#[derive(Debug, Args)]
pub struct TickerArgs {
    pub ticker: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tickwise",
            "magic",
            "AAPL",
            "MSFT",
            "--frequency",
            "y",
            "--mock",
            "--cache-mode",
            "bypass",
            "--format",
            "json",
        ])
        .expect("valid arguments");

        assert!(cli.mock);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(CacheMode::from(cli.cache_mode), CacheMode::Bypass);
        let Command::Magic(args) = cli.command else {
            panic!("expected magic command");
        };
        assert_eq!(args.tickers, ["AAPL", "MSFT"]);
        assert_eq!(args.frequency, "y");
    }

    #[test]
    fn magic_requires_tickers() {
        assert!(Cli::try_parse_from(["tickwise", "magic"]).is_err());
    }

    #[test]
    fn parses_nested_cache_and_monitor_commands() {
        let cli = Cli::try_parse_from(["tickwise", "cache", "clear", "--ticker", "aapl"])
            .expect("valid arguments");
        let Command::Cache(CacheArgs {
            command: CacheCommand::Clear(filter),
        }) = cli.command
        else {
            panic!("expected cache clear");
        };
        assert_eq!(filter.ticker.as_deref(), Some("aapl"));

        let cli = Cli::try_parse_from(["tickwise", "monitor", "test"]).expect("valid arguments");
        assert!(matches!(
            cli.command,
            Command::Monitor(MonitorArgs {
                command: MonitorCommand::Test
            })
        ));
    }

    #[test]
    fn analysis_commands_take_one_ticker() {
        let cli = Cli::try_parse_from(["tickwise", "price", "nvda", "--mock"])
            .expect("valid arguments");
        let Command::Price(args) = cli.command else {
            panic!("expected price command");
        };
        assert_eq!(args.ticker, "nvda");

        let cli = Cli::try_parse_from(["tickwise", "dividend", "MSFT"]).expect("valid arguments");
        assert!(matches!(cli.command, Command::Dividend(_)));
        assert!(Cli::try_parse_from(["tickwise", "analysis"]).is_err());
        assert!(Cli::try_parse_from(["tickwise", "analysis", "AAPL", "MSFT"]).is_err());
    }
}
