mod analysis;
mod cache;
mod dividend;
mod fetch;
mod magic;
mod monitor;
mod price;

use std::sync::Arc;

use tickwise_core::cache::CacheStore;
use tickwise_core::config::AppConfig;
use tickwise_core::data_access::DataAccess;
use tickwise_core::provider::{FixtureProvider, MarketDataProvider, YahooProvider};
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::output::CommandOutput;

/// Everything a command needs, built once from the validated config.
pub struct Context {
    pub config: AppConfig,
    pub access: Arc<DataAccess>,
}

impl Context {
    fn build(cli: &Cli, config: AppConfig) -> Result<Self, CliError> {
        let cache = Arc::new(CacheStore::open(
            config.cache_directory(),
            config.cache_policy()?,
        )?);
        let provider: Arc<dyn MarketDataProvider> = if cli.mock {
            Arc::new(FixtureProvider::demo())
        } else {
            Arc::new(YahooProvider::new(config.yahoo()))
        };
        debug!(
            provider = provider.name(),
            cache = %cache.root().display(),
            mode = %tickwise_core::data_access::CacheMode::from(cli.cache_mode),
            "command context ready"
        );

        let access = DataAccess::new(provider, cache)
            .with_mode(cli.cache_mode.into())
            .with_retry(config.retry())
            .with_attempt_timeout(config.attempt_timeout());
        Ok(Self {
            config,
            access: Arc::new(access),
        })
    }

    pub fn cache(&self) -> &CacheStore {
        self.access.cache()
    }
}

pub async fn run(cli: &Cli, config: AppConfig) -> Result<CommandOutput, CliError> {
    let context = Context::build(cli, config)?;

    match &cli.command {
        Command::Magic(args) => magic::run(args, &context).await,
        Command::Monitor(args) => monitor::run(args, &context).await,
        Command::Cache(args) => cache::run(args, &context),
        Command::Fetch(args) => fetch::run(args, &context).await,
        Command::Price(args) => price::run(args, &context).await,
        Command::Dividend(args) => dividend::run(args, &context).await,
        Command::Analysis(args) => analysis::run(args, &context).await,
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| String::from("-"), |v| v.to_string())
}
