use tickwise_core::cache::Category;
use tickwise_core::{Frequency, Symbol};

use super::Context;
use crate::cli::FetchArgs;
use crate::error::CliError;
use crate::output::CommandOutput;

pub async fn run(args: &FetchArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let category = Category::parse(&args.category)?;
    let symbol = Symbol::parse(&args.ticker)?;
    let frequency = args.frequency.as_deref().map(Frequency::parse).transpose()?;

    let payload = context.access.fetch(category, &symbol, frequency).await?;

    let mut output = CommandOutput::new("fetch", serde_json::to_value(&payload)?)
        .with_summary("category", category)
        .with_summary("ticker", &symbol)
        .with_summary("provider", context.access.provider_name())
        .with_summary("cache_mode", context.access.mode());
    if category.uses_frequency() {
        output = output.with_summary("frequency", frequency.unwrap_or_default().as_str());
    } else if frequency.is_some() {
        output = output.with_warning(format!("--frequency is ignored for {category}"));
    }
    Ok(output)
}
