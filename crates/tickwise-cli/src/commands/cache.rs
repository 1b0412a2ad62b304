use tickwise_core::cache::{Category, EntryFilter};
use tickwise_core::{Symbol, UtcDateTime};

use super::{optional, Context};
use crate::cli::{CacheArgs, CacheCommand, CacheFilterArgs};
use crate::error::CliError;
use crate::output::{CommandOutput, Table};

pub fn run(args: &CacheArgs, context: &Context) -> Result<CommandOutput, CliError> {
    match &args.command {
        CacheCommand::Status => status(context),
        CacheCommand::List(filter) => list(filter, context),
        CacheCommand::Clear(filter) => clear(filter, context),
        CacheCommand::Purge => purge(context),
    }
}

fn parse_filter(args: &CacheFilterArgs) -> Result<EntryFilter, CliError> {
    Ok(EntryFilter {
        symbol: args.ticker.as_deref().map(Symbol::parse).transpose()?,
        category: args.category.as_deref().map(Category::parse).transpose()?,
    })
}

fn status(context: &Context) -> Result<CommandOutput, CliError> {
    let status = context.cache().status();

    let mut table = Table::new(vec![
        "Category", "Enabled", "TTL (h)", "Entries", "Expired", "Bytes", "Oldest", "Newest",
    ]);
    for category in &status.categories {
        table.push(vec![
            category.category.to_string(),
            category.enabled.to_string(),
            category.ttl_hours.to_string(),
            category.entries.to_string(),
            category.expired.to_string(),
            category.size_bytes.to_string(),
            optional(category.oldest.map(UtcDateTime::format_rfc3339)),
            optional(category.newest.map(UtcDateTime::format_rfc3339)),
        ]);
    }

    Ok(CommandOutput::new("cache status", serde_json::to_value(&status)?)
        .with_summary("root", status.root.display())
        .with_summary("entries", status.total_entries)
        .with_summary("expired", status.total_expired)
        .with_summary("bytes", status.total_size_bytes)
        .with_table(table))
}

fn list(args: &CacheFilterArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let filter = parse_filter(args)?;
    let entries = context.cache().entries(&filter);

    let mut table = Table::new(vec![
        "Category", "Ticker", "Frequency", "Fetched", "Expires", "Expired", "Bytes",
    ]);
    for entry in &entries {
        table.push(vec![
            entry.category.to_string(),
            entry.symbol.to_string(),
            optional(entry.frequency.map(|f| f.as_str())),
            entry.fetched_at.format_rfc3339(),
            entry.expires_at.format_rfc3339(),
            entry.expired.to_string(),
            entry.size_bytes.to_string(),
        ]);
    }

    Ok(CommandOutput::new("cache list", serde_json::to_value(&entries)?)
        .with_summary("entries", entries.len())
        .with_table(table))
}

fn clear(args: &CacheFilterArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let filter = parse_filter(args)?;
    let cache = context.cache();
    let removed = match (&filter.symbol, filter.category) {
        (None, None) => cache.invalidate(None)?,
        (Some(symbol), None) => cache.invalidate(Some(symbol))?,
        (None, Some(category)) => cache.invalidate_category(category)?,
        (Some(_), Some(_)) => cache.invalidate_matching(&filter)?,
    };

    Ok(
        CommandOutput::new("cache clear", serde_json::json!({ "removed": removed }))
            .with_summary("removed", removed),
    )
}

fn purge(context: &Context) -> Result<CommandOutput, CliError> {
    let removed = context.cache().purge_expired()?;
    Ok(
        CommandOutput::new("cache purge", serde_json::json!({ "removed": removed }))
            .with_summary("removed", removed),
    )
}
