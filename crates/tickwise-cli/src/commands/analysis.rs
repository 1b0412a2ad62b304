use tickwise_core::analysis::Analyzer;
use tickwise_core::Symbol;

use super::{dividend, optional, price, Context};
use crate::cli::TickerArgs;
use crate::error::CliError;
use crate::output::{CommandOutput, Table};

pub async fn run(args: &TickerArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let symbol = Symbol::parse(&args.ticker)?;
    let report = Analyzer::new(context.access.clone()).analyze(&symbol).await;

    let mut output = CommandOutput::new("analysis", serde_json::to_value(&report)?)
        .with_status(report.status)
        .with_summary("ticker", &symbol);
    if let Some(company) = &report.company {
        output = output
            .with_summary("company", optional(company.name.as_deref()))
            .with_summary("sector", optional(company.sector.as_deref()))
            .with_summary("industry", optional(company.industry.as_deref()))
            .with_summary(
                "market_cap",
                optional(company.market_cap.map(|cap| format!("{cap:.0}"))),
            );
    }
    if let Some(quote) = &report.price {
        output = output.with_summary("price", &quote.price);
        if let Some(technical) = &quote.technical {
            output = output.with_summary("signal", technical.signal);
        }
        for table in price::tables(quote) {
            output = output.with_table(table);
        }
    }
    if let Some(dividends) = &report.dividends {
        output = output.with_table(dividend::yearly_table(dividends));
    }

    if !report.failures.is_empty() {
        let mut failures = Table::new(vec!["Section", "Reason", "Message"]).titled("Failed");
        for failure in &report.failures {
            failures.push(vec![
                failure.section.to_owned(),
                failure.reason.to_string(),
                failure.message.clone(),
            ]);
        }
        output = output.with_table(failures);
    }
    Ok(output)
}
