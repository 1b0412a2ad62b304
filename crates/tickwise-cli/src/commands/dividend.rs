use tickwise_core::analysis::{Analyzer, DividendAnalysis};
use tickwise_core::{Symbol, UtcDateTime};

use super::{optional, Context};
use crate::cli::TickerArgs;
use crate::error::CliError;
use crate::output::{CommandOutput, Table};

pub async fn run(args: &TickerArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let symbol = Symbol::parse(&args.ticker)?;
    let analysis = Analyzer::new(context.access.clone())
        .dividend_analysis(&symbol, UtcDateTime::now())
        .await?;

    let mut output = CommandOutput::new("dividend", serde_json::to_value(&analysis)?)
        .with_summary("ticker", &symbol);
    match &analysis {
        Some(analysis) => {
            output = output
                .with_summary("payments", analysis.total_payments)
                .with_summary("trend", analysis.trend)
                .with_summary("trailing_12m", money(analysis.trailing_twelve_months))
                .with_summary("consistency", score(analysis.consistency_score))
                .with_table(yearly_table(analysis));
        }
        None => output = output.with_warning(format!("no dividend history for {symbol}")),
    }
    Ok(output)
}

/// Yearly totals, newest first; shared with `analysis`.
pub fn yearly_table(analysis: &DividendAnalysis) -> Table {
    let mut table = Table::new(vec!["Year", "Total", "Payments", "Average", "First", "Last"])
        .titled(format!("Dividends ({})", analysis.trend));
    for year in &analysis.yearly {
        table.push(vec![
            year.year.to_string(),
            format!("{:.4}", year.total),
            year.payments.to_string(),
            format!("{:.4}", year.average),
            year.first_payment.clone(),
            year.last_payment.clone(),
        ]);
    }
    for gap in &analysis.years_without_dividends {
        table.push(vec![
            gap.to_string(),
            String::from("0"),
            String::from("0"),
            String::from("-"),
            String::from("-"),
            String::from("-"),
        ]);
    }
    table
}

fn money(value: Option<f64>) -> String {
    optional(value.map(|v| format!("{v:.4}")))
}

fn score(value: Option<f64>) -> String {
    optional(value.map(|v| format!("{v:.1}/10")))
}
