use tickwise_core::screening::MagicFormulaScreener;
use tickwise_core::{Frequency, Symbol};

use super::{optional, percent, Context};
use crate::cli::MagicArgs;
use crate::error::CliError;
use crate::output::{CommandOutput, Table};

pub async fn run(args: &MagicArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let frequency = Frequency::parse(&args.frequency)?;
    let symbols = args
        .tickers
        .iter()
        .map(|raw| Symbol::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let screener = MagicFormulaScreener::new(context.access.clone(), context.config.provider.workers);
    let mut report = screener.screen(&symbols, frequency).await;
    let ranked_total = report.ranked.len();
    if let Some(top) = args.top {
        report.ranked.truncate(top);
    }

    let mut ranked = Table::new(vec![
        "#", "Ticker", "Company", "EY", "ROC", "EY rank", "ROC rank", "Score",
    ])
    .titled("Ranking");
    for stock in &report.ranked {
        ranked.push(vec![
            stock.position.to_string(),
            stock.symbol.to_string(),
            optional(stock.company_name.as_deref()),
            percent(stock.earnings_yield),
            percent(stock.return_on_capital),
            stock.ey_rank.to_string(),
            stock.roc_rank.to_string(),
            stock.score.to_string(),
        ]);
    }

    let mut output = CommandOutput::new("magic", serde_json::to_value(&report)?)
        .with_status(report.status)
        .with_summary("frequency", frequency.as_str())
        .with_summary("ranked", ranked_total)
        .with_summary("excluded", report.excluded.len())
        .with_table(ranked);

    if !report.excluded.is_empty() {
        let mut excluded = Table::new(vec!["Ticker", "Reason", "Message"]).titled("Excluded");
        for exclusion in &report.excluded {
            excluded.push(vec![
                exclusion.symbol.to_string(),
                exclusion.reason.to_string(),
                exclusion.message.clone(),
            ]);
        }
        output = output.with_table(excluded);
    }
    Ok(output)
}
