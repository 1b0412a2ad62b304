use tickwise_core::analysis::{Analyzer, PriceAnalysis};
use tickwise_core::Symbol;

use super::{optional, Context};
use crate::cli::TickerArgs;
use crate::error::CliError;
use crate::output::{CommandOutput, Table};

pub async fn run(args: &TickerArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let symbol = Symbol::parse(&args.ticker)?;
    let analysis = Analyzer::new(context.access.clone())
        .price_analysis(&symbol)
        .await?;

    let mut output = CommandOutput::new("price", serde_json::to_value(&analysis)?)
        .with_summary("ticker", &symbol)
        .with_summary("price", &analysis.price)
        .with_summary("currency", optional(analysis.currency.as_deref()))
        .with_summary("as_of", analysis.as_of);
    for table in tables(&analysis) {
        output = output.with_table(table);
    }
    if analysis.movement.is_none() {
        output = output.with_warning(format!("no daily history for {symbol}"));
    } else if analysis.technical.is_none() {
        output = output.with_warning("history too short for technical indicators");
    }
    Ok(output)
}

/// Movement and indicator tables, shared with `analysis`.
pub fn tables(analysis: &PriceAnalysis) -> Vec<Table> {
    let mut tables = Vec::new();

    if let Some(movement) = &analysis.movement {
        let mut changes = Table::new(vec!["Period", "Reference", "Change"]).titled("Movement");
        changes.push(vec![
            String::from("1 session"),
            format!("{:.2}", movement.previous_close),
            signed_percent(movement.daily_change_percent),
        ]);
        for change in &movement.changes {
            changes.push(vec![
                format!("{} sessions", change.sessions),
                format!("{:.2}", change.reference_close),
                signed_percent(change.change_percent),
            ]);
        }
        changes.push(vec![
            String::from("range"),
            format!("{:.2} - {:.2}", movement.range_low, movement.range_high),
            String::new(),
        ]);
        changes.push(vec![
            String::from("volume"),
            optional(movement.last_volume),
            movement
                .volume_ratio
                .map_or_else(|| String::from("-"), |ratio| format!("{ratio:.2}x avg")),
        ]);
        tables.push(changes);
    }

    if let Some(technical) = &analysis.technical {
        let mut indicators = Table::new(vec!["Indicator", "Value", "Signal", "Score"])
            .titled(format!(
                "Technical ({}, score {:.1}, confidence {:.0}%)",
                technical.signal, technical.score, technical.confidence
            ));
        if let Some(macd) = &technical.macd {
            indicators.push(vec![
                String::from("MACD(12,26,9)"),
                format!("{:.3} / {:.3}", macd.macd, macd.signal_line),
                macd.signal.to_string(),
                format!("{:.1}", macd.score),
            ]);
        }
        if let Some(rsi) = &technical.rsi {
            indicators.push(vec![
                String::from("RSI(14)"),
                format!("{:.1}", rsi.value),
                rsi.signal.to_string(),
                format!("{:.1}", rsi.score),
            ]);
        }
        let averages = &technical.moving_averages;
        indicators.push(vec![
            String::from("SMA 20/50/200"),
            format!(
                "{} / {} / {}",
                two_places(averages.sma_20),
                two_places(averages.sma_50),
                two_places(averages.sma_200)
            ),
            averages.signal.to_string(),
            format!("{:.1}", averages.score),
        ]);
        if let Some(bands) = &technical.bollinger {
            indicators.push(vec![
                String::from("Bollinger %B"),
                format!("{:.1}", bands.percent_b),
                bands.signal.to_string(),
                format!("{:.1}", bands.score),
            ]);
        }
        tables.push(indicators);
    }
    tables
}

fn two_places(value: Option<f64>) -> String {
    value.map_or_else(|| String::from("-"), |v| format!("{v:.2}"))
}

fn signed_percent(value: Option<f64>) -> String {
    value.map_or_else(|| String::from("-"), |v| format!("{v:+.2}%"))
}
