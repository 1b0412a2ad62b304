use std::sync::Arc;

use tickwise_core::monitor::{PriceMonitor, RuleOutcome};
use tickwise_core::notify::{DeliveryOutcome, Notifier, TelegramTransport, Transport};
use tickwise_core::RunStatus;

use super::Context;
use crate::cli::{MonitorArgs, MonitorCommand};
use crate::error::CliError;
use crate::output::{CommandOutput, Table};

pub async fn run(args: &MonitorArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let monitor = build_monitor(context)?;
    match args.command {
        MonitorCommand::Run => run_monitor(&monitor).await,
        MonitorCommand::Status => status(&monitor),
        MonitorCommand::Test => test(&monitor).await,
    }
}

fn build_monitor(context: &Context) -> Result<PriceMonitor, CliError> {
    let config = &context.config;
    let transport = config
        .price_monitor
        .notifications
        .telegram
        .credentials()
        .map(|(token, chat_id)| Arc::new(TelegramTransport::new(token, chat_id)) as Arc<dyn Transport>);
    let notifier = Notifier::new(transport, config.notification_settings());

    Ok(
        PriceMonitor::new(context.access.clone(), config.threshold_rules()?, notifier)
            .with_enabled(config.price_monitor.enabled),
    )
}

async fn run_monitor(monitor: &PriceMonitor) -> Result<CommandOutput, CliError> {
    let report = monitor.run().await;

    let mut table = Table::new(vec!["Rule", "Observed", "Result"]).titled("Thresholds");
    for outcome in &report.outcomes {
        let (observed, result) = match outcome {
            RuleOutcome::Triggered(event) => (event.observed.to_string(), String::from("triggered")),
            RuleOutcome::NotTriggered { observed, .. } => {
                (observed.to_string(), String::from("not triggered"))
            }
            RuleOutcome::Failed {
                reason, message, ..
            } => (String::from("-"), format!("failed ({reason}): {message}")),
        };
        table.push(vec![outcome.rule().to_string(), observed, result]);
    }

    let mut output = CommandOutput::new("monitor run", serde_json::to_value(&report)?)
        .with_status(report.status)
        .with_summary("rules", report.outcomes.len())
        .with_summary("triggered", report.triggered().len())
        .with_summary("failed", report.failed_count())
        .with_table(table);

    match &report.notification {
        None => {
            output = output.with_warning("price monitor is disabled; enable price_monitor.enabled");
        }
        Some(delivery) => {
            output = output.with_summary("notification", describe_delivery(delivery));
            if let DeliveryOutcome::Failed { last_error, .. } = delivery {
                output = output.with_warning(format!("alert was not delivered: {last_error}"));
            }
        }
    }
    Ok(output)
}

fn status(monitor: &PriceMonitor) -> Result<CommandOutput, CliError> {
    let status = monitor.status();
    let tickers = status
        .tickers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let mut rules = Table::new(vec!["Rule"]).titled("Rules");
    for rule in monitor.rules() {
        rules.push(vec![rule.to_string()]);
    }

    Ok(CommandOutput::new("monitor status", serde_json::to_value(&status)?)
        .with_summary("enabled", status.enabled)
        .with_summary("notifications", status.notifications_enabled)
        .with_summary("transport", status.transport.unwrap_or("none"))
        .with_summary("rule_count", status.rule_count)
        .with_summary("tickers", if tickers.is_empty() { String::from("-") } else { tickers })
        .with_table(rules))
}

async fn test(monitor: &PriceMonitor) -> Result<CommandOutput, CliError> {
    let report = monitor.test().await;
    let status = if report.notification.is_failure() {
        RunStatus::Failed
    } else {
        RunStatus::Success
    };

    let mut rules = Table::new(vec!["Rule"]).titled("Parsed rules");
    for rule in &report.rules {
        rules.push(vec![rule.clone()]);
    }

    Ok(CommandOutput::new("monitor test", serde_json::to_value(&report)?)
        .with_status(status)
        .with_summary("notification", describe_delivery(&report.notification))
        .with_table(rules))
}

fn describe_delivery(delivery: &DeliveryOutcome) -> String {
    match delivery {
        DeliveryOutcome::Delivered { attempts } => format!("delivered after {attempts} attempt(s)"),
        DeliveryOutcome::Skipped { reason } => format!("skipped: {}", reason.as_str()),
        DeliveryOutcome::Failed {
            attempts,
            last_error,
        } => format!("failed after {attempts} attempt(s): {last_error}"),
    }
}
