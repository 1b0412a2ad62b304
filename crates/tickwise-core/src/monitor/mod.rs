//! Price threshold monitoring.
//!
//! A run fetches one price per distinct ticker, evaluates every rule against
//! it and passes the triggered events to the [`Notifier`]. A failed fetch
//! only fails the rules of that ticker.

mod threshold;

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::data_access::DataAccess;
use crate::notify::{DeliveryOutcome, Notifier};
use crate::provider::{ProviderError, ProviderErrorKind};
use crate::{PriceSnapshot, RunStatus, Symbol, UtcDateTime};

pub use threshold::{parse_rules, Operator, ThresholdRule};

/// A rule that held for the observed price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerEvent {
    pub rule: ThresholdRule,
    pub observed: Decimal,
    pub as_of: UtcDateTime,
}

impl TriggerEvent {
    /// `AAPL gt 150 (observed 187.44)`
    pub fn describe(&self) -> String {
        format!(
            "{} {} {} (observed {})",
            self.rule.symbol, self.rule.operator, self.rule.value, self.observed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RuleOutcome {
    Triggered(TriggerEvent),
    NotTriggered {
        rule: ThresholdRule,
        observed: Decimal,
    },
    Failed {
        rule: ThresholdRule,
        reason: ProviderErrorKind,
        message: String,
    },
}

impl RuleOutcome {
    pub fn rule(&self) -> &ThresholdRule {
        match self {
            Self::Triggered(event) => &event.rule,
            Self::NotTriggered { rule, .. } | Self::Failed { rule, .. } => rule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub status: RunStatus,
    pub outcomes: Vec<RuleOutcome>,
    /// `None` when the run did not reach the notification step.
    pub notification: Option<DeliveryOutcome>,
}

impl MonitorReport {
    fn empty() -> Self {
        Self {
            status: RunStatus::Success,
            outcomes: Vec::new(),
            notification: None,
        }
    }

    pub fn triggered(&self) -> Vec<TriggerEvent> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                RuleOutcome::Triggered(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, RuleOutcome::Failed { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub enabled: bool,
    pub notifications_enabled: bool,
    pub transport: Option<&'static str>,
    pub rule_count: usize,
    pub tickers: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorTestReport {
    pub rules: Vec<String>,
    pub notification: DeliveryOutcome,
}

pub struct PriceMonitor {
    access: Arc<DataAccess>,
    rules: Vec<ThresholdRule>,
    enabled: bool,
    notifier: Notifier,
}

impl PriceMonitor {
    pub fn new(access: Arc<DataAccess>, rules: Vec<ThresholdRule>, notifier: Notifier) -> Self {
        Self {
            access,
            rules,
            enabled: true,
            notifier,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    /// Distinct tickers in order of first appearance.
    pub fn tickers(&self) -> Vec<Symbol> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&rule.symbol) {
                seen.push(rule.symbol.clone());
            }
        }
        seen
    }

    /// Evaluate every rule without notifying.
    pub async fn evaluate(&self) -> MonitorReport {
        let tickers = self.tickers();
        let mut prices: BTreeMap<Symbol, Result<PriceSnapshot, ProviderError>> = BTreeMap::new();
        for symbol in &tickers {
            let result = self.access.price(symbol).await;
            if let Err(error) = &result {
                warn!(%symbol, kind = %error.kind(), %error, "price unavailable, rules for ticker fail");
            }
            prices.insert(symbol.clone(), result);
        }

        let outcomes: Vec<RuleOutcome> = self
            .rules
            .iter()
            .map(|rule| match prices.get(&rule.symbol) {
                Some(Ok(snapshot)) if rule.matches(snapshot.price) => {
                    RuleOutcome::Triggered(TriggerEvent {
                        rule: rule.clone(),
                        observed: snapshot.price,
                        as_of: snapshot.as_of,
                    })
                }
                Some(Ok(snapshot)) => RuleOutcome::NotTriggered {
                    rule: rule.clone(),
                    observed: snapshot.price,
                },
                Some(Err(error)) => RuleOutcome::Failed {
                    rule: rule.clone(),
                    reason: error.kind(),
                    message: error.message().to_owned(),
                },
                None => RuleOutcome::Failed {
                    rule: rule.clone(),
                    reason: ProviderErrorKind::InvalidData,
                    message: format!("no price evaluated for {}", rule.symbol),
                },
            })
            .collect();

        let failed_tickers = prices.values().filter(|result| result.is_err()).count();
        let unavailable = prices
            .values()
            .filter(|result| {
                matches!(result, Err(error) if error.kind() == ProviderErrorKind::Unavailable)
            })
            .count();

        MonitorReport {
            status: RunStatus::from_counts(tickers.len(), failed_tickers, unavailable),
            outcomes,
            notification: None,
        }
    }

    /// Evaluate every rule and notify about the triggered ones.
    ///
    /// A failed delivery is logged and reported; rules are not re-evaluated.
    pub async fn run(&self) -> MonitorReport {
        if !self.enabled {
            info!("price monitor disabled, skipping run");
            return MonitorReport::empty();
        }

        let mut report = self.evaluate().await;
        let events = report.triggered();
        let delivery = self.notifier.notify(&events).await;
        if let DeliveryOutcome::Failed {
            attempts,
            last_error,
        } = &delivery
        {
            warn!(attempts, error = %last_error, "alert notification was not delivered");
        }

        info!(
            rules = self.rules.len(),
            triggered = events.len(),
            failed = report.failed_count(),
            status = report.status.as_str(),
            "price monitor run complete"
        );
        report.notification = Some(delivery);
        report
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            enabled: self.enabled,
            notifications_enabled: self.notifier.is_enabled(),
            transport: self.notifier.transport_name(),
            rule_count: self.rules.len(),
            tickers: self.tickers(),
        }
    }

    /// List the configured rules and send a test message through the notifier.
    pub async fn test(&self) -> MonitorTestReport {
        MonitorTestReport {
            rules: self.rules.iter().map(ToString::to_string).collect(),
            notification: self.notifier.send_test().await,
        }
    }
}
