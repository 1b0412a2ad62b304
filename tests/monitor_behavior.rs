//! Behaviour tests for threshold evaluation and alert delivery.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tickwise_core::cache::{CachePolicy, CacheStore, Category};
use tickwise_core::data_access::DataAccess;
use tickwise_core::monitor::{parse_rules, PriceMonitor, RuleOutcome, ThresholdRule};
use tickwise_core::notify::{
    DeliveryOutcome, NotificationSettings, Notifier, SkipReason, Transport, TransportError,
    TransportFuture,
};
use tickwise_core::provider::{FixtureProvider, ProviderError, ProviderErrorKind};
use tickwise_core::retry::RetryConfig;
use tickwise_core::{ConfigError, RunStatus, Symbol};

/// Records every message; fails the first `failures` sends.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    failures: Mutex<u32>,
}

impl RecordingTransport {
    fn failing(times: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(times),
        }
    }

    fn attempts(&self) -> usize {
        self.sent.lock().expect("sent log").len()
    }

    fn messages(&self) -> Vec<String> {
        self.sent.lock().expect("sent log").clone()
    }
}

impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send<'a>(&'a self, message: &'a str, _timeout: Duration) -> TransportFuture<'a> {
        self.sent.lock().expect("sent log").push(message.to_owned());
        let mut failures = self.failures.lock().expect("failure budget");
        let result = if *failures > 0 {
            *failures -= 1;
            Err(TransportError::Rejected {
                status: 502,
                body: String::from("bad gateway"),
            })
        } else {
            Ok(())
        };
        Box::pin(async move { result })
    }
}

struct Setup {
    provider: Arc<FixtureProvider>,
    transport: Arc<RecordingTransport>,
    monitor: PriceMonitor,
    _dir: TempDir,
}

fn setup(provider: FixtureProvider, rules: &[&str], transport: RecordingTransport) -> Setup {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(provider);
    let cache = Arc::new(CacheStore::open(dir.path(), CachePolicy::default()).expect("open cache"));
    let access = Arc::new(
        DataAccess::new(provider.clone(), cache).with_retry(RetryConfig::fixed(Duration::ZERO, 1)),
    );
    let transport = Arc::new(transport);
    let notifier = Notifier::new(
        Some(transport.clone() as Arc<dyn Transport>),
        NotificationSettings {
            enabled: true,
            ..NotificationSettings::default()
        },
    );
    let rules = parse_rules(rules).expect("valid rules");

    Setup {
        provider,
        transport,
        monitor: PriceMonitor::new(access, rules, notifier),
        _dir: dir,
    }
}

fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

fn triggered_rules(outcomes: &[RuleOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter(|outcome| matches!(outcome, RuleOutcome::Triggered(_)))
        .map(|outcome| outcome.rule().to_string())
        .collect()
}

// =============================================================================
// Parsing
// =============================================================================

#[test]
fn when_expression_lacks_colons_it_is_a_configuration_error() {
    let err = "AAPL>150".parse::<ThresholdRule>().expect_err("must fail");
    assert!(matches!(err, ConfigError::InvalidThreshold { .. }));
}

// =============================================================================
// Evaluation
// =============================================================================

#[tokio::test]
async fn when_price_exceeds_threshold_gt_rule_triggers() {
    // AAPL trades at 187.44 in the demo fixtures.
    let setup = setup(
        FixtureProvider::demo(),
        &["AAPL:gt:150", "AAPL:gt:187.44", "AAPL:gt:200"],
        RecordingTransport::default(),
    );

    let report = setup.monitor.evaluate().await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(triggered_rules(&report.outcomes), ["AAPL:gt:150"]);
    assert!(report.notification.is_none());
}

#[tokio::test]
async fn when_rule_uses_eq_only_an_exact_price_triggers() {
    // NVDA trades at 500.00 in the demo fixtures.
    let setup = setup(
        FixtureProvider::demo(),
        &["NVDA:eq:500", "NVDA:eq:500.01", "NVDA:eq:499.99"],
        RecordingTransport::default(),
    );

    let report = setup.monitor.evaluate().await;

    assert_eq!(triggered_rules(&report.outcomes), ["NVDA:eq:500"]);
}

#[tokio::test]
async fn when_two_rules_share_a_ticker_price_is_fetched_once() {
    let setup = setup(
        FixtureProvider::demo(),
        &["AAPL:gt:100", "AAPL:lt:200"],
        RecordingTransport::default(),
    );

    let report = setup.monitor.evaluate().await;

    assert_eq!(
        setup.provider.calls_for(Category::PriceData, &symbol("AAPL")),
        1
    );
    assert_eq!(triggered_rules(&report.outcomes).len(), 2);
}

#[tokio::test]
async fn when_one_ticker_fails_its_rules_fail_and_others_still_evaluate() {
    let provider = FixtureProvider::demo()
        .fail_always(symbol("MSFT"), ProviderError::unavailable("down"));
    let setup = setup(
        provider,
        &["MSFT:gt:1", "AAPL:gt:1", "MSFT:lt:1000"],
        RecordingTransport::default(),
    );

    let report = setup.monitor.evaluate().await;

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.failed_count(), 2);
    assert!(matches!(
        &report.outcomes[0],
        RuleOutcome::Failed {
            reason: ProviderErrorKind::Unavailable,
            ..
        }
    ));
    assert_eq!(triggered_rules(&report.outcomes), ["AAPL:gt:1"]);
}

#[tokio::test]
async fn when_every_ticker_is_unavailable_run_fails() {
    let provider = FixtureProvider::demo()
        .fail_always(symbol("AAPL"), ProviderError::unavailable("down"));
    let setup = setup(provider, &["AAPL:gt:1"], RecordingTransport::default());

    let report = setup.monitor.run().await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(
        report.notification,
        Some(DeliveryOutcome::Skipped {
            reason: SkipReason::NoEvents
        })
    );
}

// =============================================================================
// Notification
// =============================================================================

#[tokio::test]
async fn when_rules_trigger_one_message_lists_them_in_order() {
    let setup = setup(
        FixtureProvider::demo(),
        &["NVDA:eq:500", "AAPL:lt:100", "AAPL:gt:150"],
        RecordingTransport::default(),
    );

    let report = setup.monitor.run().await;

    assert_eq!(
        report.notification,
        Some(DeliveryOutcome::Delivered { attempts: 1 })
    );
    assert_eq!(
        setup.transport.messages(),
        ["✅ Price Alert: 2 threshold(s) triggered\n\n\
          NVDA eq 500 (observed 500.00)\n\
          AAPL gt 150 (observed 187.44)"]
    );
}

#[tokio::test]
async fn when_nothing_triggers_transport_is_never_called() {
    let setup = setup(
        FixtureProvider::demo(),
        &["AAPL:gt:10000"],
        RecordingTransport::default(),
    );

    let report = setup.monitor.run().await;

    assert_eq!(
        report.notification,
        Some(DeliveryOutcome::Skipped {
            reason: SkipReason::NoEvents
        })
    );
    assert_eq!(setup.transport.attempts(), 0);
}

#[tokio::test]
async fn when_delivery_keeps_failing_run_reports_it_without_reevaluating() {
    let setup = setup(
        FixtureProvider::demo(),
        &["AAPL:gt:150"],
        RecordingTransport::failing(u32::MAX),
    );

    let report = setup.monitor.run().await;

    assert!(matches!(
        report.notification,
        Some(DeliveryOutcome::Failed { attempts: 3, .. })
    ));
    assert_eq!(setup.transport.attempts(), 3);
    assert_eq!(triggered_rules(&report.outcomes), ["AAPL:gt:150"]);
    assert_eq!(
        setup.provider.calls_for(Category::PriceData, &symbol("AAPL")),
        1
    );
}

#[tokio::test]
async fn when_delivery_fails_once_the_retry_delivers() {
    let setup = setup(
        FixtureProvider::demo(),
        &["AAPL:gt:150"],
        RecordingTransport::failing(1),
    );

    let report = setup.monitor.run().await;

    assert_eq!(
        report.notification,
        Some(DeliveryOutcome::Delivered { attempts: 2 })
    );
}

// =============================================================================
// Enablement, status and test
// =============================================================================

#[tokio::test]
async fn when_monitor_is_disabled_run_fetches_nothing() {
    let Setup {
        provider,
        transport,
        monitor,
        _dir,
    } = setup(
        FixtureProvider::demo(),
        &["AAPL:gt:150"],
        RecordingTransport::default(),
    );
    let monitor = monitor.with_enabled(false);

    let report = monitor.run().await;

    assert!(report.outcomes.is_empty());
    assert!(report.notification.is_none());
    assert_eq!(provider.total_calls(), 0);
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn when_status_is_requested_distinct_tickers_keep_first_appearance_order() {
    let setup = setup(
        FixtureProvider::demo(),
        &["NVDA:gt:1", "AAPL:gt:1", "NVDA:lt:1000"],
        RecordingTransport::default(),
    );

    let status = setup.monitor.status();

    assert!(status.enabled);
    assert!(status.notifications_enabled);
    assert_eq!(status.transport, Some("recording"));
    assert_eq!(status.rule_count, 3);
    assert_eq!(status.tickers, [symbol("NVDA"), symbol("AAPL")]);
    assert_eq!(setup.provider.total_calls(), 0);
}

#[tokio::test]
async fn when_testing_a_single_message_is_sent_without_fetching() {
    let setup = setup(
        FixtureProvider::demo(),
        &["AAPL:gt:150"],
        RecordingTransport::default(),
    );

    let report = setup.monitor.test().await;

    assert_eq!(report.rules, ["AAPL:gt:150"]);
    assert_eq!(report.notification, DeliveryOutcome::Delivered { attempts: 1 });
    assert_eq!(setup.transport.attempts(), 1);
    assert_eq!(setup.provider.total_calls(), 0);
}
