//! Alert delivery.
//!
//! [`Notifier`] renders triggered events into one message and hands it to a
//! [`Transport`]. Attempts are bounded and retried immediately; the caller
//! gets a [`DeliveryOutcome`] instead of an error.

mod telegram;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::monitor::TriggerEvent;
use crate::retry::{Backoff, RetryConfig};

pub use telegram::TelegramTransport;

pub const DEFAULT_TEMPLATE: &str =
    "✅ Price Alert: {triggered_count} threshold(s) triggered\n\n{details}";

const TEST_MESSAGE: &str = "🔔 tickwise test notification: delivery is configured correctly.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("transport rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("no notification transport is configured")]
    NotConfigured,
}

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

/// A channel that can deliver one text message.
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    fn send<'a>(&'a self, message: &'a str, timeout: Duration) -> TransportFuture<'a>;
}

/// Delivery is opt-in: the default settings are disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub enabled: bool,
    /// Supports `{triggered_count}` and `{details}` placeholders.
    pub template: String,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            template: DEFAULT_TEMPLATE.to_owned(),
            max_attempts: 3,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoEvents,
    Disabled,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoEvents => "no triggered thresholds",
            Self::Disabled => "notifications disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Skipped { reason: SkipReason },
    Failed { attempts: u32, last_error: String },
}

impl DeliveryOutcome {
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

pub struct Notifier {
    transport: Option<Arc<dyn Transport>>,
    settings: NotificationSettings,
}

impl Notifier {
    pub fn new(transport: Option<Arc<dyn Transport>>, settings: NotificationSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// A notifier that never sends anything.
    pub fn disabled() -> Self {
        Self::new(None, NotificationSettings::default())
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn transport_name(&self) -> Option<&'static str> {
        self.transport.as_ref().map(|transport| transport.name())
    }

    pub async fn notify(&self, events: &[TriggerEvent]) -> DeliveryOutcome {
        if events.is_empty() {
            debug!("no triggered thresholds, nothing to send");
            return DeliveryOutcome::Skipped {
                reason: SkipReason::NoEvents,
            };
        }
        if !self.settings.enabled {
            debug!(events = events.len(), "notifications disabled, skipping delivery");
            return DeliveryOutcome::Skipped {
                reason: SkipReason::Disabled,
            };
        }
        let message = render_message(&self.settings.template, events);
        self.deliver(&message).await
    }

    /// Send a fixed message to check the transport end to end.
    pub async fn send_test(&self) -> DeliveryOutcome {
        if !self.settings.enabled {
            return DeliveryOutcome::Skipped {
                reason: SkipReason::Disabled,
            };
        }
        self.deliver(TEST_MESSAGE).await
    }

    async fn deliver(&self, message: &str) -> DeliveryOutcome {
        let Some(transport) = self.transport.as_deref() else {
            warn!("notifications enabled but no transport is configured");
            return DeliveryOutcome::Failed {
                attempts: 0,
                last_error: TransportError::NotConfigured.to_string(),
            };
        };

        let timeout = self.settings.timeout;
        let retry = RetryConfig::with_total_attempts(
            self.settings.max_attempts,
            Backoff::Fixed {
                delay: Duration::ZERO,
            },
        );
        let attempted = retry
            .run(
                |_| async move {
                    match tokio::time::timeout(timeout, transport.send(message, timeout)).await {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::Timeout(timeout)),
                    }
                },
                |_| true,
            )
            .await;

        match attempted.result {
            Ok(()) => {
                info!(
                    transport = transport.name(),
                    attempts = attempted.attempts,
                    "notification delivered"
                );
                DeliveryOutcome::Delivered {
                    attempts: attempted.attempts,
                }
            }
            Err(error) => {
                warn!(
                    transport = transport.name(),
                    attempts = attempted.attempts,
                    %error,
                    "notification delivery failed"
                );
                DeliveryOutcome::Failed {
                    attempts: attempted.attempts,
                    last_error: error.to_string(),
                }
            }
        }
    }
}

/// Fill `template` with the event count and one detail line per event.
pub fn render_message(template: &str, events: &[TriggerEvent]) -> String {
    let details = events
        .iter()
        .map(TriggerEvent::describe)
        .collect::<Vec<_>>()
        .join("\n");
    template
        .replace("{triggered_count}", &events.len().to_string())
        .replace("{details}", &details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::ThresholdRule;
    use crate::UtcDateTime;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingTransport {
        calls: AtomicU32,
        fail_first: u32,
    }

    impl CountingTransport {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_first,
            })
        }
    }

    impl Transport for CountingTransport {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn send<'a>(&'a self, _message: &'a str, _timeout: Duration) -> TransportFuture<'a> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let fail = call <= self.fail_first;
            Box::pin(async move {
                if fail {
                    Err(TransportError::Request(String::from("connection reset")))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn enabled() -> NotificationSettings {
        NotificationSettings {
            enabled: true,
            ..NotificationSettings::default()
        }
    }

    fn event(rule: &str, observed: rust_decimal::Decimal) -> TriggerEvent {
        TriggerEvent {
            rule: rule.parse::<ThresholdRule>().expect("valid rule"),
            observed,
            as_of: UtcDateTime::now(),
        }
    }

    #[test]
    fn renders_count_and_details_in_order() {
        let events = [event("AAPL:gt:150", dec!(187.44)), event("NVDA:eq:500", dec!(500))];
        let message = render_message(DEFAULT_TEMPLATE, &events);
        assert_eq!(
            message,
            "✅ Price Alert: 2 threshold(s) triggered\n\n\
             AAPL gt 150 (observed 187.44)\n\
             NVDA eq 500 (observed 500)"
        );
    }

    #[tokio::test]
    async fn empty_events_never_touch_the_transport() {
        let transport = CountingTransport::new(0);
        let notifier = Notifier::new(Some(transport.clone()), enabled());

        let outcome = notifier.notify(&[]).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Skipped {
                reason: SkipReason::NoEvents
            }
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_settings_skip_delivery() {
        let transport = CountingTransport::new(0);
        let notifier = Notifier::new(Some(transport.clone()), NotificationSettings::default());

        let outcome = notifier.notify(&[event("AAPL:gt:1", dec!(2))]).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Skipped {
                reason: SkipReason::Disabled
            }
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_until_delivered() {
        let transport = CountingTransport::new(2);
        let notifier = Notifier::new(Some(transport.clone()), enabled());

        let outcome = notifier.notify(&[event("AAPL:gt:1", dec!(2))]).await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
    }

    #[tokio::test]
    async fn reports_failure_after_max_attempts() {
        let transport = CountingTransport::new(u32::MAX);
        let settings = NotificationSettings {
            max_attempts: 2,
            ..enabled()
        };
        let notifier = Notifier::new(Some(transport.clone()), settings);

        let outcome = notifier.notify(&[event("AAPL:gt:1", dec!(2))]).await;

        assert!(matches!(outcome, DeliveryOutcome::Failed { attempts: 2, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_transport_fails_without_attempts() {
        let notifier = Notifier::new(None, enabled());
        let outcome = notifier.send_test().await;
        assert!(matches!(outcome, DeliveryOutcome::Failed { attempts: 0, .. }));
    }

    #[tokio::test]
    async fn zero_max_attempts_still_makes_one_attempt() {
        let transport = CountingTransport::new(u32::MAX);
        let settings = NotificationSettings {
            max_attempts: 0,
            ..enabled()
        };
        let notifier = Notifier::new(Some(transport.clone()), settings);

        let outcome = notifier.notify(&[event("AAPL:gt:1", dec!(2))]).await;

        assert!(matches!(outcome, DeliveryOutcome::Failed { attempts: 1, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
