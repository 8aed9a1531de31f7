//! Spending report formatting and multi-channel delivery.
//!
//! Converts a [`SpendingReport`] into the fixed message template and drives
//! delivery: WhatsApp first (with a best-effort delivery-status
//! confirmation), then SMS as the reduced fallback channel.

pub mod delivery;
pub mod variants;

use crate::calculator::SpendingReport;
use crate::config::TwilioConfig;
use crate::error::{DaemonError, Result};
use crate::notifier::delivery::{Delivered, send_with_fallback};
use crate::notifier::variants::{mask_for_logs, sms_variants, whatsapp_variants};
use crate::twilio::MessagingClient;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Which channel carried a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    WhatsApp,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WhatsApp => write!(f, "whatsapp"),
            Self::Sms => write!(f, "sms"),
        }
    }
}

/// Result of a successful notification.
#[derive(Debug, Clone)]
pub struct DeliverySummary {
    /// Channel that accepted the message.
    pub channel: Channel,
    /// Provider message SID.
    pub sid: String,
    /// Attempts made on the accepting channel.
    pub attempts: usize,
}

/// Render the fixed spending-update template, all amounts at 2 decimals.
pub fn format_message(report: &SpendingReport) -> String {
    format!(
        "Good morning {}! Today's spending limit: ${:.2}. This month spent: ${:.2}. \
         Last month total: ${:.2}. Daily average last month: ${:.2}",
        report.recipient_name,
        report.daily_limit,
        report.monthly_spent,
        report.last_month_spent,
        report.average_daily_last_month,
    )
}

/// Formats reports and delivers them over the configured channels.
pub struct Notifier {
    client: Arc<dyn MessagingClient>,
    addresses: TwilioConfig,
}

impl Notifier {
    pub fn new(client: Arc<dyn MessagingClient>, addresses: &TwilioConfig) -> Self {
        Self {
            client,
            addresses: addresses.clone(),
        }
    }

    /// Format and deliver a spending report.
    ///
    /// Channels are tried in a fixed order; a channel that fails for any
    /// reason (missing addresses, exhausted variants, fatal provider error)
    /// is logged and the next channel is tried. The last channel's error is
    /// surfaced when all of them fail.
    pub async fn send_spending_update(&self, report: &SpendingReport) -> Result<DeliverySummary> {
        let message = format_message(report);
        let mut last_error: Option<DaemonError> = None;

        for channel in [Channel::WhatsApp, Channel::Sms] {
            let result = match channel {
                Channel::WhatsApp => self.send_whatsapp(&message).await,
                Channel::Sms => self.send_sms(&message).await,
            };
            match result {
                Ok(summary) => {
                    info!(
                        channel = %summary.channel,
                        sid = %summary.sid,
                        attempts = summary.attempts,
                        "spending update delivered"
                    );
                    return Ok(summary);
                }
                Err(err) => {
                    error!(channel = %channel, error = %err, "channel delivery failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DaemonError::Delivery("no channels configured".to_owned())))
    }

    /// Deliver over WhatsApp with a best-effort status confirmation.
    pub async fn send_whatsapp(&self, message: &str) -> Result<DeliverySummary> {
        let (sources, destinations) = self.whatsapp_addresses(None)?;
        let delivered = send_with_fallback(
            self.client.as_ref(),
            message,
            &sources,
            &destinations,
        )
        .await
        .map_err(|e| DaemonError::Delivery(format!("whatsapp: {e}")))?;

        self.confirm_delivery(&delivered).await;
        Ok(DeliverySummary {
            channel: Channel::WhatsApp,
            sid: delivered.receipt.sid,
            attempts: delivered.attempts,
        })
    }

    /// Deliver over SMS. The reduced machine: same variant fallback, no
    /// post-send status check.
    pub async fn send_sms(&self, message: &str) -> Result<DeliverySummary> {
        let from = non_empty(&self.addresses.sms_from, "TWILIO_PHONE_NUMBER")?;
        let to = non_empty(&self.addresses.sms_to, "YOUR_PHONE_NUMBER")?;

        let delivered = send_with_fallback(
            self.client.as_ref(),
            message,
            &sms_variants(from),
            &sms_variants(to),
        )
        .await
        .map_err(|e| DaemonError::Delivery(format!("sms: {e}")))?;

        Ok(DeliverySummary {
            channel: Channel::Sms,
            sid: delivered.receipt.sid,
            attempts: delivered.attempts,
        })
    }

    /// Send a plain "hello" over WhatsApp, used by the control surface to
    /// verify messaging wiring without a report.
    pub async fn send_hello(&self, to_override: Option<&str>) -> Result<DeliverySummary> {
        let (sources, destinations) = self.whatsapp_addresses(to_override)?;
        let delivered = send_with_fallback(self.client.as_ref(), "hello", &sources, &destinations)
            .await
            .map_err(|e| DaemonError::Delivery(format!("whatsapp hello: {e}")))?;

        Ok(DeliverySummary {
            channel: Channel::WhatsApp,
            sid: delivered.receipt.sid,
            attempts: delivered.attempts,
        })
    }

    fn whatsapp_addresses(&self, to_override: Option<&str>) -> Result<(Vec<String>, Vec<String>)> {
        let from = non_empty(&self.addresses.whatsapp_from, "TWILIO_WHATSAPP_FROM")?;
        let to = match to_override {
            Some(to) => non_empty(to, "to override")?,
            None => non_empty(&self.addresses.whatsapp_to, "YOUR_WHATSAPP_NUMBER")?,
        };
        info!(
            from = %mask_for_logs(from),
            to = %mask_for_logs(to),
            "whatsapp address check"
        );
        Ok((whatsapp_variants(from, true), whatsapp_variants(to, false)))
    }

    /// Query the provider for the delivered message's status. Failures here
    /// never invalidate the send; they only produce a warning.
    async fn confirm_delivery(&self, delivered: &Delivered) {
        match self.client.fetch_status(&delivered.receipt.sid).await {
            Ok(status) => info!(
                sid = %delivered.receipt.sid,
                status = %status.status,
                error_code = ?status.error_code,
                error_message = ?status.error_message,
                "delivery status"
            ),
            Err(err) => warn!(
                sid = %delivered.receipt.sid,
                error = %err,
                "cannot fetch delivery status"
            ),
        }
    }
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DaemonError::Config(format!("{what} is not set")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::notifier::delivery::testing::{Script, ScriptedClient};

    fn report() -> SpendingReport {
        SpendingReport {
            recipient_name: "Lucas".to_owned(),
            daily_limit: 100.0,
            monthly_spent: 80.0,
            last_month_spent: 123.4,
            average_daily_last_month: 2.58,
        }
    }

    fn addresses() -> TwilioConfig {
        TwilioConfig {
            sms_from: "+15550001111".to_owned(),
            sms_to: "+15552223333".to_owned(),
            whatsapp_from: "+15550001111".to_owned(),
            whatsapp_to: "+15552223333".to_owned(),
            ..TwilioConfig::default()
        }
    }

    #[test]
    fn message_template_interpolates_two_decimal_amounts() {
        let message = format_message(&report());
        assert_eq!(
            message,
            "Good morning Lucas! Today's spending limit: $100.00. This month spent: $80.00. \
             Last month total: $123.40. Daily average last month: $2.58"
        );
    }

    #[tokio::test]
    async fn whatsapp_success_confirms_status() {
        let client = Arc::new(ScriptedClient::new(vec![Script::Ok("SM1")]));
        let notifier = Notifier::new(client.clone(), &addresses());

        let summary = notifier
            .send_spending_update(&report())
            .await
            .expect("delivered");
        assert_eq!(summary.channel, Channel::WhatsApp);
        assert_eq!(summary.sid, "SM1");
        assert_eq!(client.status_queries.lock().unwrap().as_slice(), ["SM1"]);
    }

    #[tokio::test]
    async fn status_fetch_failure_does_not_invalidate_the_send() {
        let client = Arc::new(ScriptedClient::new(vec![Script::Ok("SM1")]));
        *client.status_result.lock().unwrap() =
            Some(Err(ScriptedClient::fatal("status backend down")));
        let notifier = Notifier::new(client.clone(), &addresses());

        let summary = notifier.send_whatsapp("hi").await.expect("still delivered");
        assert_eq!(summary.sid, "SM1");
    }

    #[tokio::test]
    async fn falls_back_to_sms_when_whatsapp_is_unconfigured() {
        let mut cfg = addresses();
        cfg.whatsapp_from = String::new();
        let client = Arc::new(ScriptedClient::new(vec![Script::Ok("SM9")]));
        let notifier = Notifier::new(client.clone(), &cfg);

        let summary = notifier
            .send_spending_update(&report())
            .await
            .expect("sms fallback");
        assert_eq!(summary.channel, Channel::Sms);
        // SMS is the reduced machine: no status confirmation.
        assert!(client.status_queries.lock().unwrap().is_empty());
        let attempts = client.attempts.lock().unwrap().clone();
        assert_eq!(attempts[0].0, "+15550001111");
    }

    #[tokio::test]
    async fn falls_back_to_sms_after_whatsapp_exhausts_variants() {
        // 2 source x 3 destination WhatsApp pairs all rejected, then SMS ok.
        let mut script: Vec<Script> = (0..6)
            .map(|_| Script::Err(ScriptedClient::invalid_address("bad number")))
            .collect();
        script.push(Script::Ok("SM-sms"));
        let client = Arc::new(ScriptedClient::new(script));
        let notifier = Notifier::new(client.clone(), &addresses());

        let summary = notifier
            .send_spending_update(&report())
            .await
            .expect("sms fallback");
        assert_eq!(summary.channel, Channel::Sms);
        assert_eq!(summary.sid, "SM-sms");
        assert_eq!(client.attempts.lock().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn all_channels_failing_surfaces_the_last_error() {
        let script: Vec<Script> = (0..10)
            .map(|_| Script::Err(ScriptedClient::invalid_address("bad number")))
            .collect();
        let client = Arc::new(ScriptedClient::new(script));
        let notifier = Notifier::new(client, &addresses());

        let err = notifier
            .send_spending_update(&report())
            .await
            .expect_err("all channels fail");
        assert!(matches!(err, DaemonError::Delivery(_)), "got {err:?}");
        assert!(err.to_string().contains("sms"));
    }

    #[tokio::test]
    async fn hello_uses_the_override_destination() {
        let client = Arc::new(ScriptedClient::new(vec![Script::Ok("SM-hello")]));
        let notifier = Notifier::new(client.clone(), &addresses());

        let summary = notifier
            .send_hello(Some("+15559998888"))
            .await
            .expect("hello sent");
        assert_eq!(summary.sid, "SM-hello");
        let attempts = client.attempts.lock().unwrap().clone();
        assert_eq!(attempts[0].1, "whatsapp:+15559998888");
    }
}
