use async_trait::async_trait;
use eldercare_core::config::NotificationConfig;
use eldercare_core::{Error, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outbound text messaging to caregivers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<Value>;
    fn channel(&self) -> &'static str;
}

/// Real SMS gateway when credentials are present, log-only otherwise.
pub fn notifier_from_config(config: &NotificationConfig) -> Arc<dyn Notifier> {
    if config.twilio_configured() {
        info!("SMS notifications via Twilio");
        Arc::new(TwilioNotifier::new(
            config.twilio_account_sid.clone().unwrap_or_default(),
            config.twilio_auth_token.clone().unwrap_or_default(),
            config.twilio_from_number.clone().unwrap_or_default(),
            Duration::from_secs(config.timeout_secs),
        ))
    } else {
        warn!("Twilio credentials not configured, notifications are simulated");
        Arc::new(SimulatedNotifier)
    }
}

// ═══════════════════════════════════════════════════════════
// SMS via Twilio
// ═══════════════════════════════════════════════════════════

pub struct TwilioNotifier {
    client: Client,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioNotifier {
    pub fn new(account_sid: String, auth_token: String, from: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build Twilio HTTP client, using default");
            Client::new()
        });
        Self {
            client,
            account_sid,
            auth_token,
            from,
        }
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<Value> {
        let response = self
            .client
            .post(format!(
                "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
                self.account_sid
            ))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| Error::Notification(format!("Twilio API failed: {}", e)))?;

        let status = response.status();
        let data: Value = response
            .json()
            .await
            .map_err(|e| Error::Notification(format!("Failed to parse Twilio response: {}", e)))?;

        if !status.is_success() {
            let err_msg = data["message"].as_str().unwrap_or("Unknown error");
            return Err(Error::Notification(format!("Twilio error {}: {}", status, err_msg)));
        }

        info!(to = %to, sid = %data["sid"], "SMS sent");
        Ok(json!({
            "status": "sent",
            "channel": "sms",
            "sid": data["sid"],
            "to": to,
        }))
    }

    fn channel(&self) -> &'static str {
        "sms"
    }
}

// ═══════════════════════════════════════════════════════════
// Simulated delivery
// ═══════════════════════════════════════════════════════════

pub struct SimulatedNotifier;

#[async_trait]
impl Notifier for SimulatedNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<Value> {
        info!(to = %to, body = %body, "[SIMULATED SMS]");
        Ok(json!({
            "status": "simulated",
            "channel": "log",
            "to": to,
        }))
    }

    fn channel(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_without_credentials() {
        let config = NotificationConfig::default();
        assert_eq!(notifier_from_config(&config).channel(), "simulated");
    }

    #[test]
    fn test_twilio_with_credentials() {
        let config = NotificationConfig {
            twilio_account_sid: Some("AC123".into()),
            twilio_auth_token: Some("secret".into()),
            twilio_from_number: Some("+15550009999".into()),
            ..NotificationConfig::default()
        };
        assert_eq!(notifier_from_config(&config).channel(), "sms");
    }

    #[tokio::test]
    async fn test_simulated_send_reports_status() {
        let out = SimulatedNotifier.send("+1555", "hello").await.unwrap();
        assert_eq!(out["status"], "simulated");
        assert_eq!(out["to"], "+1555");
    }
}
