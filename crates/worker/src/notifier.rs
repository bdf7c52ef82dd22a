//! Resend-backed notifier
//!
//! Implements the engine's notifier contract over the Resend email API.
//! Configuration state is explicit: an unconfigured notifier reports itself
//! as such at startup and fails every send with `NotConfigured`, instead of
//! pretending deliveries succeeded.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use prodmap_usage::{template, EngineError, EngineResult, Notifier};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

enum Mode {
    Configured { api_key: String },
    Unconfigured,
}

pub struct ResendNotifier {
    client: reqwest::Client,
    mode: Mode,
    from: String,
}

impl ResendNotifier {
    /// Build from `RESEND_API_KEY` and `EMAIL_FROM`. A missing or empty key
    /// yields an unconfigured notifier; the caller decides how loudly to
    /// surface that (the worker logs it as a startup warning).
    pub fn from_env() -> Self {
        let mode = match std::env::var("RESEND_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Mode::Configured { api_key: key },
            _ => Mode::Unconfigured,
        };
        let from = std::env::var("EMAIL_FROM")
            .unwrap_or_else(|_| "ProdMap <alerts@prodmap.app>".to_string());
        Self {
            client: reqwest::Client::new(),
            mode,
            from,
        }
    }

    fn render(template_id: &str, params: &Value) -> (String, String) {
        match template_id {
            template::USAGE_ALERT => {
                let metric = params["metric_label"].as_str().unwrap_or("a resource");
                let band = params["band"].as_str().unwrap_or("warning");
                let percentage = params["percentage"].as_f64().unwrap_or(0.0);
                let subject = if band == "overage" {
                    format!("Your workspace is over its {metric} limit")
                } else {
                    format!("Your workspace is at {percentage:.0}% of its {metric} limit")
                };
                let body = format!(
                    "Usage of {metric} is at {percentage:.0}% of your plan limit ({} of {}).\n\
                     Upgrade your plan or reduce usage to avoid interruptions.",
                    params["current"].as_f64().unwrap_or(0.0),
                    params["limit"].as_u64().unwrap_or(0),
                );
                (subject, body)
            }
            template::BILLING_REMINDER => {
                let days = params["days_until_billing"].as_i64().unwrap_or(0);
                let amount = params["amount_cents"].as_i64().unwrap_or(0) as f64 / 100.0;
                let currency = params["currency"].as_str().unwrap_or("usd").to_uppercase();
                (
                    format!("Your subscription renews in {days} day(s)"),
                    format!(
                        "Your {} plan renews in {days} day(s) for {amount:.2} {currency}.",
                        params["tier"].as_str().unwrap_or("current"),
                    ),
                )
            }
            template::UPGRADE_SUGGESTION => (
                "Your workspace is outgrowing its plan".to_string(),
                params["reason"].as_str().unwrap_or_default().to_string(),
            ),
            other => (format!("ProdMap notification: {other}"), params.to_string()),
        }
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(
        &self,
        recipient: &str,
        template_id: &str,
        params: Value,
    ) -> EngineResult<()> {
        let Mode::Configured { api_key } = &self.mode else {
            return Err(EngineError::NotConfigured("notifier"));
        };

        let (subject, body) = Self::render(template_id, &params);
        let response = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(api_key)
            .json(&json!({
                "from": self.from,
                "to": [recipient],
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .map_err(|e| EngineError::Notification {
                recipient: recipient.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::Notification {
                recipient: recipient.to_string(),
                reason: format!("resend returned {status}: {detail}"),
            });
        }

        debug!(recipient = %recipient, template = %template_id, "notification sent");
        Ok(())
    }

    fn is_configured(&self) -> bool {
        matches!(self.mode, Mode::Configured { .. })
    }
}
