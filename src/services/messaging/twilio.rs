use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::MessagingProvider;

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Longest body Twilio accepts for a single message request.
const MAX_BODY_CHARS: usize = 1600;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// SMS delivery for booking notifications. Without an account SID the
/// provider only logs, so local setups need no Twilio credentials.
pub struct TwilioSmsProvider {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct MessageResource {
    sid: String,
    status: Option<String>,
}

impl TwilioSmsProvider {
    pub fn new(
        account_sid: String,
        auth_token: String,
        from_number: String,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build Twilio client")?;
        Ok(Self {
            account_sid,
            auth_token,
            from_number,
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.from_number.is_empty()
    }
}

fn clamp_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let mut clipped: String = body.chars().take(MAX_BODY_CHARS - 3).collect();
    clipped.push_str("...");
    clipped
}

#[async_trait]
impl MessagingProvider for TwilioSmsProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        if !self.is_configured() {
            tracing::debug!(to, body, "SMS disabled, notification not sent");
            return Ok(());
        }

        let url = format!("{API_BASE}/Accounts/{}/Messages.json", self.account_sid);
        let body = clamp_body(body);

        let message: MessageResource = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body.as_str())])
            .send()
            .await
            .context("failed to reach Twilio")?
            .error_for_status()
            .context("Twilio rejected the message")?
            .json()
            .await
            .context("unexpected Twilio response")?;

        tracing::debug!(
            to,
            sid = %message.sid,
            status = message.status.as_deref().unwrap_or("unknown"),
            "notification SMS queued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_bodies_are_clipped() {
        assert_eq!(clamp_body("short"), "short");
        let long = "a".repeat(MAX_BODY_CHARS + 10);
        let clipped = clamp_body(&long);
        assert_eq!(clipped.chars().count(), MAX_BODY_CHARS);
        assert!(clipped.ends_with("..."));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_silent() {
        let provider = TwilioSmsProvider::new(String::new(), String::new(), String::new()).unwrap();
        assert!(!provider.is_configured());
        provider.send_message("+8801700000000", "hello").await.unwrap();
    }
}
