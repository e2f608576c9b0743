//! ABOUTME: Twilio SMS adapter using the Messages REST resource
//! ABOUTME: Posts form-encoded messages with account basic auth

use async_trait::async_trait;
use au_config::TwilioConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{NotificationError, Result, SmsMessage, SmsSender};

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    code: Option<i64>,
    message: String,
}

/// Twilio SMS adapter
#[derive(Debug)]
pub struct TwilioSender {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSender {
    pub fn new(config: &TwilioConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self::with_client(client, config)
    }

    pub fn with_client(client: Client, config: &TwilioConfig) -> Self {
        Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSender {
    async fn send(&self, message: &SmsMessage) -> Result<()> {
        debug!(to = %message.to, "Sending SMS via Twilio");

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", message.to.as_str()),
                ("From", self.from_number.as_str()),
                ("Body", message.body.as_str()),
            ])
            .send()
            .await
            .map_err(|e| NotificationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let sent: TwilioMessage = response.json().await?;
            info!(
                sid = %sent.sid,
                status = sent.status.as_deref().unwrap_or("unknown"),
                "SMS accepted by Twilio"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<TwilioError>(&body)
            .map(|e| match e.code {
                Some(code) => format!("{} (code {})", e.message, code),
                None => e.message,
            })
            .unwrap_or(body);

        warn!(status = %status, "Twilio rejected SMS: {}", detail);

        if status.is_server_error() {
            Err(NotificationError::Unavailable(format!("{}: {}", status, detail)))
        } else {
            Err(NotificationError::Rejected(format!("{}: {}", status, detail)))
        }
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/2010-04-01/Accounts/{}.json", self.base_url, self.account_sid);
        let response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotificationError::Unavailable(format!(
                "Twilio account check returned {}",
                response.status()
            )))
        }
    }

    fn name(&self) -> &str {
        "twilio"
    }
}
