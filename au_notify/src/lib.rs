//! ABOUTME: SMS delivery for one-time passcodes
//! ABOUTME: Twilio adapter plus log and in-memory senders for development and tests

use async_trait::async_trait;
use au_config::ExternalConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod adapters;

pub use adapters::{LogSender, MemorySender, TwilioSender};

/// Result type for SMS operations
pub type Result<T> = std::result::Result<T, NotificationError>;

/// Errors that can occur while delivering a message
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("SMS provider rejected message: {0}")]
    Rejected(String),
    #[error("SMS provider unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<NotificationError> for au_core::Error {
    fn from(err: NotificationError) -> Self {
        au_core::Error::External(err.to_string())
    }
}

/// A text message to one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsMessage {
    /// E.164 recipient number
    pub to: String,
    pub body: String,
}

impl SmsMessage {
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            body: body.into(),
        }
    }
}

/// Core trait for SMS adapters
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, message: &SmsMessage) -> Result<()>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Twilio when credentials are configured, otherwise the log sender
pub fn create_sender(external: &ExternalConfig) -> Arc<dyn SmsSender> {
    match &external.twilio {
        Some(twilio) => {
            tracing::info!("Using Twilio SMS sender");
            Arc::new(TwilioSender::new(twilio))
        }
        None => {
            tracing::warn!("No SMS provider configured; passcodes will be written to the log");
            Arc::new(LogSender)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use au_config::TwilioConfig;

    #[test]
    fn test_create_sender_picks_adapter() {
        let sender = create_sender(&ExternalConfig::default());
        assert_eq!(sender.name(), "log");

        let external = ExternalConfig {
            twilio: Some(TwilioConfig {
                account_sid: "AC123".to_string(),
                auth_token: "token".to_string(),
                from_number: "+15550000000".to_string(),
                base_url: None,
            }),
        };
        assert_eq!(create_sender(&external).name(), "twilio");
    }

    #[test]
    fn test_error_maps_to_external() {
        let err: au_core::Error = NotificationError::Rejected("invalid number".to_string()).into();
        assert!(matches!(err, au_core::Error::External(_)));
        assert!(err.to_string().contains("invalid number"));
    }
}
