use async_trait::async_trait;
use tracing::info;

use crate::{Result, SmsMessage, SmsSender};

/// Writes messages to the log instead of sending them
///
/// Used when no SMS provider is configured, so local development can read
/// passcodes from the server output.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl SmsSender for LogSender {
    async fn send(&self, message: &SmsMessage) -> Result<()> {
        info!(to = %message.to, body = %message.body, "SMS (log sender)");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
