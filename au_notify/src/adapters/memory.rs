//! ABOUTME: In-memory SMS sender that records outgoing messages
//! ABOUTME: Lets tests read delivered passcodes and simulate provider outages

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use crate::{NotificationError, Result, SmsMessage, SmsSender};

#[derive(Debug, Default)]
pub struct MemorySender {
    sent: Mutex<Vec<SmsMessage>>,
    failing: AtomicBool,
}

impl MemorySender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with `Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn sent(&self) -> Vec<SmsMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str) -> Option<SmsMessage> {
        self.sent().into_iter().rev().find(|m| m.to == to)
    }
}

#[async_trait]
impl SmsSender for MemorySender {
    async fn send(&self, message: &SmsMessage) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(NotificationError::Unavailable(
                "memory sender set to fail".to_string(),
            ));
        }
        self.sent
            .lock()
            .map_err(|e| NotificationError::Unavailable(e.to_string()))?
            .push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_fails_on_demand() {
        let sender = MemorySender::new();
        sender
            .send(&SmsMessage::new("+15550000001", "one"))
            .await
            .unwrap();
        sender
            .send(&SmsMessage::new("+15550000001", "two"))
            .await
            .unwrap();

        assert_eq!(sender.sent().len(), 2);
        assert_eq!(sender.last_to("+15550000001").unwrap().body, "two");
        assert!(sender.last_to("+15550000002").is_none());

        sender.set_failing(true);
        assert!(sender
            .send(&SmsMessage::new("+15550000001", "three"))
            .await
            .is_err());
        assert_eq!(sender.sent().len(), 2);
    }
}
