//! In-process mail-watch hub.
//!
//! Keeps the set of watched mailboxes and turns push notifications
//! (`{emailAddress, historyId}`) into [`MailEvent`](crate::domain::MailEvent)s. A notification only
//! produces an event when its history id moves past the last one seen for
//! that mailbox, so each history delta is reported once.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use serde::Deserialize;

use super::MailWatch;
use crate::domain::MailBus;
use crate::error::MailWatchError;

/// Decoded push notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailPush {
    /// Mailbox the notification is about.
    pub email_address: String,
    /// Mail history position after the change.
    #[serde(deserialize_with = "history_id")]
    pub history_id: u64,
}

impl MailPush {
    /// Decodes the base64 `message.data` field of a push envelope.
    ///
    /// # Errors
    ///
    /// Returns [`MailWatchError::MalformedPush`] if the data is not base64
    /// encoded JSON of the expected shape.
    pub fn from_base64(data: &str) -> Result<Self, MailWatchError> {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| MailWatchError::MalformedPush(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| MailWatchError::MalformedPush(e.to_string()))
    }
}

fn history_id<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// What [`MailWatchHub::notify`] did with a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// A [`MailEvent`](crate::domain::MailEvent) was published.
    Published,
    /// Nobody asked to watch this mailbox.
    NotWatched,
    /// The history id was not newer than the last one seen.
    Stale,
}

#[derive(Debug, Default)]
struct WatchedMailbox {
    history_id: Option<u64>,
}

/// Watched-mailbox registry and push intake.
#[derive(Debug)]
pub struct MailWatchHub {
    mailboxes: Mutex<HashMap<String, WatchedMailbox>>,
    bus: MailBus,
}

impl MailWatchHub {
    /// Creates a hub publishing on `bus`.
    #[must_use]
    pub fn new(bus: MailBus) -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Returns the bus events are published on.
    #[must_use]
    pub fn bus(&self) -> &MailBus {
        &self.bus
    }

    /// Returns `true` if `mailbox` is being watched.
    #[must_use]
    pub fn is_watching(&self, mailbox: &str) -> bool {
        self.mailboxes.lock().contains_key(&normalize(mailbox))
    }

    /// Returns the watched mailboxes, sorted.
    #[must_use]
    pub fn watched(&self) -> Vec<String> {
        let mut list: Vec<String> = self.mailboxes.lock().keys().cloned().collect();
        list.sort();
        list
    }

    /// Handles a push notification.
    pub fn notify(&self, push: &MailPush) -> PushOutcome {
        let key = normalize(&push.email_address);
        {
            let mut mailboxes = self.mailboxes.lock();
            let Some(mailbox) = mailboxes.get_mut(&key) else {
                tracing::debug!(mailbox = %key, "push for unwatched mailbox");
                return PushOutcome::NotWatched;
            };
            if mailbox.history_id.is_some_and(|seen| push.history_id <= seen) {
                tracing::debug!(
                    mailbox = %key,
                    history_id = push.history_id,
                    "stale push ignored"
                );
                return PushOutcome::Stale;
            }
            mailbox.history_id = Some(push.history_id);
        }
        let receivers = self.bus.announce(&key);
        tracing::info!(mailbox = %key, history_id = push.history_id, receivers, "new mail");
        PushOutcome::Published
    }
}

#[async_trait]
impl MailWatch for MailWatchHub {
    async fn watch(&self, mailbox: &str) -> Result<(), MailWatchError> {
        let key = normalize(mailbox);
        let valid = key
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid {
            return Err(MailWatchError::InvalidMailbox(mailbox.to_string()));
        }
        let mut mailboxes = self.mailboxes.lock();
        if !mailboxes.contains_key(&key) {
            tracing::info!(mailbox = %key, "now watching mailbox");
            mailboxes.insert(key, WatchedMailbox::default());
        }
        Ok(())
    }
}

fn normalize(mailbox: &str) -> String {
    mailbox.trim().to_ascii_lowercase()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn push(mailbox: &str, history_id: u64) -> MailPush {
        MailPush {
            email_address: mailbox.to_string(),
            history_id,
        }
    }

    #[tokio::test]
    async fn watch_rejects_invalid_addresses() {
        let hub = MailWatchHub::new(MailBus::new(8));
        assert!(hub.watch("ops@example.com").await.is_ok());
        assert_eq!(
            hub.watch("not-an-address").await,
            Err(MailWatchError::InvalidMailbox("not-an-address".to_string()))
        );
        assert_eq!(hub.watched(), vec!["ops@example.com".to_string()]);
    }

    #[tokio::test]
    async fn push_publishes_once_per_history_delta() {
        let hub = MailWatchHub::new(MailBus::new(8));
        let mut rx = hub.bus().subscribe();
        assert!(hub.watch("Ops@Example.com").await.is_ok());

        assert_eq!(hub.notify(&push("ops@example.com", 10)), PushOutcome::Published);
        assert_eq!(hub.notify(&push("ops@example.com", 10)), PushOutcome::Stale);
        assert_eq!(hub.notify(&push("ops@example.com", 9)), PushOutcome::Stale);
        assert_eq!(hub.notify(&push("OPS@example.com", 11)), PushOutcome::Published);

        let Ok(first) = rx.recv().await else {
            panic!("expected event");
        };
        assert_eq!(first.mailbox, "ops@example.com");
        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn push_for_unwatched_mailbox_is_dropped() {
        let hub = MailWatchHub::new(MailBus::new(8));
        assert_eq!(hub.notify(&push("dev@example.com", 1)), PushOutcome::NotWatched);
    }

    #[test]
    fn decodes_base64_payload_with_string_history() {
        let data = STANDARD.encode(r#"{"emailAddress":"ops@example.com","historyId":"1234"}"#);
        assert_eq!(
            MailPush::from_base64(&data),
            Ok(push("ops@example.com", 1234))
        );
        let data = STANDARD.encode(r#"{"emailAddress":"ops@example.com","historyId":99}"#);
        assert_eq!(MailPush::from_base64(&data), Ok(push("ops@example.com", 99)));
    }

    #[test]
    fn rejects_garbage_payload() {
        assert!(matches!(
            MailPush::from_base64("%%%"),
            Err(MailWatchError::MalformedPush(_))
        ));
        let data = STANDARD.encode("{}");
        assert!(matches!(
            MailPush::from_base64(&data),
            Err(MailWatchError::MalformedPush(_))
        ));
    }
}
