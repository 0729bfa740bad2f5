//! In-memory directory backend.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::DeviceDirectory;
use super::models::DirectorySeed;
use crate::domain::{Channel, DeviceRecord};
use crate::error::DirectoryError;

/// Directory held in process memory.
///
/// Used by tests and by deployments that describe their devices in a JSON
/// seed file instead of a database.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    devices: RwLock<HashMap<String, DeviceRecord>>,
    channels: RwLock<HashMap<String, Channel>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from a parsed seed.
    #[must_use]
    pub fn from_seed(seed: DirectorySeed) -> Self {
        let dir = Self::new();
        for device in seed.devices {
            dir.insert_device(device);
        }
        for channel in seed.channels {
            dir.insert_channel(channel);
        }
        dir
    }

    /// Reads and parses a JSON seed file.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Seed`] if the file cannot be read or is
    /// not a valid seed document.
    pub async fn load(path: &Path) -> Result<Self, DirectoryError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DirectoryError::Seed(format!("{}: {e}", path.display())))?;
        let seed: DirectorySeed = serde_json::from_str(&raw)
            .map_err(|e| DirectoryError::Seed(format!("{}: {e}", path.display())))?;
        tracing::info!(
            path = %path.display(),
            devices = seed.devices.len(),
            channels = seed.channels.len(),
            "loaded directory seed"
        );
        Ok(Self::from_seed(seed))
    }

    /// Inserts or replaces a device.
    pub fn insert_device(&self, device: DeviceRecord) {
        self.devices.write().insert(device.callsign.clone(), device);
    }

    /// Inserts or replaces a channel.
    pub fn insert_channel(&self, channel: Channel) {
        self.channels.write().insert(channel.id.clone(), channel);
    }

    /// Returns a copy of the stored device, including bookkeeping fields.
    #[must_use]
    pub fn device(&self, callsign: &str) -> Option<DeviceRecord> {
        self.devices.read().get(callsign).cloned()
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDirectory {
    async fn lookup(&self, callsign: &str) -> Result<Option<DeviceRecord>, DirectoryError> {
        Ok(self.device(callsign))
    }

    async fn channel(&self, channel_id: &str) -> Result<Option<Channel>, DirectoryError> {
        Ok(self.channels.read().get(channel_id).cloned())
    }

    async fn record_checkin(
        &self,
        callsign: &str,
        firmware: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        if let Some(device) = self.devices.write().get_mut(callsign) {
            device.last_checkin = Some(at);
            device.last_firmware = firmware.map(str::to_string);
        }
        Ok(())
    }

    async fn record_interaction(
        &self,
        callsign: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        if let Some(device) = self.devices.write().get_mut(callsign) {
            device.last_interaction = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ChannelKind, ChannelSubscription};

    fn channel(id: &str, email: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: id.to_string(),
            kind: ChannelKind::Gmail,
            email: email.to_string(),
            commands: vec!["LED 1 ON 1000".to_string()],
        }
    }

    #[tokio::test]
    async fn lookup_and_channel() {
        let dir = MemoryDirectory::new();
        let mut device = DeviceRecord::new("W1AW");
        device.channels.push(ChannelSubscription::new("inbox"));
        dir.insert_device(device);
        dir.insert_channel(channel("inbox", "ops@example.com"));

        let Ok(Some(found)) = dir.lookup("W1AW").await else {
            panic!("device should be found");
        };
        assert_eq!(found.channels.len(), 1);
        assert!(matches!(dir.lookup("K1ABC").await, Ok(None)));
        assert!(matches!(dir.channel("inbox").await, Ok(Some(_))));
        assert!(matches!(dir.channel("missing").await, Ok(None)));
    }

    #[tokio::test]
    async fn bookkeeping_updates_record() {
        let dir = MemoryDirectory::new();
        dir.insert_device(DeviceRecord::new("W1AW"));
        let now = Utc::now();

        assert!(dir.record_checkin("W1AW", Some("abc"), now).await.is_ok());
        assert!(dir.record_interaction("W1AW", now).await.is_ok());
        // Unknown devices are ignored.
        assert!(dir.record_interaction("K1ABC", now).await.is_ok());

        let Some(device) = dir.device("W1AW") else {
            panic!("device should exist");
        };
        assert_eq!(device.last_checkin, Some(now));
        assert_eq!(device.last_firmware.as_deref(), Some("abc"));
        assert_eq!(device.last_interaction, Some(now));
    }

    #[test]
    fn seed_parses() {
        let json = r#"{
            "devices": [{"callsign": "W1AW", "channels": [{"id": "inbox"}], "expected_version": "v2"}],
            "channels": [{"id": "inbox", "name": "Inbox", "type": "gmail", "email": "ops@example.com", "commands": ["BEEP 1 1 440 100"]}]
        }"#;
        let Ok(seed) = serde_json::from_str::<DirectorySeed>(json) else {
            panic!("seed should parse");
        };
        let dir = MemoryDirectory::from_seed(seed);
        assert!(dir.device("W1AW").is_some());
        assert!(dir.channels.read().contains_key("inbox"));
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let result = MemoryDirectory::load(Path::new("/definitely/not/here.json")).await;
        assert!(matches!(result, Err(DirectoryError::Seed(_))));
    }
}
