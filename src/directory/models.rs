//! Row and seed-file models for the directory backends.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{Channel, ChannelKind, ChannelSubscription, DeviceRecord, ExpectedVersion};

/// A row from the `devices` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRow {
    /// Device callsign.
    pub callsign: String,
    /// Display name.
    pub name: String,
    /// Owner email.
    pub email: String,
    /// Stored firmware expectation (`NULL` or `"ignore"` disables it).
    pub expected_version: Option<String>,
    /// Last handshake.
    pub last_checkin: Option<DateTime<Utc>>,
    /// Firmware reported at the last handshake.
    pub last_firmware: Option<String>,
    /// Last button press.
    pub last_interaction: Option<DateTime<Utc>>,
}

impl DeviceRow {
    /// Combines the row with its subscriptions into a domain record.
    #[must_use]
    pub fn into_record(self, channels: Vec<ChannelSubscription>) -> DeviceRecord {
        DeviceRecord {
            callsign: self.callsign,
            name: self.name,
            email: self.email,
            channels,
            expected_version: ExpectedVersion::from_stored(self.expected_version.as_deref()),
            last_checkin: self.last_checkin,
            last_firmware: self.last_firmware,
            last_interaction: self.last_interaction,
        }
    }
}

/// A row from the `device_channels` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRow {
    /// Referenced channel id.
    pub channel_id: String,
    /// Latch flag.
    pub latch: Option<bool>,
}

impl From<SubscriptionRow> for ChannelSubscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.channel_id,
            latch: row.latch,
        }
    }
}

/// A row from the `channels` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelRow {
    /// Channel id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Source kind (only `gmail` today).
    pub kind: String,
    /// Mailbox address.
    pub email: String,
    /// Commands to forward.
    pub commands: Vec<String>,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        if row.kind != "gmail" {
            tracing::warn!(channel = %row.id, kind = %row.kind, "unknown channel kind, treating as gmail");
        }
        Self {
            id: row.id,
            name: row.name,
            kind: ChannelKind::Gmail,
            email: row.email,
            commands: row.commands,
        }
    }
}

/// Contents of a directory seed file.
///
/// ```json
/// {
///   "devices": [{ "callsign": "W1AW", "channels": [{ "id": "inbox" }] }],
///   "channels": [{ "id": "inbox", "name": "Inbox", "email": "ops@example.com",
///                  "commands": ["LED 1 ON 5000"] }]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct DirectorySeed {
    /// Devices to load.
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
    /// Channels to load.
    #[serde(default)]
    pub channels: Vec<Channel>,
}
