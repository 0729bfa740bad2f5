//! Device directory records: devices, their channel subscriptions, and the
//! channels themselves.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

/// Literal stored in the directory when firmware checks are disabled.
pub const IGNORE_VERSION: &str = "ignore";

/// Firmware version a device is expected to run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// Do not enforce a version.
    #[default]
    Ignore,
    /// The device must report exactly this firmware hash.
    Version(String),
}

impl ExpectedVersion {
    /// Maps a stored value to an expectation. Missing, empty, and the
    /// `"ignore"` sentinel all disable enforcement.
    #[must_use]
    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some(IGNORE_VERSION) => Self::Ignore,
            Some(v) => Self::Version(v.to_string()),
        }
    }

    /// Returns the version the device must be reflashed to, or `None` if
    /// the reported firmware is acceptable.
    #[must_use]
    pub fn required_update(&self, reported: Option<&str>) -> Option<&str> {
        match self {
            Self::Ignore => None,
            Self::Version(v) if reported == Some(v.as_str()) => None,
            Self::Version(v) => Some(v),
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => f.write_str(IGNORE_VERSION),
            Self::Version(v) => f.write_str(v),
        }
    }
}

impl Serialize for ExpectedVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ignore => serializer.serialize_none(),
            Self::Version(v) => serializer.serialize_some(v),
        }
    }
}

impl<'de> Deserialize<'de> for ExpectedVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Self::from_stored(raw.as_deref()))
    }
}

/// A device's reference to a channel it listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChannelSubscription {
    /// Channel identifier in the directory.
    pub id: String,
    /// Whether alerts from this channel latch until acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latch: Option<bool>,
}

impl ChannelSubscription {
    /// Creates a non-latching subscription.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            latch: None,
        }
    }
}

/// Upstream source kind for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// A watched Gmail mailbox.
    #[default]
    Gmail,
}

/// A named binding between a mailbox and the commands to play when it
/// receives mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Channel {
    /// Channel identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Upstream source kind.
    #[serde(rename = "type", default)]
    pub kind: ChannelKind,
    /// Mailbox address that triggers this channel.
    pub email: String,
    /// Protocol frames forwarded verbatim, in order, when triggered.
    pub commands: Vec<String>,
}

impl Channel {
    /// Returns `true` if this channel is bound to `mailbox`.
    ///
    /// Mailbox addresses compare case-insensitively.
    #[must_use]
    pub fn watches(&self, mailbox: &str) -> bool {
        self.email.eq_ignore_ascii_case(mailbox)
    }
}

/// Directory entry for a physical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Protocol-level device key.
    pub callsign: String,
    /// Human-readable device name.
    #[serde(default)]
    pub name: String,
    /// Owner's email address.
    #[serde(default)]
    pub email: String,
    /// Channels this device listens on.
    #[serde(default)]
    pub channels: Vec<ChannelSubscription>,
    /// Firmware the device must run.
    #[serde(default)]
    pub expected_version: ExpectedVersion,
    /// Last successful handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkin: Option<DateTime<Utc>>,
    /// Firmware reported at the last handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_firmware: Option<String>,
    /// Last button press.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// Creates a record with no channels and no firmware enforcement.
    #[must_use]
    pub fn new(callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            name: String::new(),
            email: String::new(),
            channels: Vec::new(),
            expected_version: ExpectedVersion::Ignore,
            last_checkin: None,
            last_firmware: None,
            last_interaction: None,
        }
    }
}
