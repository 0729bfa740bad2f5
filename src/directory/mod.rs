//! Device directory: callsign → device record, channel id → channel.
//!
//! The directory is an external collaborator. The session consumes it
//! through the [`DeviceDirectory`] trait; two backends are provided, an
//! in-memory map (tests and JSON seed files) and PostgreSQL.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Channel, DeviceRecord};
use crate::error::DirectoryError;

pub use memory::MemoryDirectory;
pub use postgres::PostgresDirectory;

/// Lookup contract the session layer needs from the device directory.
#[async_trait]
pub trait DeviceDirectory: Send + Sync + fmt::Debug {
    /// Returns the device registered under `callsign`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the backend cannot be queried.
    async fn lookup(&self, callsign: &str) -> Result<Option<DeviceRecord>, DirectoryError>;

    /// Returns the channel with the given id, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the backend cannot be queried.
    async fn channel(&self, channel_id: &str) -> Result<Option<Channel>, DirectoryError>;

    /// Records a handshake: when it happened and which firmware the device
    /// reported.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the backend cannot be updated.
    async fn record_checkin(
        &self,
        callsign: &str,
        firmware: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError>;

    /// Records a button press.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the backend cannot be updated.
    async fn record_interaction(
        &self,
        callsign: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError>;
}
