//! PostgreSQL directory backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::DeviceDirectory;
use super::models::{ChannelRow, DeviceRow, SubscriptionRow};
use crate::domain::{Channel, DeviceRecord};
use crate::error::DirectoryError;

/// PostgreSQL-backed directory using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Backend`] if the database is unreachable
    /// or a migration fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(max_connections, "connected to directory database");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DeviceDirectory for PostgresDirectory {
    async fn lookup(&self, callsign: &str) -> Result<Option<DeviceRecord>, DirectoryError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "SELECT callsign, name, email, expected_version, last_checkin, last_firmware, \
             last_interaction FROM devices WHERE callsign = $1",
        )
        .bind(callsign)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let subscriptions = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT channel_id, latch FROM device_channels WHERE callsign = $1 \
             ORDER BY position ASC, channel_id ASC",
        )
        .bind(callsign)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_record(
            subscriptions.into_iter().map(Into::into).collect(),
        )))
    }

    async fn channel(&self, channel_id: &str) -> Result<Option<Channel>, DirectoryError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, name, kind, email, commands FROM channels WHERE id = $1",
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn record_checkin(
        &self,
        callsign: &str,
        firmware: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        sqlx::query("UPDATE devices SET last_checkin = $2, last_firmware = $3 WHERE callsign = $1")
            .bind(callsign)
            .bind(at)
            .bind(firmware)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_interaction(
        &self,
        callsign: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        sqlx::query("UPDATE devices SET last_interaction = $2 WHERE callsign = $1")
            .bind(callsign)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
