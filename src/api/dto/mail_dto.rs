//! Mail push DTOs.
//!
//! The push endpoint accepts the Pub/Sub push envelope:
//!
//! ```json
//! {
//!   "message": { "data": "<base64 {emailAddress, historyId}>", "messageId": "1" },
//!   "subscription": "projects/p/subscriptions/s"
//! }
//! ```

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::mail::PushOutcome;

/// Request body for `POST /mail/notify`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PushEnvelope {
    /// The pushed message.
    pub message: PushMessage,
    /// Subscription the push was delivered for.
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Message part of a [`PushEnvelope`].
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64-encoded JSON payload.
    pub data: String,
    /// Broker-assigned message id.
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Response body for `POST /mail/notify`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PushResponse {
    /// Mailbox named by the push.
    pub mailbox: String,
    /// Mail history position carried by the push.
    pub history_id: u64,
    /// `published`, `not_watched` or `stale`.
    pub outcome: &'static str,
}

impl PushResponse {
    /// Maps a hub outcome to its wire name.
    #[must_use]
    pub const fn outcome_name(outcome: PushOutcome) -> &'static str {
        match outcome {
            PushOutcome::Published => "published",
            PushOutcome::NotWatched => "not_watched",
            PushOutcome::Stale => "stale",
        }
    }
}

/// Response body for `GET /mail/watched`.
#[derive(Debug, Serialize, ToSchema)]
pub struct WatchedMailboxesResponse {
    /// Watched mailbox addresses, sorted.
    pub mailboxes: Vec<String>,
}
