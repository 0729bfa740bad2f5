//! Mail-watch collaborator.
//!
//! The session layer asks the collaborator to watch a mailbox through the
//! [`MailWatch`] trait; the collaborator reports "new mail" by publishing
//! [`crate::domain::MailEvent`]s on the [`crate::domain::MailBus`].
//! [`MailWatchHub`] is the in-process implementation fed by push
//! notifications.

pub mod hub;

use std::fmt;

use async_trait::async_trait;

use crate::error::MailWatchError;

pub use hub::{MailPush, MailWatchHub, PushOutcome};

/// Subscription side of the mail-watch contract.
#[async_trait]
pub trait MailWatch: Send + Sync + fmt::Debug {
    /// Starts (or refreshes) watching `mailbox`.
    ///
    /// # Errors
    ///
    /// Returns [`MailWatchError`] if the mailbox cannot be watched. The
    /// caller decides what to do; there is no internal retry.
    async fn watch(&self, mailbox: &str) -> Result<(), MailWatchError>;
}
