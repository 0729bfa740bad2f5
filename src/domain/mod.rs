//! Domain layer: identifiers, directory records, and mail events.
//!
//! This module contains the server-side domain model: session identity,
//! the device and channel records served by the directory, and the typed
//! bus that carries "new mail" events to the notification router.

pub mod device;
pub mod mail_bus;
pub mod mail_event;
pub mod session_id;

pub use device::{Channel, ChannelKind, ChannelSubscription, DeviceRecord, ExpectedVersion};
pub use mail_bus::MailBus;
pub use mail_event::MailEvent;
pub use session_id::SessionId;
