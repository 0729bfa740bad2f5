//! Service layer.
//!
//! [`NotificationRouter`] turns mail events from the
//! [`crate::domain::MailBus`] into device commands.

pub mod notification_router;

pub use notification_router::NotificationRouter;
