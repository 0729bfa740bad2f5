//! # notifier-gateway
//!
//! WebSocket gateway that keeps sessions with small notification devices
//! (an LED and a buzzer behind a button) and pushes mail alerts to them.
//!
//! A device connects, names itself with `HELLO <callsign>`, and is either
//! welcomed, told to reflash (`OTA`), or rejected. Welcomed devices have
//! their channels resolved from the device directory; when a watched
//! mailbox gets new mail, each bound channel's commands are forwarded to
//! every live session subscribed to it.
//!
//! ## Architecture
//!
//! ```text
//! Devices (WebSocket /ws)        Admin + mail push (REST)
//!     │                               │
//!     ├── ws/ (connection loop)       ├── api/
//!     │                               │
//!     ├── session/ (Session, ConnectionRegistry)
//!     │       ▲
//!     │       └── service/ (NotificationRouter) ◀── MailBus ◀── mail/
//!     │
//!     └── directory/ (memory seed or PostgreSQL)
//! ```
//!
//! The [`client`] module is the device side of the same protocol: a
//! reconnecting client driving an LED/speaker panel, used by the
//! `device-simulator` binary.

pub mod api;
pub mod app_state;
pub mod client;
pub mod config;
pub mod directory;
pub mod domain;
pub mod error;
pub mod mail;
pub mod protocol;
pub mod server;
pub mod service;
pub mod session;
pub mod ws;
