//! WebSocket layer for device connections.
//!
//! Devices connect to `/ws`, speak the line protocol described in
//! [`crate::protocol`], and are driven by a [`crate::session::Session`]
//! for the lifetime of the socket.

pub mod connection;
pub mod handler;
