//! Shared view of a live session.
//!
//! A [`SessionHandle`] is what the registry stores and what the router
//! and admin endpoints see. The connection task owns the socket; everyone
//! else talks to it through the handle's outbound queue.

use std::fmt;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::domain::{Channel, SessionId};

/// Instructions queued for a connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write a text frame.
    Frame(String),
    /// Send a liveness probe (WebSocket ping).
    Probe,
    /// Send a close frame and end the connection.
    Close,
    /// End the connection without a close handshake.
    Terminate,
}

/// Serializable snapshot of a session for the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionStatus {
    /// Session identifier.
    #[schema(value_type = String, format = Uuid)]
    pub id: SessionId,
    /// Device callsign, once the handshake has named it.
    pub callsign: Option<String>,
    /// When the connection was accepted.
    pub since: DateTime<Utc>,
    /// Peer address as seen by the server.
    #[schema(value_type = Option<String>)]
    pub remote_addr: Option<SocketAddr>,
}

/// A registered session.
pub struct SessionHandle {
    id: SessionId,
    since: DateTime<Utc>,
    remote_addr: Option<SocketAddr>,
    callsign: OnceLock<String>,
    channels: RwLock<Vec<Channel>>,
    alive: AtomicBool,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    /// Creates a handle with a fresh id, writing to `outbound`.
    #[must_use]
    pub fn new(remote_addr: Option<SocketAddr>, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self::with_id(SessionId::new(), remote_addr, outbound)
    }

    /// Creates a handle with a caller-chosen id.
    #[must_use]
    pub fn with_id(
        id: SessionId,
        remote_addr: Option<SocketAddr>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            id,
            since: Utc::now(),
            remote_addr,
            callsign: OnceLock::new(),
            channels: RwLock::new(Vec::new()),
            alive: AtomicBool::new(true),
            outbound,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// When the connection was accepted.
    #[must_use]
    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// Peer address.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Callsign named by the handshake, if any.
    #[must_use]
    pub fn callsign(&self) -> Option<&str> {
        self.callsign.get().map(String::as_str)
    }

    /// Binds the session to `callsign`.
    ///
    /// Succeeds if the session is unnamed or already bound to the same
    /// callsign. Returns `false` if it is bound to a different one.
    pub fn bind_callsign(&self, callsign: &str) -> bool {
        self.callsign.get_or_init(|| callsign.to_string()) == callsign
    }

    /// Returns `true` if the handshake named this session `callsign`.
    #[must_use]
    pub fn is_callsign(&self, callsign: &str) -> bool {
        self.callsign() == Some(callsign)
    }

    /// Replaces the resolved channel list.
    pub fn set_channels(&self, channels: Vec<Channel>) {
        *self.channels.write() = channels;
    }

    /// Copy of the resolved channel list.
    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        self.channels.read().clone()
    }

    /// Commands of every channel bound to `mailbox`, in channel order.
    #[must_use]
    pub fn commands_for(&self, mailbox: &str) -> Vec<String> {
        self.channels
            .read()
            .iter()
            .filter(|c| c.watches(mailbox))
            .flat_map(|c| c.commands.iter().cloned())
            .collect()
    }

    /// Queues a text frame. Returns `false` if the connection is gone.
    pub fn send(&self, frame: impl fmt::Display) -> bool {
        self.push(Outbound::Frame(frame.to_string()))
    }

    /// Queues a liveness probe.
    pub fn probe(&self) -> bool {
        self.push(Outbound::Probe)
    }

    /// Asks the connection to close after flushing queued frames.
    pub fn close(&self) -> bool {
        self.push(Outbound::Close)
    }

    /// Asks the connection to drop immediately.
    pub fn terminate(&self) -> bool {
        self.push(Outbound::Terminate)
    }

    /// Records a probe response.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Returns whether the peer answered since the last check and marks
    /// the session pending again.
    pub fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    /// Admin snapshot.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id,
            callsign: self.callsign().map(str::to_string),
            since: self.since,
            remote_addr: self.remote_addr,
        }
    }

    fn push(&self, item: Outbound) -> bool {
        self.outbound.send(item).is_ok()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("callsign", &self.callsign())
            .field("remote_addr", &self.remote_addr)
            .field("alive", &self.alive.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChannelKind;

    fn make_handle() -> (SessionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionHandle::new(None, tx), rx)
    }

    #[test]
    fn callsign_binds_once() {
        let (handle, _rx) = make_handle();
        assert_eq!(handle.callsign(), None);
        assert!(handle.bind_callsign("W1AW"));
        assert!(handle.bind_callsign("W1AW"));
        assert!(!handle.bind_callsign("K1ABC"));
        assert_eq!(handle.callsign(), Some("W1AW"));
    }

    #[test]
    fn check_alive_resets_flag() {
        let (handle, _rx) = make_handle();
        assert!(handle.check_alive());
        assert!(!handle.check_alive());
        handle.mark_alive();
        assert!(handle.check_alive());
    }

    #[test]
    fn queued_items_arrive_in_order() {
        let (handle, mut rx) = make_handle();
        assert!(handle.send("LED 1 ON"));
        assert!(handle.probe());
        assert!(handle.close());
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Frame("LED 1 ON".to_string())));
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Probe));
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Close));
    }

    #[test]
    fn send_fails_after_connection_drops() {
        let (handle, rx) = make_handle();
        drop(rx);
        assert!(!handle.send("LED 1 ON"));
    }

    #[test]
    fn commands_for_matches_mailbox() {
        let (handle, _rx) = make_handle();
        handle.set_channels(vec![
            Channel {
                id: "a".to_string(),
                name: "A".to_string(),
                kind: ChannelKind::Gmail,
                email: "m@example.com".to_string(),
                commands: vec!["LED 1 ON".to_string(), "BEEP 1 1 440 100".to_string()],
            },
            Channel {
                id: "b".to_string(),
                name: "B".to_string(),
                kind: ChannelKind::Gmail,
                email: "x@example.com".to_string(),
                commands: vec!["LED 2 ON".to_string()],
            },
        ]);
        assert_eq!(
            handle.commands_for("m@example.com"),
            vec!["LED 1 ON".to_string(), "BEEP 1 1 440 100".to_string()]
        );
        assert!(handle.commands_for("y@example.com").is_empty());
    }
}
