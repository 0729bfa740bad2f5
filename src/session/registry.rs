//! Registry of live sessions.
//!
//! [`ConnectionRegistry`] is the only shared mutable map in the gateway.
//! Connection tasks register on accept and unregister on exit; the
//! notification router, the liveness sweep and the admin endpoints read
//! snapshots of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::handle::{SessionHandle, SessionStatus};
use crate::domain::SessionId;
use crate::error::GatewayError;
use crate::protocol::{LedState, ServerFrame, ToneStep};
use crate::service::notification_router;

/// Frames pushed to a device by the test endpoint: a C-major scale on
/// speaker 1, then LED 1 on for five seconds.
#[must_use]
pub fn test_frames() -> [ServerFrame; 2] {
    let scale = [262, 294, 330, 349, 392, 440, 494]
        .into_iter()
        .map(|f| ToneStep::new(f, 200))
        .chain([ToneStep::new(523, 400), ToneStep::new(0, 400)])
        .collect();
    [
        ServerFrame::Beep {
            index: 1,
            repeat: 2,
            steps: scale,
        },
        ServerFrame::Led {
            index: 1,
            state: LedState::On,
            duration_ms: Some(5000),
        },
    ]
}

/// Outcome of one liveness sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions that answered the previous probe and were probed again.
    pub probed: usize,
    /// Sessions that missed the previous probe and were dropped.
    pub evicted: usize,
}

/// Set of live sessions keyed by [`SessionId`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateSession`] if the id is already
    /// registered.
    pub async fn register(&self, handle: Arc<SessionHandle>) -> Result<(), GatewayError> {
        let id = handle.id();
        let mut map = self.sessions.write().await;
        if map.contains_key(&id) {
            return Err(GatewayError::DuplicateSession(id));
        }
        map.insert(id, handle);
        tracing::debug!(session_id = %id, sessions = map.len(), "session registered");
        Ok(())
    }

    /// Removes a session. Removing an absent id is a no-op.
    pub async fn unregister(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "session unregistered");
        }
        removed
    }

    /// Looks up a session.
    pub async fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(&id).map(Arc::clone)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` when no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Point-in-time copy of every registered handle.
    ///
    /// Iterating the copy never holds the registry lock, so sessions may
    /// come and go while the caller works through it.
    pub async fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().await.values().map(Arc::clone).collect()
    }

    /// Admin view of every session, oldest first.
    pub async fn list(&self) -> Vec<SessionStatus> {
        let mut list: Vec<SessionStatus> = self
            .snapshot()
            .await
            .iter()
            .map(|h| h.status())
            .collect();
        list.sort_by_key(|s| s.since);
        list
    }

    /// Sends the test sequence to every session bound to `callsign`.
    ///
    /// Returns how many sessions received it.
    pub async fn test_device(&self, callsign: &str) -> usize {
        let frames = test_frames();
        let mut reached = 0;
        for handle in self.snapshot().await {
            if !handle.is_callsign(callsign) {
                continue;
            }
            if frames.iter().all(|frame| handle.send(frame)) {
                reached += 1;
            }
        }
        tracing::info!(callsign, sessions = reached, "sent test sequence");
        reached
    }

    /// Closes and forgets every session. Returns how many were dropped.
    pub async fn reset(&self) -> usize {
        let drained: Vec<Arc<SessionHandle>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, h)| h).collect()
        };
        for handle in &drained {
            handle.close();
        }
        tracing::info!(sessions = drained.len(), "disconnected all sessions");
        drained.len()
    }

    /// Delivers the commands bound to `mailbox` to every live session.
    ///
    /// Returns the number of frames queued.
    pub async fn notify_devices(&self, mailbox: &str) -> usize {
        let sessions = self.snapshot().await;
        notification_router::fan_out(&sessions, mailbox)
    }

    /// One liveness pass.
    ///
    /// A session that answered since the last pass is probed again; one
    /// that did not is terminated and removed.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for handle in self.snapshot().await {
            if handle.check_alive() {
                handle.probe();
                report.probed += 1;
            } else {
                tracing::info!(
                    session_id = %handle.id(),
                    callsign = handle.callsign().unwrap_or("-"),
                    "session unresponsive, terminating"
                );
                handle.terminate();
                self.unregister(handle.id()).await;
                report.evicted += 1;
            }
        }
        report
    }

    /// Runs [`Self::sweep`] every `interval` until the task is aborted.
    pub fn spawn_liveness_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = registry.sweep().await;
                if report.evicted > 0 {
                    tracing::info!(
                        probed = report.probed,
                        evicted = report.evicted,
                        "liveness sweep"
                    );
                } else {
                    tracing::trace!(probed = report.probed, "liveness sweep");
                }
            }
        })
    }
}
