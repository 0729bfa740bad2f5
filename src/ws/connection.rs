//! Read/write loop for one device connection.
//!
//! The loop multiplexes four sources: frames from the device, items from
//! the session's outbound queue, the handshake deadline, and the frame the
//! [`Session`] state machine is currently handling. Handling a frame may
//! wait on the directory or the mail watcher, so it runs as its own future
//! and the socket keeps flushing outbound frames and answering probes in
//! the meantime. Inbound text frames are handled one at a time, in order.
//! Everything written to the socket goes through the outbound queue so
//! that replies, fan-out commands and probes keep their order.

use std::collections::VecDeque;
use std::future::{Future, pending};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::app_state::AppState;
use crate::mail::MailWatch;
use crate::session::{CloseReason, Outbound, Session, SessionHandle, SessionState};

/// A frame being handled. The session is moved in and handed back.
type InFlight = BoxFuture<'static, (Session, Option<CloseReason>)>;

/// Drives a device connection until it closes.
pub async fn run_connection(socket: WebSocket, state: AppState, remote_addr: Option<SocketAddr>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let handle = Arc::new(SessionHandle::new(remote_addr, out_tx));
    let id = handle.id();

    if let Err(err) = state.registry.register(Arc::clone(&handle)).await {
        tracing::warn!(session_id = %id, error = %err, "could not register session");
        return;
    }
    tracing::info!(session_id = %id, ?remote_addr, "device connected");

    let mail_watch: Arc<dyn MailWatch> = Arc::clone(&state.mail_watch) as Arc<dyn MailWatch>;
    let mut session = Session::new(
        Arc::clone(&handle),
        Arc::clone(&state.directory),
        mail_watch,
    );
    session.start();

    let handshake = tokio::time::sleep(state.handshake_timeout);
    tokio::pin!(handshake);
    let mut session = Some(session);
    let mut in_flight: Option<InFlight> = None;
    let mut backlog: VecDeque<String> = VecDeque::new();
    let mut pending: Option<CloseReason> = None;

    let reason = loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        backlog.push_back(text.as_str().to_string());
                        dispatch(&mut session, &mut in_flight, &mut backlog);
                    }
                    Some(Ok(Message::Pong(_))) => handle.mark_alive(),
                    Some(Ok(Message::Close(_))) | None => {
                        break settle(&mut pending, CloseReason::PeerClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        break settle(&mut pending, CloseReason::Transport(err.to_string()));
                    }
                }
            }
            (returned, outcome) = poll_slot(&mut in_flight) => {
                in_flight = None;
                session = Some(returned);
                if let Some(reason) = outcome {
                    // Drop out of fan-out now; the queue still flushes.
                    state.registry.unregister(id).await;
                    pending.get_or_insert(reason);
                }
                dispatch(&mut session, &mut in_flight, &mut backlog);
            }
            item = out_rx.recv() => {
                match item {
                    Some(Outbound::Frame(frame)) => {
                        tracing::debug!(session_id = %id, %frame, "sending frame");
                        if let Err(err) = ws_tx.send(Message::text(frame)).await {
                            break settle(&mut pending, CloseReason::Transport(err.to_string()));
                        }
                    }
                    Some(Outbound::Probe) => {
                        if let Err(err) = ws_tx.send(Message::Ping(Bytes::new())).await {
                            break settle(&mut pending, CloseReason::Transport(err.to_string()));
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break settle(&mut pending, CloseReason::Evicted);
                    }
                    Some(Outbound::Terminate) => break settle(&mut pending, CloseReason::Unresponsive),
                }
            }
            () = &mut handshake, if session
                .as_ref()
                .is_some_and(|s| s.state() == SessionState::AwaitingHandshake) =>
            {
                if let Some(reason) = session.as_mut().and_then(Session::handshake_timed_out) {
                    state.registry.unregister(id).await;
                    pending.get_or_insert(reason);
                }
            }
        }
    };

    // A frame still in flight is abandoned along with its session.
    drop(in_flight);
    if let Some(mut session) = session {
        session.close();
    }
    state.registry.unregister(id).await;
    let callsign = handle.callsign().unwrap_or("-");
    if reason.is_error() {
        tracing::warn!(session_id = %id, callsign, %reason, "device disconnected");
    } else {
        tracing::info!(session_id = %id, callsign, %reason, "device disconnected");
    }
}

/// Starts handling the next queued frame unless one is already in flight.
fn dispatch(
    session: &mut Option<Session>,
    in_flight: &mut Option<InFlight>,
    backlog: &mut VecDeque<String>,
) {
    if in_flight.is_some() {
        return;
    }
    let Some(mut idle) = session.take() else {
        return;
    };
    let Some(line) = backlog.pop_front() else {
        *session = Some(idle);
        return;
    };
    *in_flight = Some(
        async move {
            let outcome = idle.handle_line(&line).await;
            (idle, outcome)
        }
        .boxed(),
    );
}

/// The reason the connection ends: a terminal protocol outcome queued
/// earlier wins over whatever stopped the loop.
fn settle(pending: &mut Option<CloseReason>, fallback: CloseReason) -> CloseReason {
    pending.take().unwrap_or(fallback)
}

async fn poll_slot<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => pending().await,
    }
}
