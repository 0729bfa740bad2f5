//! Reconnecting device client.
//!
//! ```text
//! DISCONNECTED ──dial──▶ CONNECTING ──WELCOME──▶ CONNECTED
//!      ▲                     │                      │
//!      └──── retry delay ────┴──── failure/close ───┘
//! ```
//!
//! Everything runs on one task: commands, link frames, the retry timer
//! and the panel's deadlines are multiplexed in a single `select!`. An
//! `ERROR` from the server or an explicit stop ends the loop; every other
//! failure schedules another attempt after the fixed retry delay.

use std::future::{Future, pending};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use super::panel::{Indicator, Panel};
use super::transport::{Dialer, Link};
use super::{ClientCommand, ClientConfig, ClientError, ClientHandle};
use crate::protocol::{DeviceFrame, ServerFrame};

/// Why [`Client::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientExit {
    /// Stopped through the handle, or every handle was dropped.
    Stopped,
    /// The server answered with `ERROR`.
    Rejected(String),
}

/// Reconnecting protocol client driving a [`Panel`].
#[derive(Debug)]
pub struct Client<D, I> {
    dialer: D,
    config: ClientConfig,
    panel: Panel<I>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
}

impl<D: Dialer, I: Indicator> Client<D, I> {
    /// Creates a client and its control handle.
    pub fn new(dialer: D, config: ClientConfig, indicator: I) -> (Self, ClientHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let panel = Panel::new(indicator, config.muted);
        let client = Self {
            dialer,
            config,
            panel,
            commands,
        };
        (client, ClientHandle { tx })
    }

    /// Connects and keeps the device connected until stopped or rejected.
    pub async fn run(self) -> ClientExit {
        let Self {
            dialer,
            config,
            mut panel,
            mut commands,
        } = self;
        let hello = DeviceFrame::Hello {
            callsign: config.callsign.clone(),
            firmware: config.firmware.clone(),
        }
        .to_string();
        let button = DeviceFrame::Button.to_string();

        let mut connecting: Option<BoxFuture<'_, Result<(D::Link, String), ClientError>>> =
            Some(Box::pin(establish(&dialer, &hello, config.welcome_timeout)));
        let mut link: Option<D::Link> = None;
        let mut retry_at: Option<Instant> = None;

        loop {
            let deadline = panel.next_deadline();
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(ClientCommand::Press) => {
                        panel.press();
                        if let Some(active) = link.as_mut()
                            && let Err(err) = active.send_line(&button).await
                        {
                            tracing::info!(error = %err, "connection lost");
                            link = None;
                            panel.set_connected(false);
                            retry_at = Some(Instant::now() + config.retry_delay);
                        }
                    }
                    Some(ClientCommand::Mute(muted)) => panel.set_muted(muted),
                    Some(ClientCommand::Stop) | None => {
                        tracing::info!(callsign = %config.callsign, "stopping by request");
                        drop(connecting.take());
                        if let Some(mut active) = link.take() {
                            active.close().await;
                        }
                        panel.press();
                        panel.set_connected(false);
                        return ClientExit::Stopped;
                    }
                },
                result = poll_slot(&mut connecting) => {
                    connecting = None;
                    match result {
                        Ok((active, session_id)) => {
                            tracing::info!(callsign = %config.callsign, %session_id, "connected");
                            link = Some(active);
                            panel.set_connected(true);
                        }
                        Err(ClientError::Rejected(reason)) => {
                            tracing::error!(callsign = %config.callsign, %reason, "rejected by server");
                            panel.set_connected(false);
                            return ClientExit::Rejected(reason);
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, retry_in = ?config.retry_delay, "failed to connect");
                            panel.set_connected(false);
                            retry_at = Some(Instant::now() + config.retry_delay);
                        }
                    }
                }
                line = next_line(&mut link) => match line {
                    Some(Ok(text)) => match ServerFrame::decode(&text) {
                        Ok(ServerFrame::Error(reason)) => {
                            tracing::error!(callsign = %config.callsign, %reason, "rejected by server");
                            if let Some(mut active) = link.take() {
                                active.close().await;
                            }
                            panel.press();
                            panel.set_connected(false);
                            return ClientExit::Rejected(reason);
                        }
                        Ok(ServerFrame::Ota(version)) => {
                            tracing::info!(%version, "server requested firmware update");
                        }
                        Ok(ServerFrame::Welcome(session_id)) => {
                            tracing::debug!(%session_id, "repeated WELCOME");
                        }
                        Ok(frame) => {
                            if !panel.apply(&frame, Instant::now()) {
                                tracing::debug!(%frame, "ignoring frame");
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, frame = %text, "undecodable frame"),
                    },
                    Some(Err(err)) => {
                        tracing::info!(error = %err, "connection lost");
                        link = None;
                        panel.set_connected(false);
                        retry_at = Some(Instant::now() + config.retry_delay);
                    }
                    None => {
                        tracing::info!("connection closed");
                        link = None;
                        panel.set_connected(false);
                        retry_at = Some(Instant::now() + config.retry_delay);
                    }
                },
                () = sleep_opt(retry_at) => {
                    retry_at = None;
                    connecting = Some(Box::pin(establish(&dialer, &hello, config.welcome_timeout)));
                }
                () = sleep_opt(deadline) => panel.poll(Instant::now()),
            }
        }
    }
}

/// Dials, sends `HELLO` and waits for `WELCOME`.
async fn establish<D: Dialer>(
    dialer: &D,
    hello: &str,
    welcome_timeout: Duration,
) -> Result<(D::Link, String), ClientError> {
    let mut link = dialer.dial().await?;
    link.send_line(hello).await?;
    match tokio::time::timeout(welcome_timeout, await_welcome(&mut link)).await {
        Ok(Ok(session_id)) => Ok((link, session_id)),
        Ok(Err(err)) => {
            link.close().await;
            Err(err)
        }
        Err(_) => {
            link.close().await;
            Err(ClientError::WelcomeTimeout(welcome_timeout))
        }
    }
}

async fn await_welcome<L: Link>(link: &mut L) -> Result<String, ClientError> {
    loop {
        let Some(line) = link.next_line().await else {
            return Err(ClientError::Closed);
        };
        match ServerFrame::decode(&line?) {
            Ok(ServerFrame::Welcome(session_id)) => return Ok(session_id),
            Ok(ServerFrame::Error(reason)) => return Err(ClientError::Rejected(reason)),
            Ok(ServerFrame::Ota(version)) => return Err(ClientError::FirmwareUpdate(version)),
            Ok(frame) => tracing::debug!(%frame, "ignoring frame before WELCOME"),
            Err(err) => tracing::debug!(error = %err, "ignoring frame before WELCOME"),
        }
    }
}

async fn poll_slot<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_line<L: Link>(link: &mut Option<L>) -> Option<Result<String, ClientError>> {
    match link.as_mut() {
        Some(active) => active.next_line().await,
        None => pending().await,
    }
}

async fn sleep_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
