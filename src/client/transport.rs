//! Client transport: how the device reaches the gateway.
//!
//! [`Dialer`] opens a [`Link`]; the reconnector only ever talks to these
//! two traits, so tests can substitute in-memory links.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::ClientError;

/// A line-oriented connection to the gateway.
#[async_trait]
pub trait Link: Send {
    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the connection is gone.
    async fn send_line(&mut self, line: &str) -> Result<(), ClientError>;

    /// Waits for the next text frame. `None` means the peer closed.
    async fn next_line(&mut self) -> Option<Result<String, ClientError>>;

    /// Closes the connection, ignoring errors.
    async fn close(&mut self);
}

/// Opens [`Link`]s.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Link type produced.
    type Link: Link;

    /// Runs the pre-flight check and opens a connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the server is unreachable or refuses the
    /// upgrade.
    async fn dial(&self) -> Result<Self::Link, ClientError>;
}

/// Dials the gateway over HTTP + WebSocket.
#[derive(Debug, Clone)]
pub struct WsDialer {
    http: reqwest::Client,
    keepalive_url: String,
    ws_url: String,
}

impl WsDialer {
    /// Creates a dialer for the gateway at `server_url` (`http://` or
    /// `https://`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] for any other scheme.
    pub fn new(server_url: &str) -> Result<Self, ClientError> {
        let base = server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(ClientError::InvalidUrl(server_url.to_string()));
        };
        Ok(Self {
            http: reqwest::Client::new(),
            keepalive_url: format!("{base}/api/keepalive"),
            ws_url: format!("{ws_base}/ws"),
        })
    }

    /// WebSocket endpoint this dialer connects to.
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Pre-flight endpoint checked before each connection.
    #[must_use]
    pub fn keepalive_url(&self) -> &str {
        &self.keepalive_url
    }
}

#[async_trait]
impl Dialer for WsDialer {
    type Link = WsLink;

    async fn dial(&self) -> Result<WsLink, ClientError> {
        self.http
            .get(&self.keepalive_url)
            .send()
            .await?
            .error_for_status()?;
        let (stream, _) = connect_async(self.ws_url.as_str()).await?;
        tracing::debug!(url = %self.ws_url, "socket opened");
        Ok(WsLink { stream })
    }
}

/// WebSocket [`Link`].
#[derive(Debug)]
pub struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
        self.stream.send(Message::text(line)).await?;
        Ok(())
    }

    async fn next_line(&mut self) -> Option<Result<String, ClientError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_string())),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite on the next read.
                Ok(_) => {}
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
