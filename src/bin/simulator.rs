//! Device simulator.
//!
//! Connects to the gateway as a notification device and logs what its LED
//! and speaker would do. Reads single-letter commands from stdin:
//!
//! - `b`: press the button
//! - `m`: toggle local audio mute
//! - `q`: disconnect and exit

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use notifier_gateway::client::{Client, ClientConfig, ClientExit, Indicator, WsDialer};
use notifier_gateway::config::SimulatorConfig;

#[derive(Debug)]
struct LogIndicator {
    callsign: String,
}

impl Indicator for LogIndicator {
    fn led(&mut self, on: bool) {
        tracing::info!(callsign = %self.callsign, led = if on { "on" } else { "off" }, "LED");
    }

    fn tone(&mut self, frequency: u32) {
        if frequency > 0 {
            tracing::info!(callsign = %self.callsign, frequency, "tone");
        } else {
            tracing::info!(callsign = %self.callsign, "silence");
        }
    }

    fn speaker(&mut self, frequency: u32) {
        tracing::debug!(frequency, "speaker output");
    }

    fn connected(&mut self, connected: bool) {
        tracing::info!(callsign = %self.callsign, connected, "connection state");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let sim = SimulatorConfig::from_env()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("loading simulator configuration")?;
    let dialer = WsDialer::new(&sim.server_url).context("building dialer")?;
    tracing::info!(
        callsign = %sim.callsign,
        url = %dialer.ws_url(),
        "starting device simulator (b = button, m = mute, q = quit)"
    );

    let mut config = ClientConfig::new(sim.callsign.clone());
    config.firmware = sim.firmware;
    config.retry_delay = sim.retry_delay;
    config.muted = sim.muted;

    let indicator = LogIndicator {
        callsign: sim.callsign,
    };
    let (client, handle) = Client::new(dialer, config, indicator);
    let client_task = tokio::spawn(client.run());

    let mut muted = sim.muted;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let stdin_task = tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "b" => {
                    handle.press();
                }
                "m" => {
                    muted = !muted;
                    tracing::info!(muted, "audio");
                    handle.mute(muted);
                }
                "q" => break,
                "" => {}
                other => tracing::warn!(command = other, "unknown command"),
            }
        }
        handle.stop();
    });

    let exit = client_task.await.context("client task failed")?;
    stdin_task.abort();
    match exit {
        ClientExit::Stopped => Ok(()),
        ClientExit::Rejected(reason) => anyhow::bail!("rejected by server: {reason}"),
    }
}
