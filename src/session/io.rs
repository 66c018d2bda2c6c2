//! Session I/O loops.
//!
//! Two reader tasks wait on the link and the tunnel and forward each batch
//! over a channel. One actor task owns the [`SessionCore`] and handles those
//! batches and the timer strictly one at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::{Link, SessionError, Tunnel};

use super::engine::{Output, SessionCore};
use super::status::{DataCount, SessionStatus};

/// Batches buffered between a reader and the actor.
const READ_QUEUE_DEPTH: usize = 64;

type ReadResult = std::io::Result<Vec<Vec<u8>>>;

/// Publishes status and counters to the session handle.
#[derive(Debug)]
pub(crate) struct Reporter {
    pub(crate) status: watch::Sender<SessionStatus>,
    pub(crate) data_count: watch::Sender<DataCount>,
}

impl Reporter {
    pub(crate) fn publish(&self, core: &SessionCore, status: Option<SessionStatus>) {
        if let Some(status) = status {
            self.status.send_replace(status);
        }
        self.data_count.send_replace(core.data_count());
    }
}

/// Everything the actor task owns.
pub(crate) struct Actor {
    pub(crate) core: SessionCore,
    pub(crate) link: Arc<dyn Link>,
    pub(crate) tunnel: Arc<dyn Tunnel>,
    pub(crate) reporter: Reporter,
    pub(crate) tick_interval: Duration,
    pub(crate) cancel: CancellationToken,
}

impl Actor {
    /// Run until stopped or failed. The core is always stopped on return.
    pub(crate) async fn run(mut self) -> Result<(), SessionError> {
        let readers = self.cancel.child_token();
        let (link_tx, link_rx) = mpsc::channel(READ_QUEUE_DEPTH);
        let (tunnel_tx, tunnel_rx) = mpsc::channel(READ_QUEUE_DEPTH);

        let link = self.link.clone();
        tokio::spawn(read_loop("link", readers.clone(), link_tx, move || {
            let link = link.clone();
            async move { link.read_packets().await }
        }));
        let tunnel = self.tunnel.clone();
        tokio::spawn(read_loop("tunnel", readers.clone(), tunnel_tx, move || {
            let tunnel = tunnel.clone();
            async move { tunnel.read_packets().await }
        }));

        let result = self.drive(link_rx, tunnel_rx).await;
        readers.cancel();

        let output = self.core.stop();
        self.reporter.publish(&self.core, output.status);
        match &result {
            Ok(()) => info!("session ended"),
            Err(e) => error!(error = %e, code = e.code(), "session failed"),
        }
        result
    }

    async fn drive(
        &mut self,
        mut link_rx: mpsc::Receiver<ReadResult>,
        mut tunnel_rx: mpsc::Receiver<ReadResult>,
    ) -> Result<(), SessionError> {
        let output = self.core.start(self.link.is_reliable(), now())?;
        self.deliver(output).await?;

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // cancellation wins over the reader channels closing behind it
            let output = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("stop requested");
                    return Ok(());
                }
                read = link_rx.recv() => {
                    let packets = read
                        .unwrap_or_else(|| Err(reader_gone("link")))
                        .map_err(SessionError::LinkFailure)?;
                    if packets.is_empty() {
                        continue;
                    }
                    self.core.receive_link(packets, now())?
                }
                read = tunnel_rx.recv() => {
                    let packets = read
                        .unwrap_or_else(|| Err(reader_gone("tunnel")))
                        .map_err(SessionError::TunnelFailure)?;
                    if packets.is_empty() {
                        continue;
                    }
                    self.core.receive_tunnel(packets, now())?
                }
                _ = ticker.tick() => self.core.tick(now())?,
            };
            self.deliver(output).await?;
        }
    }

    async fn deliver(&mut self, output: Output) -> Result<(), SessionError> {
        let Output { link, tunnel, status } = output;
        self.reporter.publish(&self.core, status);
        if !link.is_empty() {
            self.link
                .write_packets(link)
                .await
                .map_err(SessionError::LinkFailure)?;
        }
        for batch in tunnel {
            self.tunnel
                .write_packets(batch)
                .await
                .map_err(SessionError::TunnelFailure)?;
        }
        Ok(())
    }
}

fn reader_gone(name: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, format!("{name} reader stopped"))
}

// tokio's clock so that paused test time drives the session timers
fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Re-arm `read` until cancelled or the read fails. The failure is
/// forwarded so that the actor shuts the session down.
async fn read_loop<F, Fut>(
    name: &'static str,
    cancel: CancellationToken,
    tx: mpsc::Sender<ReadResult>,
    read: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ReadResult>,
{
    while !cancel.is_cancelled() {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = read() => result,
        };
        let failed = result.is_err();
        if tx.send(result).await.is_err() || failed {
            break;
        }
    }
    debug!(reader = name, "read loop exited");
}
