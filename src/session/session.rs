//! Public session handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Configuration;
use crate::core::{Link, SecureChannelFactory, SessionError, Tunnel};

use super::engine::SessionCore;
use super::io::{Actor, Reporter};
use super::options::SessionOptions;
use super::status::{DataCount, SessionStatus};

/// An OpenVPN client session over one link and one tunnel.
///
/// A session runs once: it negotiates, carries data, renegotiates as
/// needed and stops on request or at the first terminal error. There is no
/// reconnect logic inside; create a new session to try again.
///
/// # Example
///
/// ```ignore
/// use ovpn_session::prelude::*;
///
/// let options = SessionOptions::builder()
///     .credentials(Credentials::new("user", "pass"))
///     .build();
/// let mut session = Session::new(configuration, tls_factory, options)?;
/// session.start(link, tunnel)?;
/// let mut status = session.subscribe();
/// while status.changed().await.is_ok() {
///     println!("{:?}", *status.borrow());
/// }
/// session.wait().await?;
/// ```
pub struct Session {
    pending: Option<(SessionCore, Reporter)>,
    tick_interval: Duration,
    status: watch::Receiver<SessionStatus>,
    data_count: watch::Receiver<DataCount>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), SessionError>>>,
}

impl Session {
    /// Prepare a session for `configuration`.
    ///
    /// Fails when the profile cannot be turned into a control channel.
    pub fn new(
        configuration: Configuration,
        tls_factory: Arc<dyn SecureChannelFactory>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let tick_interval = options.tick_interval;
        let core = SessionCore::new(configuration, tls_factory, options)?;
        let (status_tx, status) = watch::channel(SessionStatus::Idle);
        let (count_tx, data_count) = watch::channel(DataCount::default());
        let reporter = Reporter {
            status: status_tx,
            data_count: count_tx,
        };
        Ok(Self {
            pending: Some((core, reporter)),
            tick_interval,
            status,
            data_count,
            cancel: CancellationToken::new(),
            task: None,
        })
    }

    /// Spawn the session on the current tokio runtime.
    pub fn start(&mut self, link: Arc<dyn Link>, tunnel: Arc<dyn Tunnel>) -> Result<(), SessionError> {
        let (core, reporter) = self.pending.take().ok_or(SessionError::AlreadyStarted)?;
        let actor = Actor {
            core,
            link,
            tunnel,
            reporter,
            tick_interval: self.tick_interval,
            cancel: self.cancel.clone(),
        };
        self.task = Some(tokio::spawn(actor.run()));
        Ok(())
    }

    /// Request shutdown. In-flight reads are cancelled.
    pub fn stop(&mut self) {
        debug!("session stop requested");
        self.cancel.cancel();
        if let Some((mut core, reporter)) = self.pending.take() {
            let output = core.stop();
            reporter.publish(&core, output.status);
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Tunnel byte counters.
    pub fn data_count(&self) -> DataCount {
        *self.data_count.borrow()
    }

    /// Wait for the session to end.
    ///
    /// `Ok(())` after [`stop`](Self::stop), otherwise the terminal error.
    /// Returns immediately if the session never started.
    pub async fn wait(&mut self) -> Result<(), SessionError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.await
            .map_err(|_| SessionError::Assertion("session task aborted"))?
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &*self.status.borrow())
            .field("started", &self.task.is_some())
            .finish_non_exhaustive()
    }
}
