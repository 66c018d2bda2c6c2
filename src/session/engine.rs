//! Synchronous session state machine.
//!
//! [`SessionCore`] owns the negotiators, the control codec and the data
//! channel keys. It performs no I/O: every entry point takes a batch of
//! packets (or the current time) and returns what must be written to the
//! link and to the tunnel. The async [`Session`](super::Session) serializes
//! all calls, so no state here is ever shared.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::config::Configuration;
use crate::control::ControlCodec;
use crate::core::{KEY_ID_COUNT, SecureChannelFactory, SessionError};
use crate::crypto::Role;
use crate::data::{DataChannel, DataChannelKeySet};
use crate::negotiator::{
    NegotiationKind, Negotiated, Negotiator, NegotiatorSettings, next_key,
};
use crate::packet::{ControlPacket, Frame, PacketCode, SessionId, classify};

use super::options::SessionOptions;
use super::status::{DataCount, SessionStatus, TunnelSettings};

/// Packets produced by one call into [`SessionCore`].
#[derive(Debug, Default)]
pub struct Output {
    /// Frames for the link, in send order.
    pub link: Vec<Vec<u8>>,
    /// Decrypted packets for the tunnel, one batch per key id.
    pub tunnel: Vec<Vec<Vec<u8>>>,
    /// New status, when it changed.
    pub status: Option<SessionStatus>,
}

impl Output {
    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.link.is_empty() && self.tunnel.is_empty() && self.status.is_none()
    }
}

/// Protocol state of one session.
pub struct SessionCore {
    profile: Configuration,
    active: Configuration,
    factory: Arc<dyn SecureChannelFactory>,
    options: SessionOptions,
    settings: Arc<NegotiatorSettings>,
    codec: ControlCodec,
    local_session_id: SessionId,
    current: Option<Negotiator>,
    pending: Option<Negotiator>,
    keys: DataChannelKeySet,
    status: SessionStatus,
    stopped: bool,
    negotiated_at: Option<Instant>,
    last_received: Option<Instant>,
    last_data_sent: Option<Instant>,
    data_count: DataCount,
}

impl SessionCore {
    /// Validate `configuration` and prepare a session. Nothing is sent
    /// before [`start`](Self::start).
    pub fn new(
        configuration: Configuration,
        factory: Arc<dyn SecureChannelFactory>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let codec = ControlCodec::from_configuration(&configuration)?;
        let settings = options.negotiator_settings(&configuration, false);
        let keys = DataChannelKeySet::new(options.lame_duck);
        Ok(Self {
            active: configuration.clone(),
            profile: configuration,
            factory,
            options,
            settings,
            codec,
            local_session_id: SessionId::generate(),
            current: None,
            pending: None,
            keys,
            status: SessionStatus::Idle,
            stopped: false,
            negotiated_at: None,
            last_received: None,
            last_data_sent: None,
            data_count: DataCount::default(),
        })
    }

    /// Current status.
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Tunnel byte counters.
    pub fn data_count(&self) -> DataCount {
        self.data_count
    }

    /// Profile with pushed options applied, once connected.
    pub fn configuration(&self) -> &Configuration {
        &self.active
    }

    /// Our control channel session id.
    pub fn local_session_id(&self) -> SessionId {
        self.local_session_id
    }

    /// Whether a renegotiation is in flight.
    pub fn is_renegotiating(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether [`stop`](Self::stop) ran.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Send the initial hard reset.
    pub fn start(&mut self, reliable_link: bool, now: Instant) -> Result<Output, SessionError> {
        if self.current.is_some() || self.stopped {
            return Err(SessionError::AlreadyStarted);
        }
        self.settings = self.options.negotiator_settings(&self.profile, reliable_link);
        let tls = self.factory.make_channel(&self.profile)?;
        let mut negotiator = Negotiator::new(
            NegotiationKind::Initial,
            0,
            self.local_session_id,
            None,
            tls,
            self.profile.clone(),
            self.settings.clone(),
            now,
        );
        negotiator.start(now)?;
        info!(
            session = %self.describe_session_id(),
            reliable_link,
            "session started"
        );
        self.current = Some(negotiator);
        self.last_received = Some(now);

        let mut output = Output::default();
        self.set_status(SessionStatus::Connecting, &mut output);
        self.flush(&mut output)?;
        Ok(output)
    }

    /// Process a batch read from the link.
    ///
    /// Malformed frames and data for unknown keys are dropped. Control
    /// packets are handled in arrival order, then data frames are decrypted
    /// with one tunnel batch per key.
    pub fn receive_link(&mut self, packets: Vec<Vec<u8>>, now: Instant) -> Result<Output, SessionError> {
        let mut output = Output::default();
        if self.stopped {
            return Ok(output);
        }
        if self.current.is_none() {
            return Err(SessionError::Assertion("link read before start"));
        }
        self.last_received = Some(now);
        self.maybe_renegotiate(now)?;

        let mut data_by_key: [Vec<&[u8]>; KEY_ID_COUNT] = Default::default();
        for bytes in &packets {
            let frame = match classify(bytes) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "dropped malformed packet");
                    continue;
                }
            };
            match frame {
                Frame::Data { header, bytes } => {
                    if !self.keys.has_key(header.key) {
                        debug!(key = header.key, "dropped data for unknown key");
                        continue;
                    }
                    data_by_key[usize::from(header.key)].push(bytes);
                }
                Frame::Control { bytes, .. } => {
                    let packet = match self.codec.decode(bytes) {
                        Ok(packet) => packet,
                        Err(e) => {
                            debug!(error = %e, "dropped malformed control packet");
                            continue;
                        }
                    };
                    trace!(
                        packet = %packet.debug_description(self.options.log_sensitive),
                        "control packet received"
                    );
                    if let Some(negotiated) = self.receive_control(packet, now)? {
                        self.install(negotiated, now, &mut output)?;
                    }
                }
            }
        }

        for (key, frames) in data_by_key.iter().enumerate() {
            if frames.is_empty() {
                continue;
            }
            let batch = self.keys.decrypt(key as u8, frames.iter().copied());
            if batch.packets.is_empty() {
                continue;
            }
            let bytes: usize = batch.packets.iter().map(Vec::len).sum();
            self.data_count.received += bytes as u64;
            output.tunnel.push(batch.packets);
        }

        self.flush(&mut output)?;
        Ok(output)
    }

    /// Process a batch read from the tunnel.
    ///
    /// Packets are dropped, not queued, while no data channel is up.
    pub fn receive_tunnel(&mut self, packets: Vec<Vec<u8>>, now: Instant) -> Result<Output, SessionError> {
        let mut output = Output::default();
        if self.stopped {
            return Ok(output);
        }
        if !self.status.is_connected() {
            trace!(count = packets.len(), "dropped tunnel packets before connection");
            return Ok(output);
        }
        self.check_ping_timeout(now)?;
        let Some(frames) = self.keys.encrypt(&packets)? else {
            trace!(count = packets.len(), "dropped tunnel packets without key");
            return Ok(output);
        };
        let bytes: usize = packets.iter().map(Vec::len).sum();
        self.data_count.sent += bytes as u64;
        self.last_data_sent = Some(now);
        output.link = frames;
        Ok(output)
    }

    /// Timer work: liveness, renegotiation, retransmissions, keepalive and
    /// lame duck expiry.
    pub fn tick(&mut self, now: Instant) -> Result<Output, SessionError> {
        let mut output = Output::default();
        if self.stopped || self.current.is_none() {
            return Ok(output);
        }
        self.check_ping_timeout(now)?;
        self.maybe_renegotiate(now)?;
        for negotiator in self.current.iter_mut().chain(self.pending.iter_mut()) {
            negotiator.tick(now)?;
        }
        self.keys.expire(now);

        if let Some(interval) = self.active.keepalive_interval {
            let idle = self
                .last_data_sent
                .or(self.negotiated_at)
                .is_some_and(|at| now.saturating_duration_since(at) >= interval);
            if self.status.is_connected() && idle {
                if let Some(ping) = self.keys.encrypt_ping()? {
                    trace!("keepalive ping sent");
                    output.link.push(ping);
                    self.last_data_sent = Some(now);
                }
            }
        }

        self.flush(&mut output)?;
        Ok(output)
    }

    /// Stop for good. Keys and in-flight control packets are discarded.
    pub fn stop(&mut self) -> Output {
        let mut output = Output::default();
        if self.stopped {
            return output;
        }
        self.stopped = true;
        for negotiator in self.current.iter_mut().chain(self.pending.iter_mut()) {
            negotiator.abandon();
        }
        self.pending = None;
        self.keys.clear();
        self.set_status(SessionStatus::Stopped, &mut output);
        info!(session = %self.describe_session_id(), data_count = ?self.data_count, "session stopped");
        output
    }

    fn receive_control(&mut self, packet: ControlPacket, now: Instant) -> Result<Option<Negotiated>, SessionError> {
        let current = self
            .current
            .as_ref()
            .ok_or(SessionError::Assertion("no negotiator"))?;
        match packet.code {
            PacketCode::HardResetServer if current.is_connected() => {
                warn!(session = %self.describe_session_id(), "hard reset from server while connected");
                return Err(SessionError::StaleSession);
            }
            PacketCode::SoftReset
                if current.is_connected() && self.pending.is_none() && packet.key != current.key() =>
            {
                self.start_renegotiation(NegotiationKind::ServerRenegotiation, packet.key, now)?;
            }
            _ => {}
        }

        let negotiator = match (&mut self.pending, &mut self.current) {
            (Some(pending), _) if pending.key() == packet.key => pending,
            (_, Some(current)) if current.key() == packet.key => current,
            _ => {
                debug!(key = packet.key, code = %packet.code, "dropped control packet for unknown key");
                return Ok(None);
            }
        };
        negotiator.receive(packet, now)
    }

    fn maybe_renegotiate(&mut self, now: Instant) -> Result<(), SessionError> {
        let (Some(interval), Some(at)) = (self.active.renegotiation_interval, self.negotiated_at) else {
            return Ok(());
        };
        let Some(current) = &self.current else {
            return Ok(());
        };
        if self.pending.is_some() || !current.is_connected() || now.saturating_duration_since(at) < interval {
            return Ok(());
        }
        let key = next_key(current.key());
        self.start_renegotiation(NegotiationKind::ClientRenegotiation, key, now)
    }

    fn start_renegotiation(&mut self, kind: NegotiationKind, key: u8, now: Instant) -> Result<(), SessionError> {
        let remote = self
            .current
            .as_ref()
            .and_then(Negotiator::remote_session_id)
            .ok_or(SessionError::Assertion("renegotiation without peer session id"))?;
        let tls = self.factory.make_channel(&self.active)?;
        let mut negotiator = Negotiator::new(
            kind,
            key,
            self.local_session_id,
            Some(remote),
            tls,
            self.active.clone(),
            self.settings.clone(),
            now,
        );
        negotiator.start(now)?;
        info!(key, ?kind, "renegotiation started");
        self.pending = Some(negotiator);
        Ok(())
    }

    fn install(&mut self, negotiated: Negotiated, now: Instant, output: &mut Output) -> Result<(), SessionError> {
        let configuration = &negotiated.configuration;
        let channel = DataChannel::new(
            configuration.fallback_cipher(),
            configuration.fallback_digest(),
            &negotiated.material,
            Role::Client,
            negotiated.key,
            configuration.peer_id,
            configuration.compression_framing.unwrap_or_default(),
        )?;
        self.keys.install(channel, now);
        self.negotiated_at = Some(now);
        self.active = negotiated.configuration;

        if self.pending.as_ref().is_some_and(|p| p.key() == negotiated.key) {
            if let Some(mut previous) = self.current.take() {
                encode_outbound(&mut self.codec, &mut previous, self.options.log_sensitive, &mut output.link)?;
            }
            self.current = self.pending.take();
            info!(key = negotiated.key, "renegotiation complete");
        }

        if !self.status.is_connected() {
            let settings = TunnelSettings::from_configuration(&self.active);
            self.set_status(SessionStatus::Connected(settings), output);
        }
        Ok(())
    }

    fn check_ping_timeout(&self, now: Instant) -> Result<(), SessionError> {
        let (Some(timeout), Some(at)) = (self.active.keepalive_timeout, self.last_received) else {
            return Ok(());
        };
        if now.saturating_duration_since(at) >= timeout {
            warn!(?timeout, "no packets received within ping timeout");
            return Err(SessionError::PingTimeout);
        }
        Ok(())
    }

    fn flush(&mut self, output: &mut Output) -> Result<(), SessionError> {
        for negotiator in self.current.iter_mut().chain(self.pending.iter_mut()) {
            encode_outbound(&mut self.codec, negotiator, self.options.log_sensitive, &mut output.link)?;
        }
        Ok(())
    }

    fn set_status(&mut self, status: SessionStatus, output: &mut Output) {
        if self.status == status {
            return;
        }
        debug!(from = ?self.status, to = ?status, "session status");
        self.status = status.clone();
        output.status = Some(status);
    }

    fn describe_session_id(&self) -> String {
        if self.options.log_sensitive {
            self.local_session_id.to_hex()
        } else {
            "<redacted>".to_string()
        }
    }
}

fn encode_outbound(
    codec: &mut ControlCodec,
    negotiator: &mut Negotiator,
    log_sensitive: bool,
    link: &mut Vec<Vec<u8>>,
) -> Result<(), SessionError> {
    for packet in negotiator.take_outbound() {
        trace!(packet = %packet.debug_description(log_sensitive), "control packet sent");
        link.push(codec.encode(&packet)?);
    }
    Ok(())
}

impl std::fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCore")
            .field("status", &self.status)
            .field("current", &self.current)
            .field("pending", &self.pending)
            .field("keys", &self.keys.keys())
            .finish_non_exhaustive()
    }
}
