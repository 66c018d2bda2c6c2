//! Control channel state machine for one key epoch.
//!
//! ```text
//! initial:        Start -> HardResetSent -> TlsHandshaking -> PushRequestSent -> Connected
//! renegotiation:  Start -> SoftResetSent -> TlsHandshaking -> Connected
//! ```
//! A negotiator never retries on its own. Every protocol violation is a
//! terminal [`SessionError`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::Configuration;
use crate::control::{ControlChannel, RetransmitSettings};
use crate::core::{
    EKM_LABEL, KEY_ID_MASK, KEY_MATERIAL_SIZE, PUSH_REQUEST, SecureChannel, SessionError,
};
use crate::crypto::{KeyMaterial, PrfInputs};
use crate::packet::{ControlPacket, PacketCode, SessionId};

use super::auth::{self, Credentials, LocalKeySource, RemoteKeySource};
use super::push::{ControlMessage, MessageBuffer, PushAccumulator};

/// Phase of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatorState {
    /// Nothing sent yet.
    Start,
    /// Waiting for the server's hard reset.
    HardResetSent,
    /// Waiting for the server's soft reset.
    SoftResetSent,
    /// TLS handshake and key method exchange in progress.
    TlsHandshaking,
    /// Waiting for `PUSH_REPLY`.
    PushRequestSent,
    /// Keys derived.
    Connected,
}

impl NegotiatorState {
    /// Name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::HardResetSent => "hardResetSent",
            Self::SoftResetSent => "softResetSent",
            Self::TlsHandshaking => "tlsHandshaking",
            Self::PushRequestSent => "pushRequestSent",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for NegotiatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a negotiation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationKind {
    /// First negotiation of the session (hard reset).
    Initial,
    /// Renegotiation started by us, e.g. `reneg-sec`.
    ClientRenegotiation,
    /// Renegotiation started by a server soft reset.
    ServerRenegotiation,
}

impl NegotiationKind {
    /// Whether this is a renegotiation.
    pub fn is_renegotiation(self) -> bool {
        !matches!(self, Self::Initial)
    }
}

/// Engine settings shared by every negotiator of a session.
#[derive(Debug, Clone)]
pub struct NegotiatorSettings {
    /// `auth-user-pass` credentials.
    pub credentials: Option<Credentials>,
    /// `IV_PLAT` value.
    pub platform: String,
    /// Control packet retransmission.
    pub retransmit: RetransmitSettings,
    /// Largest TLS fragment per control packet.
    pub max_control_payload: usize,
    /// Interval between repeated `PUSH_REQUEST` messages.
    pub push_request_interval: Duration,
    /// Deadline for reaching [`NegotiatorState::Connected`].
    pub negotiation_timeout: Duration,
    /// Skip retransmissions (TCP).
    pub reliable_link: bool,
}

/// Outcome of a completed negotiation.
#[derive(Debug)]
pub struct Negotiated {
    /// Data channel key id.
    pub key: u8,
    /// Derived data channel keys.
    pub material: KeyMaterial,
    /// Profile with pushed options applied.
    pub configuration: Configuration,
    /// Options pushed by the server, initial negotiation only.
    pub pushed: Option<Configuration>,
}

/// Next key id after `key`: 1..=7, wrapping, never 0.
pub fn next_key(key: u8) -> u8 {
    match ((key & KEY_ID_MASK) + 1) & KEY_ID_MASK {
        0 => 1,
        next => next,
    }
}

/// One negotiation: reset exchange, TLS, key method 2, push.
pub struct Negotiator {
    kind: NegotiationKind,
    state: NegotiatorState,
    channel: ControlChannel,
    tls: Box<dyn SecureChannel>,
    configuration: Configuration,
    settings: Arc<NegotiatorSettings>,
    local_keys: LocalKeySource,
    remote_keys: Option<RemoteKeySource>,
    auth_sent: bool,
    auth_buffer: Vec<u8>,
    messages: MessageBuffer,
    push: PushAccumulator,
    started_at: Instant,
    last_push_request: Option<Instant>,
    outbox: Vec<ControlPacket>,
}

impl Negotiator {
    /// Create a negotiator for `key`. Nothing is sent before [`start`](Self::start).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: NegotiationKind,
        key: u8,
        local_session_id: SessionId,
        remote_session_id: Option<SessionId>,
        tls: Box<dyn SecureChannel>,
        configuration: Configuration,
        settings: Arc<NegotiatorSettings>,
        now: Instant,
    ) -> Self {
        let channel = ControlChannel::new(
            key & KEY_ID_MASK,
            local_session_id,
            remote_session_id,
            settings.retransmit,
            settings.max_control_payload,
        );
        Self {
            kind,
            state: NegotiatorState::Start,
            channel,
            tls,
            configuration,
            settings,
            local_keys: LocalKeySource::generate(),
            remote_keys: None,
            auth_sent: false,
            auth_buffer: Vec::new(),
            messages: MessageBuffer::default(),
            push: PushAccumulator::default(),
            started_at: now,
            last_push_request: None,
            outbox: Vec::new(),
        }
    }

    /// Key id of this epoch.
    pub fn key(&self) -> u8 {
        self.channel.key()
    }

    /// Current phase.
    pub fn state(&self) -> NegotiatorState {
        self.state
    }

    /// Why this negotiation runs.
    pub fn kind(&self) -> NegotiationKind {
        self.kind
    }

    /// Whether keys were derived.
    pub fn is_connected(&self) -> bool {
        self.state == NegotiatorState::Connected
    }

    /// Our session id.
    pub fn local_session_id(&self) -> SessionId {
        self.channel.local_session_id()
    }

    /// Server session id, once known.
    pub fn remote_session_id(&self) -> Option<SessionId> {
        self.channel.remote_session_id()
    }

    /// Send the opening reset.
    pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.state != NegotiatorState::Start {
            return Err(SessionError::AlreadyStarted);
        }
        let (code, next) = match self.kind {
            NegotiationKind::Initial => (PacketCode::HardResetClient, NegotiatorState::HardResetSent),
            _ => (PacketCode::SoftReset, NegotiatorState::SoftResetSent),
        };
        let packets = self.channel.write(code, &[], now);
        self.outbox.extend(packets);
        self.transition(next);
        Ok(())
    }

    /// Feed one decoded control packet of this key.
    ///
    /// Acks are processed first. Payload packets are acked, reordered and
    /// handled strictly by packet id. Returns the derived keys when this
    /// packet completed the negotiation.
    pub fn receive(&mut self, packet: ControlPacket, now: Instant) -> Result<Option<Negotiated>, SessionError> {
        self.channel.handle_acks(&packet, now);
        if packet.is_ack() {
            return Ok(None);
        }

        match self.channel.remote_session_id() {
            None if matches!(packet.code, PacketCode::HardResetServer | PacketCode::SoftReset) => {
                debug!(key = self.key(), remote = %packet.session_id.to_hex(), "peer session id learned");
                self.channel.set_remote_session_id(packet.session_id);
            }
            Some(remote) if remote == packet.session_id => {}
            _ => {
                debug!(key = self.key(), code = %packet.code, "dropped packet from unknown session");
                return Ok(None);
            }
        }

        let ready = self.channel.enqueue_inbound(packet);
        let acks = self.channel.take_ack_packets();
        self.outbox.extend(acks);

        let mut negotiated = None;
        for packet in ready {
            if let Some(result) = self.handle(packet, now)? {
                negotiated = Some(result);
            }
        }
        Ok(negotiated)
    }

    /// Timer work: deadline, retransmissions and push request retries.
    pub fn tick(&mut self, now: Instant) -> Result<(), SessionError> {
        if !self.is_connected() && now.saturating_duration_since(self.started_at) >= self.settings.negotiation_timeout {
            warn!(key = self.key(), state = %self.state, "negotiation timed out");
            return Err(SessionError::NegotiationTimeout);
        }
        if !self.settings.reliable_link {
            let retransmissions = self.channel.take_retransmissions(now);
            if !retransmissions.is_empty() {
                trace!(key = self.key(), count = retransmissions.len(), "retransmitting control packets");
            }
            self.outbox.extend(retransmissions);
        }
        if self.state == NegotiatorState::PushRequestSent {
            let due = self
                .last_push_request
                .is_none_or(|at| now.saturating_duration_since(at) >= self.settings.push_request_interval);
            if due {
                self.send_push_request(now)?;
            }
        }
        Ok(())
    }

    /// Packets to put on the link, in order.
    pub fn take_outbound(&mut self) -> Vec<ControlPacket> {
        std::mem::take(&mut self.outbox)
    }

    /// Whether sent packets still await acknowledgment.
    pub fn has_pending_outbound(&self) -> bool {
        self.channel.has_pending_outbound()
    }

    /// Forget everything in flight.
    pub fn abandon(&mut self) {
        self.channel.abandon();
        self.outbox.clear();
    }

    fn transition(&mut self, next: NegotiatorState) {
        debug!(key = self.key(), from = %self.state, to = %next, "negotiator state");
        self.state = next;
    }

    fn unexpected(&self, code: PacketCode) -> SessionError {
        SessionError::UnexpectedPacket {
            code,
            state: self.state.name(),
        }
    }

    fn handle(&mut self, packet: ControlPacket, now: Instant) -> Result<Option<Negotiated>, SessionError> {
        let code = packet.code;
        match (self.state, code) {
            (NegotiatorState::HardResetSent, PacketCode::HardResetServer)
            | (NegotiatorState::SoftResetSent, PacketCode::SoftReset) => {
                self.tls.start()?;
                self.transition(NegotiatorState::TlsHandshaking);
                self.flush_tls(now)?;
                Ok(None)
            }
            (
                NegotiatorState::TlsHandshaking | NegotiatorState::PushRequestSent | NegotiatorState::Connected,
                PacketCode::Control,
            ) => self.handle_tls(packet.payload.as_deref().unwrap_or_default(), now),
            _ => Err(self.unexpected(code)),
        }
    }

    fn flush_tls(&mut self, now: Instant) -> Result<(), SessionError> {
        loop {
            let ciphertext = self.tls.pull_ciphertext()?;
            if ciphertext.is_empty() {
                return Ok(());
            }
            let packets = self.channel.write(PacketCode::Control, &ciphertext, now);
            self.outbox.extend(packets);
        }
    }

    fn pull_plaintext(&mut self) -> Result<Vec<u8>, SessionError> {
        let mut plain = Vec::new();
        loop {
            let chunk = self.tls.pull_plaintext()?;
            if chunk.is_empty() {
                return Ok(plain);
            }
            plain.extend_from_slice(&chunk);
        }
    }

    fn handle_tls(&mut self, ciphertext: &[u8], now: Instant) -> Result<Option<Negotiated>, SessionError> {
        self.tls.put_ciphertext(ciphertext)?;
        if self.tls.is_connected() && !self.auth_sent {
            self.send_auth()?;
        }
        self.flush_tls(now)?;

        let plain = self.pull_plaintext()?;
        if plain.is_empty() {
            return Ok(None);
        }

        if self.remote_keys.is_none() {
            self.auth_buffer.extend_from_slice(&plain);
            let Some(remote) = auth::parse_server_message(&self.auth_buffer)? else {
                return Ok(None);
            };
            debug!(key = self.key(), options = %remote.options, "server key exchange received");
            self.remote_keys = Some(remote);
            self.auth_buffer.clear();
            return self.on_key_exchange(now);
        }

        let mut negotiated = None;
        for message in self.messages.push(&plain) {
            if let Some(result) = self.handle_message(message)? {
                negotiated = Some(result);
            }
        }
        Ok(negotiated)
    }

    fn send_auth(&mut self) -> Result<(), SessionError> {
        let credentials = self.settings.credentials.clone().map(|mut credentials| {
            if let Some(token) = &self.configuration.auth_token {
                credentials.password = token.clone();
            }
            credentials
        });
        let message = auth::client_message(
            &self.local_keys,
            &auth::options_string(&self.configuration),
            credentials.as_ref(),
            &auth::peer_info(&self.configuration, &self.settings.platform),
        );
        self.tls.write_plaintext(&message)?;
        self.auth_sent = true;
        debug!(key = self.key(), "key method 2 message sent");
        Ok(())
    }

    fn on_key_exchange(&mut self, now: Instant) -> Result<Option<Negotiated>, SessionError> {
        if self.kind.is_renegotiation() {
            return self.complete(None).map(Some);
        }
        self.transition(NegotiatorState::PushRequestSent);
        self.send_push_request(now)?;
        Ok(None)
    }

    fn send_push_request(&mut self, now: Instant) -> Result<(), SessionError> {
        let mut message = PUSH_REQUEST.as_bytes().to_vec();
        message.push(0);
        self.tls.write_plaintext(&message)?;
        self.flush_tls(now)?;
        self.last_push_request = Some(now);
        trace!(key = self.key(), "push request sent");
        Ok(())
    }

    fn handle_message(&mut self, message: ControlMessage) -> Result<Option<Negotiated>, SessionError> {
        match message {
            ControlMessage::PushReply(text) => {
                if self.state != NegotiatorState::PushRequestSent {
                    debug!(key = self.key(), "ignored late push reply");
                    return Ok(None);
                }
                match self.push.add(&text)? {
                    Some(pushed) => self.complete(Some(pushed)).map(Some),
                    None => Ok(None),
                }
            }
            ControlMessage::AuthFailed(text) => {
                warn!(key = self.key(), "server rejected credentials");
                Err(SessionError::AuthFailed(text))
            }
            ControlMessage::Restart(text) | ControlMessage::Halt(text) => {
                warn!(key = self.key(), message = %text, "server shutdown");
                Err(SessionError::ServerShutdown(text))
            }
            ControlMessage::Other(text) => {
                debug!(key = self.key(), message = %text, "ignored control message");
                Ok(None)
            }
        }
    }

    fn complete(&mut self, pushed: Option<Configuration>) -> Result<Negotiated, SessionError> {
        if let Some(pushed) = &pushed {
            self.configuration = self.configuration.merged_with(pushed);
        }
        let material = self.derive_keys()?;
        self.transition(NegotiatorState::Connected);
        info!(
            key = self.key(),
            cipher = %self.configuration.fallback_cipher(),
            elapsed = ?self.started_at.elapsed(),
            "negotiation complete"
        );
        Ok(Negotiated {
            key: self.key(),
            material,
            configuration: self.configuration.clone(),
            pushed,
        })
    }

    fn derive_keys(&self) -> Result<KeyMaterial, SessionError> {
        if self.configuration.uses_tls_ekm == Some(true) {
            let exported = self.tls.export_keying_material(EKM_LABEL, KEY_MATERIAL_SIZE)?;
            return Ok(KeyMaterial::from_slice(&exported)?);
        }
        let remote = self
            .remote_keys
            .as_ref()
            .ok_or(SessionError::Assertion("keys derived before key exchange"))?;
        let server_session_id = self
            .channel
            .remote_session_id()
            .ok_or(SessionError::Assertion("keys derived without peer session id"))?;
        let client_session_id = self.channel.local_session_id();
        Ok(KeyMaterial::from_prf(&PrfInputs {
            pre_master: &self.local_keys.pre_master,
            client_random1: &self.local_keys.random1,
            client_random2: &self.local_keys.random2,
            server_random1: &remote.random1,
            server_random2: &remote.random2,
            client_session_id: client_session_id.as_bytes(),
            server_session_id: server_session_id.as_bytes(),
        })?)
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("kind", &self.kind)
            .field("key", &self.key())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::{DEFAULT_MAX_CONTROL_PAYLOAD, DEFAULT_NEGOTIATION_TIMEOUT, DEFAULT_PUSH_REQUEST_INTERVAL, INITIAL_RTO, TlsError};
    use crate::crypto::{Cipher, Role};

    /// In-memory stand-in for a TLS client. The handshake completes when the
    /// peer sends `SERVER_HELLO`; afterwards ciphertext equals plaintext.
    #[derive(Debug, Default)]
    pub(crate) struct PlainChannel {
        started: bool,
        connected: bool,
        outbound: Vec<u8>,
        inbound: Vec<u8>,
    }

    impl SecureChannel for PlainChannel {
        fn start(&mut self) -> Result<(), TlsError> {
            if self.started {
                return Err(TlsError("already started".to_string()));
            }
            self.started = true;
            self.outbound.extend_from_slice(b"CLIENT_HELLO");
            Ok(())
        }

        fn put_ciphertext(&mut self, data: &[u8]) -> Result<(), TlsError> {
            if !self.started {
                return Err(TlsError("not started".to_string()));
            }
            if self.connected {
                self.inbound.extend_from_slice(data);
            } else if data == b"SERVER_HELLO" {
                self.connected = true;
            }
            Ok(())
        }

        fn pull_ciphertext(&mut self) -> Result<Vec<u8>, TlsError> {
            Ok(std::mem::take(&mut self.outbound))
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn write_plaintext(&mut self, data: &[u8]) -> Result<(), TlsError> {
            self.outbound.extend_from_slice(data);
            Ok(())
        }

        fn pull_plaintext(&mut self) -> Result<Vec<u8>, TlsError> {
            Ok(std::mem::take(&mut self.inbound))
        }

        fn export_keying_material(&self, _label: &str, len: usize) -> Result<Vec<u8>, TlsError> {
            Ok(vec![0x11; len])
        }
    }

    pub(crate) fn settings() -> Arc<NegotiatorSettings> {
        Arc::new(NegotiatorSettings {
            credentials: Some(Credentials::new("user", "pass")),
            platform: "test".to_string(),
            retransmit: RetransmitSettings::default(),
            max_control_payload: DEFAULT_MAX_CONTROL_PAYLOAD,
            push_request_interval: DEFAULT_PUSH_REQUEST_INTERVAL,
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
            reliable_link: false,
        })
    }

    /// Scripted server side of one key epoch.
    pub(crate) struct ScriptedServer {
        pub(crate) channel: ControlChannel,
    }

    impl ScriptedServer {
        pub(crate) fn new(key: u8, client: SessionId) -> Self {
            Self {
                channel: ControlChannel::new(
                    key,
                    SessionId::from_bytes([0x5e; 8]),
                    Some(client),
                    RetransmitSettings::default(),
                    DEFAULT_MAX_CONTROL_PAYLOAD,
                ),
            }
        }

        pub(crate) fn send(&mut self, code: PacketCode, payload: &[u8]) -> Vec<ControlPacket> {
            self.channel.write(code, payload, Instant::now())
        }

        pub(crate) fn key_exchange(&mut self) -> Vec<ControlPacket> {
            self.send(PacketCode::Control, &auth::server_message([1; 32], [2; 32], "V4,tls-server"))
        }

        pub(crate) fn push_reply(&mut self, options: &str) -> Vec<ControlPacket> {
            self.send(PacketCode::Control, format!("PUSH_REPLY,{options}\0").as_bytes())
        }
    }

    fn negotiator(kind: NegotiationKind, key: u8, configuration: Configuration) -> Negotiator {
        let remote = kind.is_renegotiation().then(|| SessionId::from_bytes([0x5e; 8]));
        Negotiator::new(
            kind,
            key,
            SessionId::from_bytes([0xc1; 8]),
            remote,
            Box::<PlainChannel>::default(),
            configuration,
            settings(),
            Instant::now(),
        )
    }

    fn feed(negotiator: &mut Negotiator, packets: Vec<ControlPacket>) -> Option<Negotiated> {
        let mut result = None;
        for packet in packets {
            if let Some(negotiated) = negotiator.receive(packet, Instant::now()).unwrap() {
                result = Some(negotiated);
            }
        }
        result
    }

    fn payloads(packets: &[ControlPacket]) -> Vec<u8> {
        packets
            .iter()
            .filter(|p| p.code == PacketCode::Control)
            .flat_map(|p| p.payload.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_initial_negotiation() {
        let mut client = negotiator(NegotiationKind::Initial, 0, Configuration::default());
        client.start(Instant::now()).unwrap();
        let out = client.take_outbound();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, PacketCode::HardResetClient);
        assert_eq!(client.state(), NegotiatorState::HardResetSent);

        let mut server = ScriptedServer::new(0, client.local_session_id());
        assert!(feed(&mut client, server.send(PacketCode::HardResetServer, &[])).is_none());
        let out = client.take_outbound();
        // ack first, then the ClientHello
        assert!(out[0].is_ack());
        assert_eq!(out[0].ack_ids, Some(vec![0]));
        assert_eq!(payloads(&out), b"CLIENT_HELLO");
        assert_eq!(client.state(), NegotiatorState::TlsHandshaking);

        feed(&mut client, server.send(PacketCode::Control, b"SERVER_HELLO"));
        let auth_message = payloads(&client.take_outbound());
        assert_eq!(&auth_message[..5], &[0, 0, 0, 0, 2]);

        feed(&mut client, server.key_exchange());
        assert_eq!(client.state(), NegotiatorState::PushRequestSent);
        assert_eq!(payloads(&client.take_outbound()), b"PUSH_REQUEST\0");

        let negotiated = feed(&mut client, server.push_reply("cipher AES-256-GCM,peer-id 3")).unwrap();
        assert!(client.is_connected());
        assert_eq!(negotiated.key, 0);
        assert_eq!(negotiated.configuration.cipher, Some(Cipher::Aes256Gcm));
        assert_eq!(negotiated.pushed.and_then(|p| p.peer_id), Some(3));
    }

    #[test]
    fn test_ekm_key_derivation() {
        let mut client = negotiator(NegotiationKind::Initial, 0, Configuration::default());
        client.start(Instant::now()).unwrap();
        let mut server = ScriptedServer::new(0, client.local_session_id());
        feed(&mut client, server.send(PacketCode::HardResetServer, &[]));
        feed(&mut client, server.send(PacketCode::Control, b"SERVER_HELLO"));
        feed(&mut client, server.key_exchange());
        let negotiated = feed(&mut client, server.push_reply("key-derivation tls-ekm")).unwrap();
        assert_eq!(negotiated.material.encrypt_cipher_key(Role::Client, 16), &[0x11; 16]);
    }

    #[test]
    fn test_renegotiation_skips_push() {
        let configuration = Configuration {
            cipher: Some(Cipher::Aes128Gcm),
            ..Default::default()
        };
        let mut client = negotiator(NegotiationKind::ClientRenegotiation, 1, configuration);
        client.start(Instant::now()).unwrap();
        let out = client.take_outbound();
        assert_eq!((out[0].code, out[0].key), (PacketCode::SoftReset, 1));

        let mut server = ScriptedServer::new(1, client.local_session_id());
        feed(&mut client, server.send(PacketCode::SoftReset, &[]));
        feed(&mut client, server.send(PacketCode::Control, b"SERVER_HELLO"));
        let negotiated = feed(&mut client, server.key_exchange()).unwrap();
        assert_eq!(negotiated.key, 1);
        assert!(negotiated.pushed.is_none());
        assert!(client.is_connected());
    }

    #[test]
    fn test_out_of_order_handshake() {
        let mut client = negotiator(NegotiationKind::Initial, 0, Configuration::default());
        client.start(Instant::now()).unwrap();
        let mut server = ScriptedServer::new(0, client.local_session_id());
        feed(&mut client, server.send(PacketCode::HardResetServer, &[]));

        let mut packets = server.send(PacketCode::Control, b"SERVER_HELLO");
        packets.extend(server.key_exchange());
        packets.reverse();
        feed(&mut client, packets);
        // the key exchange was held back until the hello filled the gap
        assert!(client.auth_sent);
        assert_eq!(client.state(), NegotiatorState::PushRequestSent);
    }

    #[test]
    fn test_unexpected_packet_is_fatal() {
        let mut client = negotiator(NegotiationKind::Initial, 0, Configuration::default());
        client.start(Instant::now()).unwrap();
        let mut server = ScriptedServer::new(0, client.local_session_id());
        feed(&mut client, server.send(PacketCode::HardResetServer, &[]));
        let soft = server.send(PacketCode::SoftReset, &[]).remove(0);
        assert!(matches!(
            client.receive(soft, Instant::now()),
            Err(SessionError::UnexpectedPacket {
                code: PacketCode::SoftReset,
                state: "tlsHandshaking"
            })
        ));
    }

    #[test]
    fn test_auth_failed() {
        let mut client = negotiator(NegotiationKind::Initial, 0, Configuration::default());
        client.start(Instant::now()).unwrap();
        let mut server = ScriptedServer::new(0, client.local_session_id());
        feed(&mut client, server.send(PacketCode::HardResetServer, &[]));
        feed(&mut client, server.send(PacketCode::Control, b"SERVER_HELLO"));
        feed(&mut client, server.key_exchange());
        let failure = server.send(PacketCode::Control, b"AUTH_FAILED\0").remove(0);
        assert!(matches!(
            client.receive(failure, Instant::now()),
            Err(SessionError::AuthFailed(_))
        ));
    }

    #[test]
    fn test_foreign_session_dropped() {
        let mut client = negotiator(NegotiationKind::Initial, 0, Configuration::default());
        client.start(Instant::now()).unwrap();
        let mut server = ScriptedServer::new(0, client.local_session_id());
        feed(&mut client, server.send(PacketCode::HardResetServer, &[]));
        client.take_outbound();

        let stranger = ControlPacket::new(PacketCode::Control, 0, SessionId::from_bytes([9; 8]), 1, b"x".to_vec());
        assert!(client.receive(stranger, Instant::now()).unwrap().is_none());
        assert!(client.take_outbound().is_empty());
    }

    #[test]
    fn test_tick_retransmits_and_times_out() {
        let start = Instant::now();
        let mut client = negotiator(NegotiationKind::Initial, 0, Configuration::default());
        client.start(start).unwrap();
        client.take_outbound();

        client.tick(start + INITIAL_RTO).unwrap();
        let out = client.take_outbound();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, PacketCode::HardResetClient);

        assert!(matches!(
            client.tick(start + DEFAULT_NEGOTIATION_TIMEOUT + Duration::from_secs(1)),
            Err(SessionError::NegotiationTimeout)
        ));
    }

    #[test]
    fn test_push_request_retried() {
        let mut client = negotiator(NegotiationKind::Initial, 0, Configuration::default());
        client.start(Instant::now()).unwrap();
        let mut server = ScriptedServer::new(0, client.local_session_id());
        feed(&mut client, server.send(PacketCode::HardResetServer, &[]));
        feed(&mut client, server.send(PacketCode::Control, b"SERVER_HELLO"));
        feed(&mut client, server.key_exchange());
        client.take_outbound();

        client.tick(Instant::now() + DEFAULT_PUSH_REQUEST_INTERVAL).unwrap();
        assert!(payloads(&client.take_outbound()).ends_with(b"PUSH_REQUEST\0"));
    }

    #[test]
    fn test_next_key_skips_zero() {
        assert_eq!(next_key(0), 1);
        assert_eq!(next_key(6), 7);
        assert_eq!(next_key(7), 1);
    }
}
