//! Control packet codec: plain serialization plus optional tls-auth or
//! tls-crypt wrapping.

use tracing::debug;

use crate::config::{Configuration, TlsWrapStrategy};
use crate::core::{PacketError, SessionError};
use crate::packet::ControlPacket;

use super::tls_auth::TlsAuth;
use super::tls_crypt::TlsCrypt;

#[derive(Debug, Default)]
enum Wrapping {
    #[default]
    Plain,
    Auth(TlsAuth),
    Crypt(TlsCrypt),
}

/// Encodes and decodes control packets for one session.
#[derive(Debug, Default)]
pub struct ControlCodec {
    wrapping: Wrapping,
}

impl ControlCodec {
    /// Codec with optional tls-auth.
    pub fn new(tls_auth: Option<TlsAuth>) -> Self {
        let wrapping = tls_auth.map_or(Wrapping::Plain, Wrapping::Auth);
        Self { wrapping }
    }

    /// Codec with tls-crypt.
    pub fn with_tls_crypt(tls_crypt: TlsCrypt) -> Self {
        Self {
            wrapping: Wrapping::Crypt(tls_crypt),
        }
    }

    /// Build the codec a profile asks for.
    pub fn from_configuration(configuration: &Configuration) -> Result<Self, SessionError> {
        let Some(wrap) = &configuration.tls_wrap else {
            return Ok(Self::default());
        };
        Ok(match wrap.strategy {
            TlsWrapStrategy::Auth => {
                debug!(digest = %configuration.fallback_digest(), "control channel uses tls-auth");
                Self::new(Some(TlsAuth::new(
                    &wrap.key,
                    configuration.key_direction,
                    configuration.fallback_digest(),
                )))
            }
            TlsWrapStrategy::Crypt => {
                debug!("control channel uses tls-crypt");
                Self::with_tls_crypt(TlsCrypt::client(&wrap.key))
            }
        })
    }

    /// Extra bytes per packet added by wrapping.
    pub fn overhead(&self) -> usize {
        match &self.wrapping {
            Wrapping::Plain => 0,
            Wrapping::Auth(auth) => auth.overhead(),
            Wrapping::Crypt(crypt) => crypt.overhead(),
        }
    }

    /// Serialize a packet for the wire.
    pub fn encode(&mut self, packet: &ControlPacket) -> Result<Vec<u8>, SessionError> {
        let plain = packet.serialize()?;
        Ok(match &mut self.wrapping {
            Wrapping::Plain => plain,
            Wrapping::Auth(auth) => auth.wrap(&plain)?,
            Wrapping::Crypt(crypt) => crypt.wrap(&plain)?,
        })
    }

    /// Parse a packet from the wire.
    pub fn decode(&self, bytes: &[u8]) -> Result<ControlPacket, PacketError> {
        match &self.wrapping {
            Wrapping::Plain => ControlPacket::deserialize(bytes),
            Wrapping::Auth(auth) => ControlPacket::deserialize(&auth.unwrap(bytes)?),
            Wrapping::Crypt(crypt) => ControlPacket::deserialize(&crypt.unwrap(bytes)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsWrap;
    use crate::core::STATIC_KEY_SIZE;
    use crate::crypto::{Digest, KeyDirection, StaticKey};
    use crate::control::TlsCrypt;
    use crate::packet::{PacketCode, SessionId};

    fn wrap(strategy: TlsWrapStrategy) -> Option<TlsWrap> {
        Some(TlsWrap {
            strategy,
            key: StaticKey::from_bytes([0x5a; STATIC_KEY_SIZE]),
        })
    }

    #[test]
    fn test_plain_codec() {
        let mut codec = ControlCodec::default();
        let packet = ControlPacket::new(PacketCode::Control, 1, SessionId::generate(), 4, b"abc".to_vec());
        let bytes = codec.encode(&packet).unwrap();
        assert_eq!(bytes, packet.serialize().unwrap());
        assert_eq!(codec.decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_pure_ack_vector() {
        // ACK_V1 with a single ack for packet id 1
        let mut bytes = vec![0x28];
        bytes.extend_from_slice(&[0xab; 8]);
        bytes.push(1);
        bytes.extend_from_slice(&[0, 0, 0, 1]);
        bytes.extend_from_slice(&[0xcd; 8]);
        let packet = ControlCodec::default().decode(&bytes).unwrap();
        assert!(packet.is_ack());
        assert_eq!(packet.payload, None);
    }

    #[test]
    fn test_tls_auth_codec() {
        let configuration = Configuration {
            tls_wrap: wrap(TlsWrapStrategy::Auth),
            key_direction: Some(KeyDirection::Inverse),
            digest: Some(Digest::Sha256),
            ..Default::default()
        };
        let mut client = ControlCodec::from_configuration(&configuration).unwrap();
        assert_eq!(client.overhead(), 40);

        let server_key = StaticKey::from_bytes([0x5a; STATIC_KEY_SIZE]);
        let mut server = ControlCodec::new(Some(TlsAuth::new(
            &server_key,
            Some(KeyDirection::Normal),
            Digest::Sha256,
        )));

        let packet = ControlPacket::new(PacketCode::HardResetClient, 0, SessionId::generate(), 0, Vec::new());
        let wire = client.encode(&packet).unwrap();
        assert_eq!(server.decode(&wire).unwrap(), packet);
        // an unwrapped packet does not authenticate
        let unwrapped = ControlPacket::new(PacketCode::Control, 0, SessionId::generate(), 1, vec![0; 64]);
        assert_eq!(
            server.decode(&unwrapped.serialize().unwrap()).unwrap_err(),
            PacketError::AuthenticationFailed
        );

        let reply = server.encode(&packet).unwrap();
        assert_eq!(client.decode(&reply).unwrap(), packet);
    }

    #[test]
    fn test_tls_crypt_codec() {
        let configuration = Configuration {
            tls_wrap: wrap(TlsWrapStrategy::Crypt),
            // ignored by tls-crypt
            key_direction: Some(KeyDirection::Normal),
            ..Default::default()
        };
        let mut client = ControlCodec::from_configuration(&configuration).unwrap();
        assert_eq!(client.overhead(), 40);

        let server_key = StaticKey::from_bytes([0x5a; STATIC_KEY_SIZE]);
        let mut server = ControlCodec::with_tls_crypt(TlsCrypt::new(&server_key, KeyDirection::Normal));

        let packet = ControlPacket::new(PacketCode::Control, 2, SessionId::generate(), 5, b"tls record".to_vec());
        let wire = client.encode(&packet).unwrap();
        assert_eq!(server.decode(&wire).unwrap(), packet);
        assert_eq!(
            server.decode(&packet.serialize().unwrap()).unwrap_err(),
            PacketError::AuthenticationFailed
        );

        let ack = ControlPacket::ack(2, SessionId::generate(), vec![5], SessionId::generate());
        let reply = server.encode(&ack).unwrap();
        assert_eq!(client.decode(&reply).unwrap(), ack);
    }

    #[test]
    fn test_unencodable_packet_is_an_error() {
        let mut packet = ControlPacket::new(PacketCode::Control, 0, SessionId::generate(), 1, Vec::new());
        packet.payload = None;
        assert!(matches!(
            ControlCodec::default().encode(&packet),
            Err(SessionError::Encoding(PacketError::Unencodable(_)))
        ));
    }
}
