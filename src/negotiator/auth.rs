//! Key method 2 exchange over the TLS channel.
//!
//! ```text
//! client: | 0u32 | 2 | pre-master (48) | random1 (32) | random2 (32) |
//!         | options | username | password | peer info |
//! server: | 0u32 | 2 | random1 (32) | random2 (32) | options | ...
//! string: | len u16 BE, NUL included | bytes | NUL |   (empty: len 0)
//! ```

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, Zeroizing};

use crate::config::{CompressionFraming, Configuration, SocketType};
use crate::core::{
    IV_PROTO_DATA_V2, IV_PROTO_TLS_KEY_EXPORT, KEY_METHOD, PEER_INFO_VERSION, PRE_MASTER_SIZE,
    RANDOM_SIZE, SessionError,
};

const HEADER: [u8; 4] = [0; 4];

/// Username and password for `auth-user-pass`.
#[derive(Clone, PartialEq, Eq, Zeroize)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password, or the pushed auth token on renegotiation.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Our half of the key exchange, fresh per negotiation.
pub(crate) struct LocalKeySource {
    pub(crate) pre_master: Zeroizing<[u8; PRE_MASTER_SIZE]>,
    pub(crate) random1: [u8; RANDOM_SIZE],
    pub(crate) random2: [u8; RANDOM_SIZE],
}

impl LocalKeySource {
    pub(crate) fn generate() -> Self {
        let mut source = Self {
            pre_master: Zeroizing::new([0u8; PRE_MASTER_SIZE]),
            random1: [0u8; RANDOM_SIZE],
            random2: [0u8; RANDOM_SIZE],
        };
        OsRng.fill_bytes(&mut source.pre_master[..]);
        OsRng.fill_bytes(&mut source.random1);
        OsRng.fill_bytes(&mut source.random2);
        source
    }
}

/// The server's half of the key exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteKeySource {
    pub(crate) random1: [u8; RANDOM_SIZE],
    pub(crate) random2: [u8; RANDOM_SIZE],
    pub(crate) options: String,
}

fn put_string(buf: &mut Vec<u8>, value: &str) {
    if value.is_empty() {
        buf.extend_from_slice(&0u16.to_be_bytes());
        return;
    }
    let len = u16::try_from(value.len() + 1).unwrap_or(u16::MAX);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&value.as_bytes()[..usize::from(len) - 1]);
    buf.push(0);
}

/// Client key method 2 message.
pub(crate) fn client_message(
    source: &LocalKeySource,
    options: &str,
    credentials: Option<&Credentials>,
    peer_info: &str,
) -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(Vec::with_capacity(512));
    buf.extend_from_slice(&HEADER);
    buf.push(KEY_METHOD);
    buf.extend_from_slice(&source.pre_master[..]);
    buf.extend_from_slice(&source.random1);
    buf.extend_from_slice(&source.random2);
    put_string(&mut buf, options);
    match credentials {
        Some(credentials) => {
            put_string(&mut buf, &credentials.username);
            put_string(&mut buf, &credentials.password);
        }
        None => {
            put_string(&mut buf, "");
            put_string(&mut buf, "");
        }
    }
    put_string(&mut buf, peer_info);
    buf
}

/// Parse the server's key method 2 message.
///
/// `Ok(None)` means more bytes are needed. Trailing fields after the
/// options string are ignored.
pub(crate) fn parse_server_message(bytes: &[u8]) -> Result<Option<RemoteKeySource>, SessionError> {
    const FIXED: usize = HEADER.len() + 1 + 2 * RANDOM_SIZE;
    if bytes.len() < HEADER.len() + 1 {
        return Ok(None);
    }
    if bytes[..HEADER.len()] != HEADER || bytes[HEADER.len()] != KEY_METHOD {
        return Err(SessionError::BadKeyMethod);
    }
    if bytes.len() < FIXED + 2 {
        return Ok(None);
    }

    let mut random1 = [0u8; RANDOM_SIZE];
    let mut random2 = [0u8; RANDOM_SIZE];
    random1.copy_from_slice(&bytes[HEADER.len() + 1..HEADER.len() + 1 + RANDOM_SIZE]);
    random2.copy_from_slice(&bytes[HEADER.len() + 1 + RANDOM_SIZE..FIXED]);

    let len = usize::from(u16::from_be_bytes([bytes[FIXED], bytes[FIXED + 1]]));
    let start = FIXED + 2;
    let Some(raw) = bytes.get(start..start + len) else {
        return Ok(None);
    };
    let options = match raw.split_last() {
        Some((0, text)) => String::from_utf8_lossy(text).into_owned(),
        Some(_) => return Err(SessionError::BadKeyMethod),
        None => String::new(),
    };
    Ok(Some(RemoteKeySource {
        random1,
        random2,
        options,
    }))
}

/// Options string advertised to the server, used for compatibility warnings.
pub(crate) fn options_string(configuration: &Configuration) -> String {
    let proto = configuration
        .remotes()
        .first()
        .map(|remote| remote.proto)
        .unwrap_or(SocketType::Udp);
    let cipher = configuration.fallback_cipher();
    let mut options = vec![
        "V4".to_string(),
        "dev-type tun".to_string(),
        format!("tun-mtu {}", configuration.mtu.unwrap_or(1500)),
        format!(
            "proto {}",
            if proto.is_reliable() { "TCPv4_CLIENT" } else { "UDPv4" }
        ),
    ];
    if configuration.compression_framing == Some(CompressionFraming::CompLzo) {
        options.push("comp-lzo".to_string());
    }
    options.push(format!("cipher {cipher}"));
    if cipher.is_aead() {
        options.push("auth [null-digest]".to_string());
    } else {
        options.push(format!("auth {}", configuration.fallback_digest()));
        options.push(format!("keysize {}", cipher.key_len() * 8));
    }
    options.push("key-method 2".to_string());
    options.push("tls-client".to_string());
    options.join(",")
}

/// `IV_*` peer info lines.
pub(crate) fn peer_info(configuration: &Configuration, platform: &str) -> String {
    let ciphers = configuration
        .offered_ciphers()
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(":");
    let mut lines = vec![
        format!("IV_VER={PEER_INFO_VERSION}"),
        format!("IV_PLAT={platform}"),
        format!("IV_PROTO={}", IV_PROTO_DATA_V2 | IV_PROTO_TLS_KEY_EXPORT),
        "IV_NCP=2".to_string(),
        format!("IV_CIPHERS={ciphers}"),
        "IV_TCPNL=1".to_string(),
    ];
    match configuration.compression_framing {
        Some(CompressionFraming::CompLzo) => lines.push("IV_LZO_STUB=1".to_string()),
        Some(CompressionFraming::Compress) => lines.push("IV_COMP_STUB=1".to_string()),
        Some(CompressionFraming::CompressV2) => {
            lines.push("IV_COMP_STUB=1".to_string());
            lines.push("IV_COMP_STUBv2=1".to_string());
        }
        _ => {}
    }
    let mut info = lines.join("\n");
    info.push('\n');
    info
}

/// Server key method 2 message, for scripted peers in tests.
#[cfg(test)]
pub(crate) fn server_message(random1: [u8; RANDOM_SIZE], random2: [u8; RANDOM_SIZE], options: &str) -> Vec<u8> {
    let mut buf = HEADER.to_vec();
    buf.push(KEY_METHOD);
    buf.extend_from_slice(&random1);
    buf.extend_from_slice(&random2);
    put_string(&mut buf, options);
    put_string(&mut buf, "");
    put_string(&mut buf, "");
    put_string(&mut buf, "");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use crate::crypto::Cipher;

    fn read_string(bytes: &[u8], at: &mut usize) -> String {
        let len = usize::from(u16::from_be_bytes([bytes[*at], bytes[*at + 1]]));
        *at += 2;
        if len == 0 {
            return String::new();
        }
        let text = String::from_utf8(bytes[*at..*at + len - 1].to_vec()).unwrap();
        assert_eq!(bytes[*at + len - 1], 0);
        *at += len;
        text
    }

    #[test]
    fn test_client_message_layout() {
        let source = LocalKeySource::generate();
        let credentials = Credentials::new("alice", "secret");
        let message = client_message(&source, "V4,tls-client", Some(&credentials), "IV_VER=2.6.0\n");

        assert_eq!(&message[..5], &[0, 0, 0, 0, 2]);
        assert_eq!(&message[5..53], &source.pre_master[..]);
        assert_eq!(&message[53..85], &source.random1);
        let mut at = 5 + PRE_MASTER_SIZE + 2 * RANDOM_SIZE;
        assert_eq!(read_string(&message, &mut at), "V4,tls-client");
        assert_eq!(read_string(&message, &mut at), "alice");
        assert_eq!(read_string(&message, &mut at), "secret");
        assert_eq!(read_string(&message, &mut at), "IV_VER=2.6.0\n");
        assert_eq!(at, message.len());
    }

    #[test]
    fn test_empty_credentials() {
        let source = LocalKeySource::generate();
        let message = client_message(&source, "V4", None, "");
        let tail = &message[5 + PRE_MASTER_SIZE + 2 * RANDOM_SIZE + 5..];
        assert_eq!(tail, &[0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_parse_server_message() {
        let mut reply = server_message([0xaa; 32], [0xbb; 32], "V4,tls-server");
        reply.truncate(reply.len() - 4);

        for cut in [3, 40, 70, reply.len() - 4] {
            assert_eq!(parse_server_message(&reply[..cut]).unwrap(), None, "cut at {cut}");
        }
        let parsed = parse_server_message(&reply).unwrap().unwrap();
        assert_eq!(parsed.random1, [0xaa; 32]);
        assert_eq!(parsed.random2, [0xbb; 32]);
        assert_eq!(parsed.options, "V4,tls-server");

        reply[4] = 1;
        assert!(matches!(parse_server_message(&reply), Err(SessionError::BadKeyMethod)));
    }

    #[test]
    fn test_peer_info_advertises_ciphers() {
        let configuration = Configuration {
            data_ciphers: Some(vec![Cipher::Aes256Gcm, Cipher::ChaCha20Poly1305]),
            compression_framing: Some(CompressionFraming::CompressV2),
            ..Default::default()
        };
        let info = peer_info(&configuration, "linux");
        assert!(info.contains("IV_CIPHERS=AES-256-GCM:CHACHA20-POLY1305\n"));
        assert!(info.contains("IV_PROTO=10\n"));
        assert!(info.contains("IV_PLAT=linux\n"));
        assert!(info.contains("IV_COMP_STUBv2=1\n"));
    }

    #[test]
    fn test_options_string() {
        let configuration = Configuration {
            cipher: Some(Cipher::Aes256Cbc),
            remotes: Some(vec![Endpoint::new("vpn", 443, SocketType::Tcp)]),
            ..Default::default()
        };
        assert_eq!(
            options_string(&configuration),
            "V4,dev-type tun,tun-mtu 1500,proto TCPv4_CLIENT,cipher AES-256-CBC,auth SHA1,keysize 256,key-method 2,tls-client"
        );
    }
}
