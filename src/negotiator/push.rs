//! Text messages on the TLS channel after the key exchange.
//!
//! Messages are NUL-terminated. The server may split its pushed options
//! over several `PUSH_REPLY` messages chained with `push-continuation 2`.

use crate::config::{Configuration, parse_push_reply};
use crate::core::{AUTH_FAILED_PREFIX, PUSH_CONTINUATION_MORE, PUSH_REPLY_PREFIX, SessionError};

/// A decoded control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ControlMessage {
    PushReply(String),
    AuthFailed(String),
    Restart(String),
    Halt(String),
    Other(String),
}

impl ControlMessage {
    pub(crate) fn parse(text: &str) -> Self {
        let text = text.trim_end_matches('\0').to_string();
        if text.starts_with(PUSH_REPLY_PREFIX) {
            Self::PushReply(text)
        } else if text.starts_with(AUTH_FAILED_PREFIX) {
            Self::AuthFailed(text)
        } else if text.starts_with("RESTART") {
            Self::Restart(text)
        } else if text.starts_with("HALT") {
            Self::Halt(text)
        } else {
            Self::Other(text)
        }
    }
}

/// Splits the TLS plaintext stream into NUL-terminated messages.
#[derive(Debug, Default)]
pub(crate) struct MessageBuffer {
    pending: Vec<u8>,
}

impl MessageBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<ControlMessage> {
        self.pending.extend_from_slice(bytes);
        let mut messages = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == 0) {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let text = String::from_utf8_lossy(&raw[..end]);
            if !text.is_empty() {
                messages.push(ControlMessage::parse(&text));
            }
        }
        messages
    }
}

/// Collects multi-part push replies.
#[derive(Debug, Default)]
pub(crate) struct PushAccumulator {
    options: Vec<String>,
}

impl PushAccumulator {
    /// Add one `PUSH_REPLY` message. Returns the parsed options once the
    /// last part arrived.
    pub(crate) fn add(&mut self, message: &str) -> Result<Option<Configuration>, SessionError> {
        let body = message
            .strip_prefix(PUSH_REPLY_PREFIX)
            .ok_or(SessionError::Assertion("push reply without prefix"))?;
        let mut more = false;
        for option in body.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            if option == PUSH_CONTINUATION_MORE {
                more = true;
            } else {
                self.options.push(option.to_string());
            }
        }
        if more {
            return Ok(None);
        }

        let options = std::mem::take(&mut self.options);
        let message = [PUSH_REPLY_PREFIX.to_string(), options.join(",")].join(",");
        parse_push_reply(&message)
            .map(Some)
            .map_err(SessionError::BadPushReply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Cipher;

    #[test]
    fn test_message_split() {
        let mut buffer = MessageBuffer::default();
        assert!(buffer.push(b"PUSH_REP").is_empty());
        let messages = buffer.push(b"LY,ping 10\0AUTH_FAILED,bad\0RESTA");
        assert_eq!(
            messages,
            vec![
                ControlMessage::PushReply("PUSH_REPLY,ping 10".to_string()),
                ControlMessage::AuthFailed("AUTH_FAILED,bad".to_string()),
            ]
        );
        assert_eq!(buffer.push(b"RT\0"), vec![ControlMessage::Restart("RESTART".to_string())]);
        assert_eq!(buffer.push(b"\0HALT\0"), vec![ControlMessage::Halt("HALT".to_string())]);
    }

    #[test]
    fn test_multi_part_push_reply() {
        let mut push = PushAccumulator::default();
        assert_eq!(push.add("PUSH_REPLY,cipher AES-256-GCM,push-continuation 2").unwrap(), None);
        let configuration = push
            .add("PUSH_REPLY,peer-id 4,push-continuation 1")
            .unwrap()
            .unwrap();
        assert_eq!(configuration.cipher, Some(Cipher::Aes256Gcm));
        assert_eq!(configuration.peer_id, Some(4));
    }

    #[test]
    fn test_bad_push_reply() {
        let mut push = PushAccumulator::default();
        assert!(matches!(
            push.add("PUSH_REPLY,ifconfig nonsense"),
            Err(SessionError::BadPushReply(_))
        ));
    }
}
