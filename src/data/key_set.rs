//! Active data channel keys, indexed by key id.
//!
//! One key is current and encrypts outbound traffic. After a
//! renegotiation the previous key stays as a lame duck: it keeps
//! decrypting late packets until the peer is seen using the new key or
//! the lame duck window runs out.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::{CryptoError, KEY_ID_COUNT, KEY_ID_MASK};

use super::channel::DataChannel;

/// Result of decrypting one per-key batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DecryptedBatch {
    /// Packets for the tunnel, in arrival order.
    pub packets: Vec<Vec<u8>>,
    /// Frames that authenticated, pings included.
    pub authenticated: usize,
    /// Frames dropped for failing authentication, replay or framing.
    pub dropped: usize,
}

/// Mapping from key id (0-7) to data channel.
#[derive(Debug)]
pub struct DataChannelKeySet {
    slots: [Option<DataChannel>; KEY_ID_COUNT],
    current: Option<u8>,
    lame_duck: Option<(u8, Instant)>,
    lame_duck_window: Duration,
}

impl DataChannelKeySet {
    /// Empty key set. Retired keys linger for `lame_duck_window`.
    pub fn new(lame_duck_window: Duration) -> Self {
        Self {
            slots: Default::default(),
            current: None,
            lame_duck: None,
            lame_duck_window,
        }
    }

    /// Whether `key` can decrypt.
    pub fn has_key(&self, key: u8) -> bool {
        self.slots[usize::from(key & KEY_ID_MASK)].is_some()
    }

    /// Installed key ids, ascending.
    pub fn keys(&self) -> Vec<u8> {
        (0..KEY_ID_COUNT as u8).filter(|k| self.has_key(*k)).collect()
    }

    /// Key encrypting outbound traffic.
    pub fn current_key(&self) -> Option<u8> {
        self.current
    }

    /// Whether any key is installed.
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Install a freshly negotiated channel and make it current.
    ///
    /// The previous current key becomes the lame duck; an older lame duck
    /// is retired on the spot.
    pub fn install(&mut self, channel: DataChannel, now: Instant) {
        let key = channel.key() & KEY_ID_MASK;
        if let Some((old, _)) = self.lame_duck.take() {
            if old != key {
                self.retire(old);
            }
        }
        if let Some(previous) = self.current.filter(|k| *k != key) {
            debug!(previous, key, "data channel key superseded");
            self.lame_duck = Some((previous, now + self.lame_duck_window));
        }
        self.slots[usize::from(key)] = Some(channel);
        self.current = Some(key);
        debug!(key, "data channel key installed");
    }

    /// Drop `key` and its secrets.
    pub fn retire(&mut self, key: u8) {
        let key = key & KEY_ID_MASK;
        if self.slots[usize::from(key)].take().is_some() {
            debug!(key, "data channel key retired");
        }
        if self.current == Some(key) {
            self.current = None;
        }
        if self.lame_duck.is_some_and(|(k, _)| k == key) {
            self.lame_duck = None;
        }
    }

    /// Retire the lame duck once its window elapsed.
    pub fn expire(&mut self, now: Instant) {
        if let Some((key, deadline)) = self.lame_duck {
            if now >= deadline {
                self.retire(key);
            }
        }
    }

    /// Drop every key.
    pub fn clear(&mut self) {
        for key in 0..KEY_ID_COUNT as u8 {
            self.retire(key);
        }
    }

    /// Encrypt tunnel packets with the current key.
    ///
    /// Returns `Ok(None)` when no key is installed yet.
    pub fn encrypt(&mut self, packets: &[Vec<u8>]) -> Result<Option<Vec<Vec<u8>>>, CryptoError> {
        let Some(channel) = self.current_channel() else {
            return Ok(None);
        };
        packets
            .iter()
            .map(|packet| channel.encrypt(packet))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Encrypt a keepalive ping with the current key.
    pub fn encrypt_ping(&mut self) -> Result<Option<Vec<u8>>, CryptoError> {
        self.current_channel().map(DataChannel::encrypt_ping).transpose()
    }

    /// Decrypt a batch of frames tagged with `key`.
    ///
    /// Unknown keys drop the whole batch. Individual failures are logged
    /// and dropped. The first frame authenticated by the current key
    /// retires the lame duck.
    pub fn decrypt<'a, I>(&mut self, key: u8, frames: I) -> DecryptedBatch
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let key = key & KEY_ID_MASK;
        let mut batch = DecryptedBatch::default();
        let Some(channel) = self.slots[usize::from(key)].as_mut() else {
            let dropped = frames.into_iter().count();
            debug!(key, dropped, "dropped data for unknown key");
            batch.dropped = dropped;
            return batch;
        };

        for frame in frames {
            match channel.decrypt(frame) {
                Ok(payload) => {
                    batch.authenticated += 1;
                    batch.packets.extend(payload);
                }
                Err(e) => {
                    warn!(key, error = %e, "dropped data frame");
                    batch.dropped += 1;
                }
            }
        }

        if batch.authenticated > 0 && self.current == Some(key) {
            if let Some((old, _)) = self.lame_duck {
                debug!(old, key, "peer switched keys");
                self.retire(old);
            }
        }
        batch
    }

    fn current_channel(&mut self) -> Option<&mut DataChannel> {
        let key = self.current?;
        self.slots[usize::from(key)].as_mut()
    }
}
