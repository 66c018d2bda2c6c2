//! Anti-replay sliding window for inbound data packet ids.
//!
//! - Below window: reject
//! - Seen id: reject
//! - Above highest: slide the window

use crate::core::{CryptoError, REPLAY_WINDOW_SIZE};

const WORDS: usize = REPLAY_WINDOW_SIZE / 64;

/// Bitmap of recently accepted packet ids. Bit `n` stands for `highest - n`.
#[derive(Debug, Clone, Default)]
pub struct ReplayWindow {
    bitmap: [u64; WORDS],
    highest: u32,
    initialized: bool,
}

impl ReplayWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` would be rejected, without updating.
    pub fn is_replay(&self, id: u32) -> bool {
        if !self.initialized || id > self.highest {
            return false;
        }
        let diff = (self.highest - id) as usize;
        if diff >= REPLAY_WINDOW_SIZE {
            return true;
        }
        self.bitmap[diff / 64] & (1 << (diff % 64)) != 0
    }

    /// Accept `id` or fail with [`CryptoError::ReplayDetected`].
    ///
    /// Call only after the packet authenticated.
    pub fn check_and_update(&mut self, id: u32) -> Result<(), CryptoError> {
        if !self.initialized {
            self.initialized = true;
            self.highest = id;
            self.bitmap = [0; WORDS];
            self.bitmap[0] = 1;
            return Ok(());
        }
        if id > self.highest {
            self.shift_window((id - self.highest) as usize);
            self.highest = id;
            self.bitmap[0] |= 1;
            return Ok(());
        }
        if self.is_replay(id) {
            return Err(CryptoError::ReplayDetected(id));
        }
        let diff = (self.highest - id) as usize;
        self.bitmap[diff / 64] |= 1 << (diff % 64);
        Ok(())
    }

    /// Highest accepted id.
    pub fn highest(&self) -> Option<u32> {
        self.initialized.then_some(self.highest)
    }

    // older ids move toward higher bit positions; word 0 holds the newest
    fn shift_window(&mut self, shift: usize) {
        if shift >= REPLAY_WINDOW_SIZE {
            self.bitmap = [0; WORDS];
            return;
        }
        let shift_words = shift / 64;
        let shift_bits = shift % 64;

        if shift_words > 0 {
            for i in (shift_words..WORDS).rev() {
                self.bitmap[i] = self.bitmap[i - shift_words];
            }
            for word in self.bitmap.iter_mut().take(shift_words) {
                *word = 0;
            }
        }

        if shift_bits > 0 {
            let mut carry = 0u64;
            for word in self.bitmap.iter_mut() {
                let next_carry = *word >> (64 - shift_bits);
                *word = (*word << shift_bits) | carry;
                carry = next_carry;
            }
        }
    }
}
