//! Data channel: packet protection and key rotation.
//!
//! - [`DataChannel`]: AEAD or CBC+HMAC protection for one key id
//! - [`DataChannelKeySet`]: key ids 0-7, current key and lame duck
//! - [`ReplayWindow`]: per-key anti-replay bitmap

mod aead;
mod cbc;
mod channel;
mod framing;
mod key_set;
mod replay;

pub use channel::DataChannel;
pub use key_set::{DataChannelKeySet, DecryptedBatch};
pub use replay::ReplayWindow;
