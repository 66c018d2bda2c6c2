//! Session engine.
//!
//! - [`SessionCore`]: synchronous protocol state, one call per batch
//! - [`Session`]: async handle running the core over a [`Link`] and a [`Tunnel`]
//! - [`SessionOptions`]: engine tuning outside the profile
//!
//! [`Link`]: crate::core::Link
//! [`Tunnel`]: crate::core::Tunnel

#[allow(clippy::module_inception)]
mod session;

mod engine;
mod io;
mod options;
mod status;

pub use engine::{Output, SessionCore};
pub use options::{SessionOptions, SessionOptionsBuilder};
pub use session::Session;
pub use status::{DataCount, SessionStatus, TunnelSettings};
