//! Control channel negotiation.
//!
//! - [`Negotiator`]: reset exchange, TLS, key method 2 and push for one key
//! - [`Credentials`]: `auth-user-pass` username and password

mod auth;
#[allow(clippy::module_inception)]
mod negotiator;
mod push;

pub use auth::Credentials;
pub use negotiator::{
    NegotiationKind, Negotiated, Negotiator, NegotiatorSettings, NegotiatorState, next_key,
};

#[cfg(test)]
pub(crate) use negotiator::tests::{PlainChannel, ScriptedServer};
