//! Engine options that are not part of an OpenVPN profile.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Configuration;
use crate::control::RetransmitSettings;
use crate::core::{
    DEFAULT_LAME_DUCK, DEFAULT_MAX_CONTROL_PAYLOAD, DEFAULT_NEGOTIATION_TIMEOUT,
    DEFAULT_PUSH_REQUEST_INTERVAL, DEFAULT_TICK_INTERVAL,
};
use crate::negotiator::{Credentials, NegotiatorSettings};

/// Session tuning.
///
/// Profile values (`hand-window`, `reneg-sec`, `keepalive`) take
/// precedence over the matching option.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// `auth-user-pass` credentials.
    pub credentials: Option<Credentials>,
    /// Negotiation deadline when the profile has no `hand-window`.
    pub negotiation_timeout: Duration,
    /// Period of the session timer.
    pub tick_interval: Duration,
    /// Largest TLS fragment per control packet.
    pub max_control_payload: usize,
    /// Control packet retransmission.
    pub retransmit: RetransmitSettings,
    /// How long a superseded key keeps decrypting.
    pub lame_duck: Duration,
    /// Interval between repeated `PUSH_REQUEST` messages.
    pub push_request_interval: Duration,
    /// Log session ids and payloads.
    pub log_sensitive: bool,
    /// `IV_PLAT` value sent in peer info.
    pub platform: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_control_payload: DEFAULT_MAX_CONTROL_PAYLOAD,
            retransmit: RetransmitSettings::default(),
            lame_duck: DEFAULT_LAME_DUCK,
            push_request_interval: DEFAULT_PUSH_REQUEST_INTERVAL,
            log_sensitive: false,
            platform: std::env::consts::OS.to_string(),
        }
    }
}

impl SessionOptions {
    /// Start a builder with default values.
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::new()
    }

    /// Settings shared by every negotiator of a session over `configuration`.
    pub(crate) fn negotiator_settings(
        &self,
        configuration: &Configuration,
        reliable_link: bool,
    ) -> Arc<NegotiatorSettings> {
        Arc::new(NegotiatorSettings {
            credentials: self.credentials.clone(),
            platform: self.platform.clone(),
            retransmit: self.retransmit,
            max_control_payload: self.max_control_payload,
            push_request_interval: self.push_request_interval,
            negotiation_timeout: configuration
                .negotiation_timeout
                .unwrap_or(self.negotiation_timeout),
            reliable_link,
        })
    }
}

/// Builder for [`SessionOptions`].
#[derive(Debug)]
pub struct SessionOptionsBuilder {
    options: SessionOptions,
}

impl SessionOptionsBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            options: SessionOptions::default(),
        }
    }

    /// Set the credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.options.credentials = Some(credentials);
        self
    }

    /// Set the fallback negotiation timeout.
    pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.options.negotiation_timeout = timeout;
        self
    }

    /// Set the timer period.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.options.tick_interval = interval;
        self
    }

    /// Set the control packet fragment size.
    pub fn max_control_payload(mut self, size: usize) -> Self {
        self.options.max_control_payload = size;
        self
    }

    /// Set the retransmission timers.
    pub fn retransmit(mut self, settings: RetransmitSettings) -> Self {
        self.options.retransmit = settings;
        self
    }

    /// Set the lame duck window.
    pub fn lame_duck(mut self, window: Duration) -> Self {
        self.options.lame_duck = window;
        self
    }

    /// Set the push request retry interval.
    pub fn push_request_interval(mut self, interval: Duration) -> Self {
        self.options.push_request_interval = interval;
        self
    }

    /// Enable or disable sensitive logging.
    pub fn log_sensitive(mut self, enabled: bool) -> Self {
        self.options.log_sensitive = enabled;
        self
    }

    /// Set the platform reported to the server.
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.options.platform = platform.into();
        self
    }

    /// Build the options.
    pub fn build(self) -> SessionOptions {
        self.options
    }
}

impl Default for SessionOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = SessionOptions::builder()
            .credentials(Credentials::new("u", "p"))
            .tick_interval(Duration::from_millis(100))
            .lame_duck(Duration::from_secs(5))
            .log_sensitive(true)
            .platform("ios")
            .build();
        assert_eq!(options.tick_interval, Duration::from_millis(100));
        assert_eq!(options.lame_duck, Duration::from_secs(5));
        assert!(options.log_sensitive);
        assert_eq!(options.platform, "ios");
        assert_eq!(options.credentials.map(|c| c.username), Some("u".to_string()));
    }

    #[test]
    fn test_hand_window_overrides_timeout() {
        let options = SessionOptions::default();
        let settings = options.negotiator_settings(&Configuration::default(), false);
        assert_eq!(settings.negotiation_timeout, DEFAULT_NEGOTIATION_TIMEOUT);

        let configuration = Configuration {
            negotiation_timeout: Some(Duration::from_secs(20)),
            ..Default::default()
        };
        let settings = options.negotiator_settings(&configuration, true);
        assert_eq!(settings.negotiation_timeout, Duration::from_secs(20));
        assert!(settings.reliable_link);
    }
}
