//! Acknowledgment tracking for outbound control packets.
//!
//! OpenVPN acks are selective: each ack id releases exactly one packet.
//! Unacknowledged packets are retransmitted with exponential backoff, and
//! first-transmission round trips feed an RFC 6298 RTO estimate.

use std::time::{Duration, Instant};

use crate::core::{INITIAL_RTO, MAX_RTO, MIN_RTO, RTO_BACKOFF};
use crate::packet::ControlPacket;

/// Retransmission timer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitSettings {
    /// RTO before any round trip was measured.
    pub initial_rto: Duration,
    /// Lower bound for the computed RTO.
    pub min_rto: Duration,
    /// Upper bound for the computed and backed-off RTO.
    pub max_rto: Duration,
    /// Multiplier applied after each retransmission.
    pub backoff_multiplier: u32,
}

impl Default for RetransmitSettings {
    fn default() -> Self {
        Self {
            initial_rto: INITIAL_RTO,
            min_rto: MIN_RTO,
            max_rto: MAX_RTO,
            backoff_multiplier: RTO_BACKOFF,
        }
    }
}

/// A sent packet waiting for its ack.
#[derive(Debug, Clone)]
pub struct PendingAck {
    /// The packet, kept for retransmission.
    pub packet: ControlPacket,
    /// Time of the last transmission.
    pub sent_at: Instant,
    /// Number of retransmissions so far.
    pub retransmit_count: u32,
    /// Current retransmission timeout.
    pub rto: Duration,
}

impl PendingAck {
    fn new(packet: ControlPacket, now: Instant, rto: Duration) -> Self {
        Self {
            packet,
            sent_at: now,
            retransmit_count: 0,
            rto,
        }
    }

    /// Whether the RTO elapsed at `now`.
    pub fn needs_retransmit(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.sent_at) >= self.rto
    }

    fn retransmit(&mut self, now: Instant, backoff_multiplier: u32, max_rto: Duration) {
        self.sent_at = now;
        self.retransmit_count += 1;
        self.rto = (self.rto * backoff_multiplier).min(max_rto);
    }
}

/// Outbound packets awaiting acknowledgment.
#[derive(Debug)]
pub struct AckTracker {
    pending: Vec<PendingAck>,
    settings: RetransmitSettings,
    srtt: Option<Duration>,
    rttvar: Option<Duration>,
}

impl AckTracker {
    /// Create a tracker.
    pub fn new(settings: RetransmitSettings) -> Self {
        Self {
            pending: Vec::new(),
            settings,
            srtt: None,
            rttvar: None,
        }
    }

    /// Register a packet that was just sent.
    pub fn register_sent(&mut self, packet: ControlPacket, now: Instant) {
        if self.pending.iter().any(|p| p.packet.packet_id == packet.packet_id) {
            return;
        }
        let rto = self.current_rto();
        self.pending.push(PendingAck::new(packet, now, rto));
    }

    /// Release the packet acknowledged by `packet_id`.
    ///
    /// Returns the RTT sample when the packet was never retransmitted.
    pub fn process_ack(&mut self, packet_id: u32, now: Instant) -> Option<Duration> {
        let index = self.pending.iter().position(|p| p.packet.packet_id == packet_id)?;
        let pending = self.pending.remove(index);
        if pending.retransmit_count > 0 {
            return None;
        }
        let rtt = now.saturating_duration_since(pending.sent_at);
        self.update_rtt(rtt);
        Some(rtt)
    }

    fn update_rtt(&mut self, rtt: Duration) {
        match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => {
                let (srtt_secs, rttvar_secs, rtt_secs) =
                    (srtt.as_secs_f64(), rttvar.as_secs_f64(), rtt.as_secs_f64());
                // RTTVAR = 3/4 RTTVAR + 1/4 |SRTT - R|, SRTT = 7/8 SRTT + 1/8 R
                let new_rttvar = 0.75 * rttvar_secs + 0.25 * (srtt_secs - rtt_secs).abs();
                let new_srtt = 0.875 * srtt_secs + 0.125 * rtt_secs;
                self.srtt = Some(Duration::from_secs_f64(new_srtt));
                self.rttvar = Some(Duration::from_secs_f64(new_rttvar));
            }
            _ => {
                self.srtt = Some(rtt);
                self.rttvar = Some(rtt / 2);
            }
        }
    }

    /// RTO for newly sent packets.
    pub fn current_rto(&self) -> Duration {
        match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => {
                let granularity = Duration::from_millis(1);
                (srtt + granularity.max(rttvar * 4)).clamp(self.settings.min_rto, self.settings.max_rto)
            }
            _ => self.settings.initial_rto,
        }
    }

    /// Smoothed RTT, once measured.
    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    /// Packets whose RTO elapsed, in send order. Their timers are backed off.
    pub fn take_retransmissions(&mut self, now: Instant) -> Vec<ControlPacket> {
        let RetransmitSettings {
            backoff_multiplier,
            max_rto,
            ..
        } = self.settings;
        self.pending
            .iter_mut()
            .filter(|p| p.needs_retransmit(now))
            .map(|p| {
                p.retransmit(now, backoff_multiplier, max_rto);
                p.packet.clone()
            })
            .collect()
    }

    /// Whether any packet awaits acknowledgment.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of packets awaiting acknowledgment.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop everything, e.g. when the epoch is abandoned.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }
}
