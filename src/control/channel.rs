//! Reliable, ordered control channel for one key epoch.
//!
//! Outbound: payloads are split into packets with increasing packet ids and
//! kept until acknowledged. Inbound: packets are deduplicated, buffered out
//! of order and released strictly by packet id.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, trace};

use crate::core::{MAX_ACKS_PER_PACKET, MAX_INBOUND_WINDOW};
use crate::packet::{ControlPacket, PacketCode, SessionId};

use super::ack::{AckTracker, RetransmitSettings};

/// Reliability state of one negotiation.
#[derive(Debug)]
pub struct ControlChannel {
    key: u8,
    local_session_id: SessionId,
    remote_session_id: Option<SessionId>,
    next_packet_id: u32,
    outbound: AckTracker,
    next_inbound_id: u32,
    inbound: BTreeMap<u32, ControlPacket>,
    acks_to_send: Vec<u32>,
    max_payload: usize,
}

impl ControlChannel {
    /// Create the channel of key `key`.
    pub fn new(
        key: u8,
        local_session_id: SessionId,
        remote_session_id: Option<SessionId>,
        settings: RetransmitSettings,
        max_payload: usize,
    ) -> Self {
        Self {
            key,
            local_session_id,
            remote_session_id,
            next_packet_id: 0,
            outbound: AckTracker::new(settings),
            next_inbound_id: 0,
            inbound: BTreeMap::new(),
            acks_to_send: Vec::new(),
            max_payload: max_payload.max(1),
        }
    }

    /// Key id of this epoch.
    pub fn key(&self) -> u8 {
        self.key
    }

    /// Our session id.
    pub fn local_session_id(&self) -> SessionId {
        self.local_session_id
    }

    /// Peer session id, known after its first packet.
    pub fn remote_session_id(&self) -> Option<SessionId> {
        self.remote_session_id
    }

    /// Record the peer session id.
    pub fn set_remote_session_id(&mut self, id: SessionId) {
        self.remote_session_id = Some(id);
    }

    /// Split `payload` into packets of `code`, register them for
    /// retransmission and return them in send order.
    ///
    /// An empty payload still yields one packet (resets carry none).
    pub fn write(&mut self, code: PacketCode, payload: &[u8], now: Instant) -> Vec<ControlPacket> {
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![payload]
        } else {
            payload.chunks(self.max_payload).collect()
        };

        chunks
            .into_iter()
            .map(|chunk| {
                let packet = ControlPacket::new(
                    code,
                    self.key,
                    self.local_session_id,
                    self.next_packet_id,
                    chunk.to_vec(),
                );
                self.next_packet_id = self.next_packet_id.wrapping_add(1);
                self.outbound.register_sent(packet.clone(), now);
                packet
            })
            .collect()
    }

    /// Release outbound packets acknowledged by `packet`.
    ///
    /// Acks addressed to another session id are ignored.
    pub fn handle_acks(&mut self, packet: &ControlPacket, now: Instant) {
        let (Some(ids), Some(remote)) = (&packet.ack_ids, packet.ack_remote_session_id) else {
            return;
        };
        if remote != self.local_session_id {
            debug!(key = self.key, "ignored acks for foreign session id");
            return;
        }
        for id in ids {
            if let Some(rtt) = self.outbound.process_ack(*id, now) {
                trace!(key = self.key, packet_id = id, ?rtt, "control packet acked");
            }
        }
    }

    /// Queue `packet` for in-order delivery and schedule its ack.
    ///
    /// Returns the packets that became deliverable, in packet id order.
    /// Duplicates are acked again but never delivered twice. Packets beyond
    /// the receive window are dropped unacked so the peer retransmits them.
    pub fn enqueue_inbound(&mut self, packet: ControlPacket) -> Vec<ControlPacket> {
        let id = packet.packet_id;
        if id >= self.next_inbound_id && id - self.next_inbound_id >= MAX_INBOUND_WINDOW {
            debug!(
                key = self.key,
                packet_id = id,
                expected = self.next_inbound_id,
                "dropped control packet beyond receive window"
            );
            return Vec::new();
        }
        if !self.acks_to_send.contains(&id) {
            self.acks_to_send.push(id);
        }

        if id < self.next_inbound_id || self.inbound.contains_key(&id) {
            trace!(key = self.key, packet_id = id, "duplicate control packet");
            return Vec::new();
        }
        self.inbound.insert(id, packet);

        let mut ready = Vec::new();
        while let Some(packet) = self.inbound.remove(&self.next_inbound_id) {
            ready.push(packet);
            self.next_inbound_id = self.next_inbound_id.wrapping_add(1);
        }
        ready
    }

    /// Build ack packets for everything received since the last call.
    ///
    /// Nothing is built before the peer session id is known.
    pub fn take_ack_packets(&mut self) -> Vec<ControlPacket> {
        let Some(remote) = self.remote_session_id else {
            return Vec::new();
        };
        let ids = std::mem::take(&mut self.acks_to_send);
        ids.chunks(MAX_ACKS_PER_PACKET)
            .map(|chunk| ControlPacket::ack(self.key, self.local_session_id, chunk.to_vec(), remote))
            .collect()
    }

    /// Packets whose retransmission timer expired.
    pub fn take_retransmissions(&mut self, now: Instant) -> Vec<ControlPacket> {
        self.outbound.take_retransmissions(now)
    }

    /// Whether sent packets still await acknowledgment.
    pub fn has_pending_outbound(&self) -> bool {
        self.outbound.has_pending()
    }

    /// Packets buffered while waiting for a gap to fill.
    pub fn buffered_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Abandon the epoch: forget everything in flight.
    pub fn abandon(&mut self) {
        self.outbound.cancel_all();
        self.inbound.clear();
        self.acks_to_send.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn channel() -> ControlChannel {
        ControlChannel::new(
            0,
            SessionId::from_bytes([1; 8]),
            Some(SessionId::from_bytes([2; 8])),
            RetransmitSettings::default(),
            4,
        )
    }

    fn inbound(id: u32) -> ControlPacket {
        ControlPacket::new(PacketCode::Control, 0, SessionId::from_bytes([2; 8]), id, vec![id as u8])
    }

    fn ids(packets: &[ControlPacket]) -> Vec<u32> {
        packets.iter().map(|p| p.packet_id).collect()
    }

    #[test]
    fn test_out_of_order_delivery() {
        let mut channel = channel();
        let mut delivered = Vec::new();
        for id in [3, 1, 2] {
            delivered.extend(channel.enqueue_inbound(inbound(id)));
        }
        // 0 is missing: nothing may be delivered yet
        assert!(delivered.is_empty());
        assert_eq!(channel.buffered_inbound(), 3);

        delivered.extend(channel.enqueue_inbound(inbound(0)));
        assert_eq!(ids(&delivered), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_gap_released_in_order() {
        let mut channel = channel();
        assert_eq!(ids(&channel.enqueue_inbound(inbound(0))), vec![0]);
        let mut delivered = Vec::new();
        for id in [3, 1, 2] {
            delivered.extend(channel.enqueue_inbound(inbound(id)));
        }
        assert_eq!(ids(&delivered), vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicates_acked_not_redelivered() {
        let mut channel = channel();
        assert_eq!(channel.enqueue_inbound(inbound(0)).len(), 1);
        assert!(channel.enqueue_inbound(inbound(0)).is_empty());
        assert!(channel.enqueue_inbound(inbound(2)).is_empty());
        assert!(channel.enqueue_inbound(inbound(2)).is_empty());

        let acks = channel.take_ack_packets();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].ack_ids, Some(vec![0, 2]));
        assert_eq!(acks[0].ack_remote_session_id, Some(SessionId::from_bytes([2; 8])));
        assert!(channel.take_ack_packets().is_empty());

        // a retransmitted duplicate is acked again
        channel.enqueue_inbound(inbound(0));
        assert_eq!(channel.take_ack_packets()[0].ack_ids, Some(vec![0]));
    }

    #[test]
    fn test_packets_beyond_window_dropped_unacked() {
        let mut channel = channel();
        for id in (1..1000).map(|n| n * 1000) {
            assert!(channel.enqueue_inbound(inbound(id)).is_empty());
        }
        assert!(channel.enqueue_inbound(inbound(MAX_INBOUND_WINDOW)).is_empty());
        assert_eq!(channel.buffered_inbound(), 0);
        assert!(channel.take_ack_packets().is_empty());

        // the last slot of the window is still accepted
        assert!(channel.enqueue_inbound(inbound(MAX_INBOUND_WINDOW - 1)).is_empty());
        assert_eq!(channel.buffered_inbound(), 1);
        assert_eq!(channel.take_ack_packets()[0].ack_ids, Some(vec![MAX_INBOUND_WINDOW - 1]));

        // the window slides with delivery
        assert_eq!(channel.enqueue_inbound(inbound(0)).len(), 1);
        assert_eq!(channel.buffered_inbound(), 1);
        assert!(channel.enqueue_inbound(inbound(MAX_INBOUND_WINDOW)).is_empty());
        assert_eq!(channel.buffered_inbound(), 2);
    }

    #[test]
    fn test_acks_split_per_packet_limit() {
        let mut channel = channel();
        for id in 0..10 {
            channel.enqueue_inbound(inbound(id));
        }
        let acks = channel.take_ack_packets();
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[0].ack_ids.as_ref().map(Vec::len), Some(MAX_ACKS_PER_PACKET));
        assert_eq!(acks[1].ack_ids, Some(vec![8, 9]));
    }

    #[test]
    fn test_no_acks_without_remote_session() {
        let mut channel = ControlChannel::new(0, SessionId::default(), None, RetransmitSettings::default(), 100);
        channel.enqueue_inbound(inbound(0));
        assert!(channel.take_ack_packets().is_empty());
        channel.set_remote_session_id(SessionId::from_bytes([2; 8]));
        assert_eq!(channel.take_ack_packets().len(), 1);
    }

    #[test]
    fn test_write_fragments_and_numbers() {
        let now = Instant::now();
        let mut channel = channel();
        let packets = channel.write(PacketCode::Control, b"0123456789", now);
        assert_eq!(ids(&packets), vec![0, 1, 2]);
        assert_eq!(packets[2].payload.as_deref(), Some(&b"89"[..]));
        assert!(packets.iter().all(|p| p.key == 0 && p.ack_ids.is_none()));

        let reset = channel.write(PacketCode::SoftReset, &[], now);
        assert_eq!(ids(&reset), vec![3]);
        assert_eq!(reset[0].payload, Some(Vec::new()));
    }

    #[test]
    fn test_acks_release_outbound() {
        let now = Instant::now();
        let mut channel = channel();
        channel.write(PacketCode::Control, b"abcdefgh", now);
        assert!(channel.has_pending_outbound());

        let foreign = ControlPacket::ack(0, SessionId::from_bytes([2; 8]), vec![0, 1], SessionId::from_bytes([9; 8]));
        channel.handle_acks(&foreign, now);
        assert!(channel.has_pending_outbound());

        let ack = ControlPacket::ack(0, SessionId::from_bytes([2; 8]), vec![0, 1], SessionId::from_bytes([1; 8]));
        channel.handle_acks(&ack, now);
        assert!(!channel.has_pending_outbound());
    }

    proptest! {
        #[test]
        fn prop_delivery_is_ordered_and_complete(order in Just((0u32..24).collect::<Vec<_>>()).prop_shuffle(), dupes in prop::collection::vec(0u32..24, 0..12)) {
            let mut channel = channel();
            let mut delivered = Vec::new();
            for id in order.iter().chain(dupes.iter()) {
                delivered.extend(channel.enqueue_inbound(inbound(*id)));
            }
            prop_assert_eq!(ids(&delivered), (0u32..24).collect::<Vec<_>>());
            prop_assert_eq!(channel.buffered_inbound(), 0);
        }
    }
}
