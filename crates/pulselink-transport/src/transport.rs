use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use pulselink_core::{Protocol, TransmissionFrame};
use pulselink_crypto::{CipherContext, encrypt_frame};
use tokio::time::Instant;

use crate::{
    datagram::{
        DatagramTransport, EncryptedStreamTransport, LowLatencyOrderedTransport,
        PeerChannelTransport,
    },
    error::{TransportError, TransportResult},
    link::{TcpLink, UdpLink},
    stream::{BroadcastTransport, ReliableStreamTransport},
    types::{TransportHealth, TransportOptions},
    wire::{FLAG_ENCRYPTED, FLAG_PRIORITY, WireFrame},
};

/// One transport strategy bound to a single protocol.
///
/// `connect` performs the protocol handshake; a [`TransportError::Handshake`]
/// from it means the endpoint rejected the protocol and the selector should
/// move on rather than retry.
#[async_trait]
pub trait Transport: Send {
    fn protocol(&self) -> Protocol;
    async fn connect(&mut self, endpoint: &str) -> TransportResult<()>;
    async fn send(&mut self, frame: &TransmissionFrame) -> TransportResult<()>;
    async fn close(&mut self) -> TransportResult<()>;
    /// Delivery health snapshot for the frame scheduler.
    fn health(&mut self) -> TransportHealth;
}

/// Builds the strategy for a protocol, wired to production socket links.
pub fn build_transport(
    protocol: Protocol,
    opts: TransportOptions,
) -> TransportResult<Box<dyn Transport>> {
    if opts.encryption_enabled(protocol) && opts.cipher.is_none() {
        return Err(TransportError::handshake(
            protocol,
            "encryption enabled but no cipher configured",
        ));
    }

    let transport: Box<dyn Transport> = match protocol {
        Protocol::Udp => Box::new(DatagramTransport::new(UdpLink::new(), opts)),
        Protocol::Srt => Box::new(LowLatencyOrderedTransport::new(UdpLink::new(), opts)),
        Protocol::WebRtc => Box::new(PeerChannelTransport::new(UdpLink::new(), opts)),
        Protocol::Quic => Box::new(EncryptedStreamTransport::new(UdpLink::new(), opts)),
        Protocol::Tcp => Box::new(ReliableStreamTransport::new(TcpLink::new(), opts)),
        Protocol::Rtmp => Box::new(BroadcastTransport::new(TcpLink::new(), opts)),
    };
    Ok(transport)
}

/// Encodes a frame for the wire, encrypting the payload when a cipher is
/// supplied. The capture offset is measured from `epoch` (connect time).
pub(crate) fn encode_for_wire(
    frame: &TransmissionFrame,
    epoch: Instant,
    cipher: Option<&CipherContext>,
) -> TransportResult<Bytes> {
    let offset_ms = frame
        .captured_at
        .saturating_duration_since(epoch.into_std())
        .as_millis()
        .min(u32::MAX as u128) as u32;

    let (payload, mut flags) = match cipher {
        Some(ctx) => (encrypt_frame(ctx, frame.seq, &frame.payload)?, FLAG_ENCRYPTED),
        None => (frame.payload.clone(), 0),
    };
    if frame.priority {
        flags |= FLAG_PRIORITY;
    }

    let wire = WireFrame {
        seq: frame.seq,
        capture_offset_ms: offset_ms,
        flags,
        payload,
    };
    Ok(wire.encode())
}

/// Bounded FIFO of encoded frames waiting for the link.
///
/// Stream strategies park frames here when the link stalls; occupancy feeds
/// [`TransportHealth::buffer_fill`].
#[derive(Debug)]
pub(crate) struct SendQueue {
    items: VecDeque<Bytes>,
    capacity: usize,
}

impl SendQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push(&mut self, encoded: Bytes) -> TransportResult<()> {
        if self.items.len() >= self.capacity {
            return Err(TransportError::QueueFull);
        }
        self.items.push_back(encoded);
        Ok(())
    }

    pub(crate) fn front(&self) -> Option<&Bytes> {
        self.items.front()
    }

    pub(crate) fn pop(&mut self) {
        self.items.pop_front();
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn fill(&self) -> f64 {
        self.items.len() as f64 / self.capacity as f64
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::*;

    use super::*;

    #[rstest]
    fn send_queue_reports_fill_and_overflow() {
        let mut queue = SendQueue::new(2);
        assert_eq!(queue.fill(), 0.0);

        queue.push(Bytes::from_static(b"a")).unwrap();
        assert_eq!(queue.fill(), 0.5);
        queue.push(Bytes::from_static(b"b")).unwrap();
        assert_eq!(queue.fill(), 1.0);

        let overflow = queue.push(Bytes::from_static(b"c"));
        assert!(matches!(overflow, Err(TransportError::QueueFull)));

        queue.pop();
        assert_eq!(queue.fill(), 0.5);
    }

    #[tokio::test]
    async fn encode_for_wire_plaintext_keeps_payload() {
        let epoch = Instant::now();
        let mut frame = TransmissionFrame::new(9, Bytes::from_static(b"sensor"));
        frame.captured_at = epoch.into_std() + Duration::from_millis(120);

        let encoded = encode_for_wire(&frame, epoch, None).unwrap();
        let wire = WireFrame::decode(encoded).unwrap();
        assert_eq!(wire.seq, 9);
        assert!(!wire.is_encrypted());
        assert_eq!(&wire.payload[..], b"sensor");
        assert_eq!(wire.capture_offset_ms, 120);
    }

    #[tokio::test]
    async fn encode_for_wire_encrypts_when_cipher_present() {
        let ctx = CipherContext::new([1u8; 16], [2u8; 16]);
        let frame = TransmissionFrame::new(3, Bytes::from_static(b"sensor"));

        let encoded = encode_for_wire(&frame, Instant::now(), Some(&ctx)).unwrap();
        let wire = WireFrame::decode(encoded).unwrap();
        assert!(wire.is_encrypted());
        assert_ne!(&wire.payload[..], b"sensor");

        let plain = pulselink_crypto::decrypt_frame(&ctx, 3, &wire.payload).unwrap();
        assert_eq!(&plain[..], b"sensor");
    }

    #[rstest]
    #[case(Protocol::Srt)]
    #[case(Protocol::Quic)]
    fn factory_rejects_encrypted_protocol_without_cipher(#[case] protocol: Protocol) {
        let result = build_transport(protocol, TransportOptions::default());
        assert!(matches!(result, Err(TransportError::Handshake { .. })));
    }

    #[rstest]
    #[case(Protocol::Udp)]
    #[case(Protocol::Tcp)]
    #[case(Protocol::Rtmp)]
    #[case(Protocol::WebRtc)]
    fn factory_builds_plaintext_protocols(#[case] protocol: Protocol) {
        let transport = build_transport(protocol, TransportOptions::default()).unwrap();
        assert_eq!(transport.protocol(), protocol);
    }
}
