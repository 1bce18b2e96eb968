//! Datagram-based transport strategies: plain UDP, low-latency ordered
//! delivery (SRT), encrypted streams over datagrams (QUIC) and peer
//! channels (WebRTC).

use std::time::Duration;

use async_trait::async_trait;
use pulselink_core::{Protocol, TransmissionFrame};
use pulselink_crypto::CipherContext;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::{
    error::{TransportError, TransportResult},
    link::DatagramLink,
    transport::{SendQueue, Transport, encode_for_wire},
    types::{ErrorWindow, TransportHealth, TransportOptions},
};

const ORDERED_HELLO: &[u8] = b"PLNK-SYN";
const ORDERED_ACK: &[u8] = b"PLNK-ACK";
const PEER_OFFER: &[u8] = b"PLNK-OFFER";
const PEER_ANSWER: &[u8] = b"PLNK-ANSWER";
const STREAM_HELLO: &[u8] = b"PLNK-QUIC";

fn cipher_for(opts: &TransportOptions, protocol: Protocol) -> Option<&CipherContext> {
    if opts.encryption_enabled(protocol) {
        opts.cipher.as_ref()
    } else {
        None
    }
}

/// Sends queued datagrams oldest-first, stopping at the first failure so
/// order is preserved across link stalls.
async fn drain_in_order<L: DatagramLink>(
    queue: &mut SendQueue,
    link: &mut L,
    send_timeout: Duration,
    errors: &mut ErrorWindow,
) -> TransportResult<()> {
    while let Some(next) = queue.front() {
        let datagram = next.clone();
        match timeout(send_timeout, link.send(&datagram)).await {
            Ok(Ok(())) => queue.pop(),
            Ok(Err(e)) => {
                errors.record(Instant::now());
                return Err(e);
            }
            Err(_) => {
                errors.record(Instant::now());
                return Err(TransportError::Timeout);
            }
        }
    }
    Ok(())
}

/// Fire-and-forget UDP strategy. No handshake, no queue: a datagram that
/// misses its deadline is simply gone, which is the point.
pub struct DatagramTransport<L> {
    link: L,
    opts: TransportOptions,
    epoch: Option<Instant>,
    errors: ErrorWindow,
}

impl<L: DatagramLink> DatagramTransport<L> {
    pub fn new(link: L, opts: TransportOptions) -> Self {
        let errors = ErrorWindow::new(opts.error_window);
        Self {
            link,
            opts,
            epoch: None,
            errors,
        }
    }
}

#[async_trait]
impl<L: DatagramLink> Transport for DatagramTransport<L> {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    async fn connect(&mut self, endpoint: &str) -> TransportResult<()> {
        self.link.open(endpoint).await?;
        self.epoch = Some(Instant::now());
        debug!(endpoint, "udp transport connected");
        Ok(())
    }

    async fn send(&mut self, frame: &TransmissionFrame) -> TransportResult<()> {
        let epoch = self.epoch.ok_or(TransportError::NotConnected)?;
        let encoded = encode_for_wire(frame, epoch, cipher_for(&self.opts, Protocol::Udp))?;

        let result = match timeout(self.opts.send_timeout, self.link.send(&encoded)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout),
        };
        if let Err(e) = &result {
            self.errors.record(Instant::now());
            warn!(seq = frame.seq, error = %e, "udp send failed");
        }
        result
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.epoch = None;
        self.link.close().await
    }

    fn health(&mut self) -> TransportHealth {
        TransportHealth {
            connected: self.epoch.is_some(),
            buffer_fill: 0.0,
            recent_errors: self.errors.count(Instant::now()),
        }
    }
}

/// Encrypted ordered delivery over datagrams (SRT). Frames pass through a
/// bounded FIFO so a stalled link shows up as buffer fill, never as
/// reordering.
pub struct LowLatencyOrderedTransport<L> {
    link: L,
    opts: TransportOptions,
    epoch: Option<Instant>,
    queue: SendQueue,
    errors: ErrorWindow,
}

impl<L: DatagramLink> LowLatencyOrderedTransport<L> {
    pub fn new(link: L, opts: TransportOptions) -> Self {
        let queue = SendQueue::new(opts.queue_capacity);
        let errors = ErrorWindow::new(opts.error_window);
        Self {
            link,
            opts,
            epoch: None,
            queue,
            errors,
        }
    }
}

#[async_trait]
impl<L: DatagramLink> Transport for LowLatencyOrderedTransport<L> {
    fn protocol(&self) -> Protocol {
        Protocol::Srt
    }

    async fn connect(&mut self, endpoint: &str) -> TransportResult<()> {
        self.link.open(endpoint).await?;

        let exchange = async {
            self.link.send(ORDERED_HELLO).await?;
            self.link.recv().await
        };
        let ack = timeout(self.opts.handshake_timeout, exchange)
            .await
            .map_err(|_| TransportError::handshake(Protocol::Srt, "handshake timed out"))?
            .map_err(|e| TransportError::handshake(Protocol::Srt, e.to_string()))?;
        if &ack[..] != ORDERED_ACK {
            return Err(TransportError::handshake(
                Protocol::Srt,
                "unexpected handshake reply",
            ));
        }

        self.epoch = Some(Instant::now());
        debug!(endpoint, "srt transport connected");
        Ok(())
    }

    async fn send(&mut self, frame: &TransmissionFrame) -> TransportResult<()> {
        let epoch = self.epoch.ok_or(TransportError::NotConnected)?;
        let encoded = encode_for_wire(frame, epoch, cipher_for(&self.opts, Protocol::Srt))?;
        self.queue.push(encoded)?;
        drain_in_order(
            &mut self.queue,
            &mut self.link,
            self.opts.send_timeout,
            &mut self.errors,
        )
        .await
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.epoch = None;
        self.queue.clear();
        self.link.close().await
    }

    fn health(&mut self) -> TransportHealth {
        TransportHealth {
            connected: self.epoch.is_some(),
            buffer_fill: self.queue.fill(),
            recent_errors: self.errors.count(Instant::now()),
        }
    }
}

/// Per-connection handshake nonce. Uniqueness is what matters here, not
/// secrecy; the payload cipher does the protecting.
fn handshake_nonce() -> [u8; 16] {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let lo = nanos as u64;
    let hi = (nanos >> 64) as u64 ^ lo.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut nonce = [0u8; 16];
    nonce[..8].copy_from_slice(&lo.to_le_bytes());
    nonce[8..].copy_from_slice(&hi.to_le_bytes());
    nonce
}

/// Encrypted ordered stream over datagrams (QUIC). The connect exchange
/// carries a fresh nonce the endpoint must echo back verbatim.
pub struct EncryptedStreamTransport<L> {
    link: L,
    opts: TransportOptions,
    epoch: Option<Instant>,
    queue: SendQueue,
    errors: ErrorWindow,
}

impl<L: DatagramLink> EncryptedStreamTransport<L> {
    pub fn new(link: L, opts: TransportOptions) -> Self {
        let queue = SendQueue::new(opts.queue_capacity);
        let errors = ErrorWindow::new(opts.error_window);
        Self {
            link,
            opts,
            epoch: None,
            queue,
            errors,
        }
    }
}

#[async_trait]
impl<L: DatagramLink> Transport for EncryptedStreamTransport<L> {
    fn protocol(&self) -> Protocol {
        Protocol::Quic
    }

    async fn connect(&mut self, endpoint: &str) -> TransportResult<()> {
        self.link.open(endpoint).await?;

        let nonce = handshake_nonce();
        let mut hello = Vec::with_capacity(STREAM_HELLO.len() + nonce.len());
        hello.extend_from_slice(STREAM_HELLO);
        hello.extend_from_slice(&nonce);

        let exchange = async {
            self.link.send(&hello).await?;
            self.link.recv().await
        };
        let echo = timeout(self.opts.handshake_timeout, exchange)
            .await
            .map_err(|_| TransportError::handshake(Protocol::Quic, "handshake timed out"))?
            .map_err(|e| TransportError::handshake(Protocol::Quic, e.to_string()))?;
        if &echo[..] != nonce.as_slice() {
            return Err(TransportError::handshake(
                Protocol::Quic,
                "endpoint failed to echo the handshake nonce",
            ));
        }

        self.epoch = Some(Instant::now());
        debug!(endpoint, "quic transport connected");
        Ok(())
    }

    async fn send(&mut self, frame: &TransmissionFrame) -> TransportResult<()> {
        let epoch = self.epoch.ok_or(TransportError::NotConnected)?;
        let encoded = encode_for_wire(frame, epoch, cipher_for(&self.opts, Protocol::Quic))?;
        self.queue.push(encoded)?;
        drain_in_order(
            &mut self.queue,
            &mut self.link,
            self.opts.send_timeout,
            &mut self.errors,
        )
        .await
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.epoch = None;
        self.queue.clear();
        self.link.close().await
    }

    fn health(&mut self) -> TransportHealth {
        TransportHealth {
            connected: self.epoch.is_some(),
            buffer_fill: self.queue.fill(),
            recent_errors: self.errors.count(Instant::now()),
        }
    }
}

/// Peer data channel strategy (WebRTC). Offer/answer negotiation up front,
/// then fire-and-forget datagrams like UDP.
pub struct PeerChannelTransport<L> {
    link: L,
    opts: TransportOptions,
    epoch: Option<Instant>,
    errors: ErrorWindow,
}

impl<L: DatagramLink> PeerChannelTransport<L> {
    pub fn new(link: L, opts: TransportOptions) -> Self {
        let errors = ErrorWindow::new(opts.error_window);
        Self {
            link,
            opts,
            epoch: None,
            errors,
        }
    }
}

#[async_trait]
impl<L: DatagramLink> Transport for PeerChannelTransport<L> {
    fn protocol(&self) -> Protocol {
        Protocol::WebRtc
    }

    async fn connect(&mut self, endpoint: &str) -> TransportResult<()> {
        self.link.open(endpoint).await?;

        let exchange = async {
            self.link.send(PEER_OFFER).await?;
            self.link.recv().await
        };
        let answer = timeout(self.opts.handshake_timeout, exchange)
            .await
            .map_err(|_| TransportError::handshake(Protocol::WebRtc, "negotiation timed out"))?
            .map_err(|e| TransportError::handshake(Protocol::WebRtc, e.to_string()))?;
        if &answer[..] != PEER_ANSWER {
            return Err(TransportError::handshake(
                Protocol::WebRtc,
                "peer rejected the channel offer",
            ));
        }

        self.epoch = Some(Instant::now());
        debug!(endpoint, "peer channel negotiated");
        Ok(())
    }

    async fn send(&mut self, frame: &TransmissionFrame) -> TransportResult<()> {
        let epoch = self.epoch.ok_or(TransportError::NotConnected)?;
        let encoded = encode_for_wire(frame, epoch, cipher_for(&self.opts, Protocol::WebRtc))?;

        let result = match timeout(self.opts.send_timeout, self.link.send(&encoded)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout),
        };
        if let Err(e) = &result {
            self.errors.record(Instant::now());
            warn!(seq = frame.seq, error = %e, "peer channel send failed");
        }
        result
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.epoch = None;
        self.link.close().await
    }

    fn health(&mut self) -> TransportHealth {
        TransportHealth {
            connected: self.epoch.is_some(),
            buffer_fill: 0.0,
            recent_errors: self.errors.count(Instant::now()),
        }
    }
}
