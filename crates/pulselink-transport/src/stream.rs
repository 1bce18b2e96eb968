//! Byte-stream transport strategies: reliable ordered delivery (TCP) and
//! chunked broadcast delivery (RTMP).
//!
//! Frames go on the stream length-prefixed (`u32` little-endian) so the
//! receiver can reframe the byte stream.

use bytes::{BufMut, Bytes, BytesMut};

use async_trait::async_trait;
use pulselink_core::{Protocol, TransmissionFrame};
use pulselink_crypto::CipherContext;
use tokio::time::{Instant, timeout};
use tracing::debug;

use crate::{
    error::{TransportError, TransportResult},
    link::StreamLink,
    transport::{SendQueue, Transport, encode_for_wire},
    types::{ErrorWindow, TransportHealth, TransportOptions},
};

const BROADCAST_HELLO: &[u8] = b"PLNK-RTMP";

fn cipher_for(opts: &TransportOptions, protocol: Protocol) -> Option<&CipherContext> {
    if opts.encryption_enabled(protocol) {
        opts.cipher.as_ref()
    } else {
        None
    }
}

fn length_prefixed(encoded: Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + encoded.len());
    buf.put_u32_le(encoded.len() as u32);
    buf.put_slice(&encoded);
    buf.freeze()
}

/// Writes queued frames oldest-first. `chunk` splits each write into
/// bounded pieces; a failed or timed-out frame stays queued.
async fn drain_stream<L: StreamLink>(
    queue: &mut SendQueue,
    link: &mut L,
    opts: &TransportOptions,
    chunk: Option<usize>,
    errors: &mut ErrorWindow,
) -> TransportResult<()> {
    while let Some(next) = queue.front() {
        let data = next.clone();
        let write = async {
            match chunk {
                None => link.write_all(&data).await?,
                Some(size) => {
                    for piece in data.chunks(size.max(1)) {
                        link.write_all(piece).await?;
                    }
                }
            }
            link.flush().await
        };
        match timeout(opts.send_timeout, write).await {
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

/// Reliable ordered stream strategy (TCP). The socket connect is the
/// handshake; delivery leans on the stream's own retransmission.
pub struct ReliableStreamTransport<L> {
    link: L,
    opts: TransportOptions,
    epoch: Option<Instant>,
    queue: SendQueue,
    errors: ErrorWindow,
}

impl<L: StreamLink> ReliableStreamTransport<L> {
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
impl<L: StreamLink> Transport for ReliableStreamTransport<L> {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    async fn connect(&mut self, endpoint: &str) -> TransportResult<()> {
        self.link.open(endpoint).await?;
        self.epoch = Some(Instant::now());
        debug!(endpoint, "tcp transport connected");
        Ok(())
    }

    async fn send(&mut self, frame: &TransmissionFrame) -> TransportResult<()> {
        let epoch = self.epoch.ok_or(TransportError::NotConnected)?;
        let encoded = encode_for_wire(frame, epoch, cipher_for(&self.opts, Protocol::Tcp))?;
        self.queue.push(length_prefixed(encoded))?;
        drain_stream(
            &mut self.queue,
            &mut self.link,
            &self.opts,
            None,
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

/// Broadcast-oriented strategy (RTMP). A magic-echo handshake up front,
/// then frames written in bounded chunks so one large video frame cannot
/// monopolize the stream.
pub struct BroadcastTransport<L> {
    link: L,
    opts: TransportOptions,
    epoch: Option<Instant>,
    queue: SendQueue,
    errors: ErrorWindow,
}

impl<L: StreamLink> BroadcastTransport<L> {
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
impl<L: StreamLink> Transport for BroadcastTransport<L> {
    fn protocol(&self) -> Protocol {
        Protocol::Rtmp
    }

    async fn connect(&mut self, endpoint: &str) -> TransportResult<()> {
        self.link.open(endpoint).await?;

        let exchange = async {
            self.link.write_all(BROADCAST_HELLO).await?;
            self.link.flush().await?;
            self.link.read_exact(BROADCAST_HELLO.len()).await
        };
        let echo = timeout(self.opts.handshake_timeout, exchange)
            .await
            .map_err(|_| TransportError::handshake(Protocol::Rtmp, "handshake timed out"))?
            .map_err(|e| TransportError::handshake(Protocol::Rtmp, e.to_string()))?;
        if &echo[..] != BROADCAST_HELLO {
            return Err(TransportError::handshake(
                Protocol::Rtmp,
                "unexpected handshake reply",
            ));
        }

        self.epoch = Some(Instant::now());
        debug!(endpoint, "rtmp transport connected");
        Ok(())
    }

    async fn send(&mut self, frame: &TransmissionFrame) -> TransportResult<()> {
        let epoch = self.epoch.ok_or(TransportError::NotConnected)?;
        let encoded = encode_for_wire(frame, epoch, cipher_for(&self.opts, Protocol::Rtmp))?;
        self.queue.push(length_prefixed(encoded))?;
        let chunk = Some(self.opts.chunk_size);
        drain_stream(
            &mut self.queue,
            &mut self.link,
            &self.opts,
            chunk,
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

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Buf;
    use rstest::*;

    use super::*;
    use crate::wire::WireFrame;

    /// Scripted stream link: records every write (size and bytes), replays
    /// queued read results, and can fail writes on demand.
    #[derive(Default)]
    struct FakeStreamLink {
        written: Vec<u8>,
        write_sizes: Vec<usize>,
        read_script: VecDeque<TransportResult<Bytes>>,
        fail_writes: bool,
        opened: bool,
    }

    impl FakeStreamLink {
        fn answering(reply: &'static [u8]) -> Self {
            let mut link = Self::default();
            link.read_script.push_back(Ok(Bytes::from_static(reply)));
            link
        }
    }

    #[async_trait]
    impl StreamLink for FakeStreamLink {
        async fn open(&mut self, _endpoint: &str) -> TransportResult<()> {
            self.opened = true;
            Ok(())
        }

        async fn write_all(&mut self, data: &[u8]) -> TransportResult<()> {
            if self.fail_writes {
                return Err(TransportError::connection_lost("stream reset"));
            }
            self.written.extend_from_slice(data);
            self.write_sizes.push(data.len());
            Ok(())
        }

        async fn read_exact(&mut self, len: usize) -> TransportResult<Bytes> {
            match self.read_script.pop_front() {
                Some(Ok(data)) if data.len() == len => Ok(data),
                Some(Ok(_)) | None => Err(TransportError::Timeout),
                Some(Err(e)) => Err(e),
            }
        }

        async fn flush(&mut self) -> TransportResult<()> {
            Ok(())
        }

        async fn close(&mut self) -> TransportResult<()> {
            self.opened = false;
            Ok(())
        }
    }

    fn frame(seq: u64) -> TransmissionFrame {
        TransmissionFrame::new(seq, Bytes::from_static(b"video-chunk"))
    }

    /// Splits the written byte stream back into wire frames.
    fn reframe(written: &[u8]) -> Vec<WireFrame> {
        let mut buf = Bytes::copy_from_slice(written);
        let mut frames = Vec::new();
        while buf.has_remaining() {
            let len = buf.get_u32_le() as usize;
            frames.push(WireFrame::decode(buf.split_to(len)).unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn tcp_sends_length_prefixed_frames_in_order() {
        let mut transport =
            ReliableStreamTransport::new(FakeStreamLink::default(), TransportOptions::default());
        transport.connect("198.51.100.2:1935").await.unwrap();

        transport.send(&frame(1)).await.unwrap();
        transport.send(&frame(2)).await.unwrap();

        let frames = reframe(&transport.link.written);
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[0].seq, frames[1].seq), (1, 2));
        assert!(!frames[0].is_encrypted());
        assert_eq!(&frames[0].payload[..], b"video-chunk");
    }

    #[tokio::test]
    async fn tcp_send_before_connect_is_rejected() {
        let mut transport =
            ReliableStreamTransport::new(FakeStreamLink::default(), TransportOptions::default());
        let result = transport.send(&frame(1)).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn tcp_failed_write_keeps_frame_queued_then_recovers() {
        let mut transport =
            ReliableStreamTransport::new(FakeStreamLink::default(), TransportOptions::default());
        transport.connect("198.51.100.2:1935").await.unwrap();

        transport.link.fail_writes = true;
        assert!(transport.send(&frame(1)).await.is_err());
        let health = transport.health();
        assert!(health.buffer_fill > 0.0);
        assert_eq!(health.recent_errors, 1);

        transport.link.fail_writes = false;
        transport.send(&frame(2)).await.unwrap();
        let frames = reframe(&transport.link.written);
        assert_eq!((frames[0].seq, frames[1].seq), (1, 2));
        assert_eq!(transport.health().buffer_fill, 0.0);
    }

    #[tokio::test]
    async fn tcp_queue_overflow_is_reported() {
        let opts = TransportOptions::default().with_queue_capacity(1);
        let mut transport = ReliableStreamTransport::new(FakeStreamLink::default(), opts);
        transport.connect("198.51.100.2:1935").await.unwrap();

        transport.link.fail_writes = true;
        assert!(transport.send(&frame(1)).await.is_err());
        let overflow = transport.send(&frame(2)).await;
        assert!(matches!(overflow, Err(TransportError::QueueFull)));
    }

    #[rstest]
    #[case::accepted(BROADCAST_HELLO, true)]
    #[case::rejected(b"PLNK-NACK", false)]
    #[tokio::test]
    async fn rtmp_handshake(#[case] reply: &'static [u8], #[case] accepted: bool) {
        let link = FakeStreamLink::answering(reply);
        let mut transport = BroadcastTransport::new(link, TransportOptions::default());

        let result = transport.connect("198.51.100.3:1935").await;
        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            assert!(result.unwrap_err().is_handshake());
        }
    }

    #[tokio::test]
    async fn rtmp_writes_are_chunked() {
        let link = FakeStreamLink::answering(BROADCAST_HELLO);
        let opts = TransportOptions {
            chunk_size: 8,
            ..TransportOptions::default()
        };
        let mut transport = BroadcastTransport::new(link, opts);
        transport.connect("198.51.100.3:1935").await.unwrap();

        transport.send(&frame(1)).await.unwrap();

        // write_sizes[0] is the handshake hello
        let chunked = &transport.link.write_sizes[1..];
        assert!(chunked.len() > 1);
        assert!(chunked.iter().all(|size| *size <= 8));

        let frames = reframe(&transport.link.written[BROADCAST_HELLO.len()..]);
        assert_eq!(frames[0].seq, 1);
    }
}
