//! Socket seams under the transport strategies.
//!
//! Strategies talk to a [`DatagramLink`] or [`StreamLink`] instead of a
//! concrete socket, so tests script the wire and production wires in the
//! tokio socket types.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
};
use tracing::debug;

use crate::error::{TransportError, TransportResult};

/// Unordered packet-oriented link (UDP, SRT, WebRTC data channels).
#[async_trait]
pub trait DatagramLink: Send {
    async fn open(&mut self, endpoint: &str) -> TransportResult<()>;
    async fn send(&mut self, datagram: &[u8]) -> TransportResult<()>;
    async fn recv(&mut self) -> TransportResult<Bytes>;
    async fn close(&mut self) -> TransportResult<()>;
}

/// Ordered byte-stream link (TCP, QUIC streams, RTMP).
#[async_trait]
pub trait StreamLink: Send {
    async fn open(&mut self, endpoint: &str) -> TransportResult<()>;
    async fn write_all(&mut self, data: &[u8]) -> TransportResult<()>;
    async fn read_exact(&mut self, len: usize) -> TransportResult<Bytes>;
    async fn flush(&mut self) -> TransportResult<()>;
    async fn close(&mut self) -> TransportResult<()>;
}

const MAX_DATAGRAM: usize = 64 * 1024;

/// [`DatagramLink`] over a connected tokio [`UdpSocket`].
#[derive(Default)]
pub struct UdpLink {
    socket: Option<UdpSocket>,
}

impl UdpLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn socket(&self) -> TransportResult<&UdpSocket> {
        self.socket.as_ref().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl DatagramLink for UdpLink {
    async fn open(&mut self, endpoint: &str) -> TransportResult<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(endpoint).await?;
        debug!(endpoint, "udp link opened");
        self.socket = Some(socket);
        Ok(())
    }

    async fn send(&mut self, datagram: &[u8]) -> TransportResult<()> {
        self.socket()?.send(datagram).await?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportResult<Bytes> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.socket()?.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.socket = None;
        Ok(())
    }
}

/// [`StreamLink`] over a tokio [`TcpStream`].
#[derive(Default)]
pub struct TcpLink {
    stream: Option<TcpStream>,
}

impl TcpLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&mut self) -> TransportResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl StreamLink for TcpLink {
    async fn open(&mut self, endpoint: &str) -> TransportResult<()> {
        let stream = TcpStream::connect(endpoint).await?;
        stream.set_nodelay(true)?;
        debug!(endpoint, "tcp link opened");
        self.stream = Some(stream);
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> TransportResult<()> {
        self.stream()?.write_all(data).await?;
        Ok(())
    }

    async fn read_exact(&mut self, len: usize) -> TransportResult<Bytes> {
        let mut buf = vec![0u8; len];
        self.stream()?.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn flush(&mut self) -> TransportResult<()> {
        self.stream()?.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
