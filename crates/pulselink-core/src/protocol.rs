/// The six interchangeable transport protocols.
///
/// Each maps to one transport strategy implementation; the selector picks
/// among them at runtime. Identities only; wire formats live in the
/// transport crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Protocol {
    /// Lowest-latency unordered datagrams.
    Udp,
    /// Encrypted low-latency ordered delivery.
    Srt,
    /// Encrypted ordered stream with fast handshake.
    Quic,
    /// Reliable ordered byte stream.
    Tcp,
    /// Broadcast-oriented reliable delivery.
    Rtmp,
    /// Peer-to-peer unordered channel.
    WebRtc,
}

impl Protocol {
    pub const ALL: [Protocol; 6] = [
        Protocol::Udp,
        Protocol::Srt,
        Protocol::Quic,
        Protocol::Tcp,
        Protocol::Rtmp,
        Protocol::WebRtc,
    ];

    /// Whether the strategy guarantees in-order delivery.
    pub fn is_ordered(self) -> bool {
        matches!(self, Self::Srt | Self::Quic | Self::Tcp | Self::Rtmp)
    }

    /// Whether the strategy encrypts payloads by default.
    pub fn encrypted_by_default(self) -> bool {
        matches!(self, Self::Srt | Self::Quic)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Udp => "udp",
            Self::Srt => "srt",
            Self::Quic => "quic",
            Self::Tcp => "tcp",
            Self::Rtmp => "rtmp",
            Self::WebRtc => "webrtc",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_lists_every_protocol_once() {
        let mut seen = std::collections::HashSet::new();
        for p in Protocol::ALL {
            assert!(seen.insert(p));
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn ordering_and_encryption_flags() {
        assert!(!Protocol::Udp.is_ordered());
        assert!(Protocol::Tcp.is_ordered());
        assert!(Protocol::Srt.encrypted_by_default());
        assert!(!Protocol::Tcp.encrypted_by_default());
    }
}
