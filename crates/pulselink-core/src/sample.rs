use std::{collections::VecDeque, time::Instant};

/// Coarse classification of the link the device is currently on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NetworkClass {
    Wifi,
    Lte,
    ThreeG,
    TwoG,
    Ethernet,
    Unknown,
}

impl NetworkClass {
    /// Index into one-hot feature encodings. Stable across releases.
    pub fn one_hot_index(self) -> usize {
        match self {
            Self::Wifi => 0,
            Self::Lte => 1,
            Self::ThreeG => 2,
            Self::TwoG => 3,
            Self::Ethernet => 4,
            Self::Unknown => 5,
        }
    }

    /// Number of distinct classes (one-hot width).
    pub const COUNT: usize = 6;

    /// Whether this class is considered high-bandwidth and stable.
    pub fn is_high_bandwidth(self) -> bool {
        matches!(self, Self::Wifi | Self::Ethernet)
    }
}

/// One immutable snapshot of link conditions.
///
/// Produced by the monitor on a fixed cadence, consumed read-only by the
/// estimator. Never mutated after creation.
#[derive(Clone, Copy, Debug)]
pub struct NetworkSample {
    pub at: Instant,
    pub class: NetworkClass,
    /// Observed throughput in bits per second.
    pub throughput_bps: u64,
    /// Round-trip latency.
    pub rtt: std::time::Duration,
    /// Normalized signal strength in [0, 1].
    pub signal_strength: f64,
    /// Packet loss ratio in [0, 1]. A value of 1.0 marks a degraded
    /// (timed-out) probe, not an error.
    pub loss_ratio: f64,
}

/// Bounded FIFO ring of the most recent samples.
///
/// Oldest samples are evicted when capacity is reached. Iteration order is
/// arrival order (oldest first).
#[derive(Clone, Debug)]
pub struct SampleHistory {
    buf: VecDeque<NetworkSample>,
    capacity: usize,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample, evicting the oldest if at capacity.
    pub fn push(&mut self, sample: NetworkSample) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<&NetworkSample> {
        self.buf.back()
    }

    /// Oldest-first iteration over retained samples.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkSample> {
        self.buf.iter()
    }

    /// The last `n` samples, oldest first. Fewer if not enough history.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &NetworkSample> {
        let skip = self.buf.len().saturating_sub(n);
        self.buf.iter().skip(skip)
    }
}
