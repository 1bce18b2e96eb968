/// Discrete quality operating point.
///
/// Ordered ladder: `Low < Medium < High < Ultra`. The tuple behind each level
/// is static configuration, not session state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum QualityProfile {
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityProfile {
    /// Frame resolution (width, height).
    pub fn resolution(self) -> (u32, u32) {
        match self {
            Self::Low => (640, 360),
            Self::Medium => (1280, 720),
            Self::High => (1920, 1080),
            Self::Ultra => (3840, 2160),
        }
    }

    /// Target frame rate in frames per second.
    pub fn frame_rate(self) -> u32 {
        match self {
            Self::Low => 15,
            Self::Medium | Self::High | Self::Ultra => 30,
        }
    }

    /// Target encoder bitrate in bits per second.
    pub fn target_bitrate_bps(self) -> u64 {
        match self {
            Self::Low => 500_000,
            Self::Medium => 1_500_000,
            Self::High => 3_000_000,
            Self::Ultra => 8_000_000,
        }
    }

    /// One level up, saturating at `Ultra`.
    pub fn step_up(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Ultra => Self::Ultra,
        }
    }

    /// One level down, saturating at `Low`.
    pub fn step_down(self) -> Self {
        match self {
            Self::Ultra => Self::High,
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    pub fn is_min(self) -> bool {
        self == Self::Low
    }

    pub fn is_max(self) -> bool {
        self == Self::Ultra
    }
}
