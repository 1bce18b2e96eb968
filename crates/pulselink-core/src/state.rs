/// Authoritative session status reported to external collaborators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Degraded,
    Recovering,
    Stopped,
    Failed,
}

impl SessionState {
    /// Terminal states accept no further transitions except nothing at all.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Whether the legal transition table allows `self -> next`.
    ///
    /// Any non-terminal state may move to `Stopped` (explicit stop).
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return false;
        }
        if next == Self::Stopped {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting)
                | (Self::Connecting, Self::Streaming)
                | (Self::Connecting, Self::Failed)
                | (Self::Streaming, Self::Degraded)
                | (Self::Degraded, Self::Streaming)
                | (Self::Streaming, Self::Recovering)
                | (Self::Degraded, Self::Recovering)
                | (Self::Recovering, Self::Streaming)
                | (Self::Recovering, Self::Failed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Degraded => "degraded",
            Self::Recovering => "recovering",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
