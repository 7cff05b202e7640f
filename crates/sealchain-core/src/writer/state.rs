//! Writer lifecycle states.

/// Lifecycle state of the single writer.
///
/// `Starting -> LeaseAcquired -> Initialized -> Running -> Draining ->
/// Stopped`, with `Failed` terminal and reachable from any non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Acquiring the writer lease.
    Starting,
    /// Lease held; chain head not yet loaded.
    LeaseAcquired,
    /// Head loaded; queue not yet draining.
    Initialized,
    /// Draining the queue and sealing entries.
    Running,
    /// Shutdown requested; processing already-enqueued intents only.
    Draining,
    /// Queue drained and closed; heartbeat cancelled. Terminal.
    Stopped,
    /// Lease lost or fatal store condition. Terminal.
    Failed,
}

impl WriterState {
    /// Whether the writer will make no further progress.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl std::fmt::Display for WriterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::LeaseAcquired => write!(f, "lease_acquired"),
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
