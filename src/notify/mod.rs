//! Hub notification and worker status contracts.
//!
//! The hub (the inter-agent messaging transport) is an external
//! collaborator; this module only knows how to hand it text. All delivery
//! is best-effort — failures are logged and swallowed, never fatal to the
//! work loop.

pub mod client;

/// Delivery priority understood by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyPriority {
    /// Failure alerts.
    Urgent,
    /// Work started announcements.
    High,
    /// Routine updates.
    Normal,
    /// Background noise.
    Low,
}

impl NotifyPriority {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

/// Worker availability states reported to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Polling for work.
    Online,
    /// Shut down.
    Offline,
    /// Executing a claimed message.
    Processing,
}

impl WorkerStatus {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Processing => "processing",
        }
    }
}
