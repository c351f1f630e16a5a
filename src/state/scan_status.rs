/// Scan status definitions for tracking a scan request's lifecycle
///
/// A scan moves PENDING -> SCANNING -> {COMPLETED, FAILED}. Transitions are
/// monotonic: a terminal scan never changes status again.
use std::fmt;

/// Represents the current status of a scan request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScanStatus {
    // ===== Active States =====
    /// Scan has been requested and its job is waiting in the queue
    Pending,

    /// A worker has claimed the job and the pipeline is running
    Scanning,

    // ===== Terminal States =====
    /// Scan finished and its report and score are stored
    Completed,

    /// Scan failed; an error message is stored with it
    Failed,
}

impl ScanStatus {
    /// Returns true if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if this is an active state
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if a transition from `self` to `next` is legal
    ///
    /// A pending scan may fail before it starts (for example when its job is
    /// abandoned), but it can never complete without passing through SCANNING.
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Scanning)
                | (Self::Pending, Self::Failed)
                | (Self::Scanning, Self::Completed)
                | (Self::Scanning, Self::Failed)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Scanning => "SCANNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "SCANNING" => Some(Self::Scanning),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_states() -> Vec<Self> {
        vec![Self::Pending, Self::Scanning, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
