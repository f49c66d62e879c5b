//! Lock-free download progress shared with rendering threads.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

/// Lifecycle phase of a download session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DownloadPhase {
    Idle = 0,
    Downloading = 1,
    Extracting = 2,
    Done = 3,
    Failed = 4,
}

impl DownloadPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DownloadPhase::Downloading,
            2 => DownloadPhase::Extracting,
            3 => DownloadPhase::Done,
            4 => DownloadPhase::Failed,
            _ => DownloadPhase::Idle,
        }
    }

    /// Done and Failed end a session.
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadPhase::Done | DownloadPhase::Failed)
    }
}

impl std::fmt::Display for DownloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadPhase::Idle => write!(f, "idle"),
            DownloadPhase::Downloading => write!(f, "downloading"),
            DownloadPhase::Extracting => write!(f, "extracting"),
            DownloadPhase::Done => write!(f, "done"),
            DownloadPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time view of a download, cheap enough to take every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    pub phase: DownloadPhase,
    pub active: bool,
}

impl ProgressSnapshot {
    /// Transfer completion in percent; 0 while the total is unknown.
    pub fn percent(&self) -> u8 {
        if self.bytes_total == 0 {
            return 0;
        }
        let ratio = self.bytes_transferred.min(self.bytes_total) as f64 / self.bytes_total as f64;
        (ratio * 100.0) as u8
    }
}

/// Shared scalar state of the session.
///
/// Counters are independent relaxed atomics: a reader may see a total from
/// one chunk and a transferred count from the next, which is fine for display.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) active: AtomicBool,
    bytes_total: AtomicU64,
    bytes_transferred: AtomicU64,
    phase: AtomicU8,
}

impl SessionState {
    pub(crate) fn reset_for_start(&self) {
        self.bytes_total.store(0, Ordering::Relaxed);
        self.bytes_transferred.store(0, Ordering::Relaxed);
        self.set_phase(DownloadPhase::Downloading);
    }

    pub(crate) fn record_progress(&self, total: u64, transferred: u64) {
        self.bytes_total.store(total, Ordering::Relaxed);
        self.bytes_transferred.store(transferred, Ordering::Relaxed);
    }

    pub(crate) fn set_phase(&self, phase: DownloadPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub(crate) fn phase(&self) -> DownloadPhase {
        DownloadPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
            phase: self.phase(),
            active: self.active.load(Ordering::Acquire),
        }
    }
}
