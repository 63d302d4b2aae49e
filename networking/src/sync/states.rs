/// Sync service state machine and the status shared with other tasks.
use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Idle state: no sync attempt running.
    ///
    /// Initial state, and the state returned to after an attempt that did
    /// not complete (no peer, peer not ahead, downloader declined).
    Idle,

    /// Syncing state: a download is delegated to the downloader.
    Syncing,

    /// Synced state: the last attempt completed.
    ///
    /// The node keeps attempting syncs on the timer; a peer that moves ahead
    /// takes it back to `Syncing`.
    Synced,
}

impl SyncState {
    /// Check if a transition to the target state is valid.
    pub fn can_transition_to(&self, target: SyncState) -> bool {
        match self {
            SyncState::Idle => matches!(target, SyncState::Syncing),
            SyncState::Syncing => matches!(target, SyncState::Synced | SyncState::Idle),
            SyncState::Synced => matches!(target, SyncState::Syncing | SyncState::Idle),
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncState::Syncing,
            2 => SyncState::Synced,
            _ => SyncState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SyncState::Idle => 0,
            SyncState::Syncing => 1,
            SyncState::Synced => 2,
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::Idle
    }
}

/// Download strategy handed to the downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// Replay every block from the common ancestor.
    FullSync,
    /// Download a recent state trie snapshot plus the history after it.
    FastSync,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::FullSync => "full",
            SyncMode::FastSync => "fast",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync flags readable from any task.
///
/// Only the sync service writes these. Fast sync can be switched off but
/// never back on.
#[derive(Debug, Default)]
pub struct SyncStatus {
    fast_sync: AtomicBool,
    synced: AtomicBool,
    halted: AtomicBool,
    state: AtomicU8,
}

impl SyncStatus {
    pub fn new(fast_sync: bool) -> Self {
        Self {
            fast_sync: AtomicBool::new(fast_sync),
            ..Self::default()
        }
    }

    pub fn mode(&self) -> SyncMode {
        if self.fast_sync.load(Ordering::Acquire) {
            SyncMode::FastSync
        } else {
            SyncMode::FullSync
        }
    }

    pub fn fast_sync(&self) -> bool {
        self.fast_sync.load(Ordering::Acquire)
    }

    /// Whether a sync has completed at least once this session.
    pub fn synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Whether syncing stopped on local storage corruption.
    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(super) fn disable_fast_sync(&self) {
        self.fast_sync.store(false, Ordering::Release);
    }

    pub(super) fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }

    pub(super) fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// Move to `target` if the state machine allows it.
    pub(super) fn transition(&self, target: SyncState) -> bool {
        let current = self.state();
        if current == target {
            return true;
        }
        if !current.can_transition_to(target) {
            return false;
        }
        self.state.store(target.as_u8(), Ordering::Release);
        true
    }
}
