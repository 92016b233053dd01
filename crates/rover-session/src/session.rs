//! Active-time accounting for a single session.

use std::time::Duration;

use tokio::time::Instant;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not timing and no keep-alive window open.
    Idle,
    /// Timing active use.
    Running,
    /// Ended, waiting out the keep-alive window.
    Ending,
}

/// Accumulates active time across start/end cycles.
///
/// `end` opens a keep-alive window identified by an epoch. A later `start`
/// or `resume` closes the window and bumps the epoch, so the expiry for
/// that window no longer matches and completes nothing.
#[derive(Debug, Default)]
pub struct Session {
    accumulated: Duration,
    running_since: Option<Instant>,
    ended_at: Option<Instant>,
    epoch: u64,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.running_since.is_some() {
            SessionState::Running
        } else if self.ended_at.is_some() {
            SessionState::Ending
        } else {
            SessionState::Idle
        }
    }

    /// Begin timing, excluding any time spent ended. No-op while running.
    pub fn start(&mut self, now: Instant) -> bool {
        self.begin(now, None)
    }

    /// Begin timing, counting the time since `end` as active less
    /// `excluded`. No-op while running.
    pub fn resume(&mut self, now: Instant, excluded: Duration) -> bool {
        self.begin(now, Some(excluded))
    }

    fn begin(&mut self, now: Instant, count_gap: Option<Duration>) -> bool {
        if self.running_since.is_some() {
            return false;
        }
        if let Some(ended_at) = self.ended_at.take() {
            self.epoch += 1;
            if let Some(excluded) = count_gap {
                self.accumulated += now
                    .saturating_duration_since(ended_at)
                    .saturating_sub(excluded);
            }
        }
        self.running_since = Some(now);
        true
    }

    /// Stop timing and open a keep-alive window.
    ///
    /// Returns the window's epoch, or `None` if the session was not running.
    pub fn end(&mut self, now: Instant) -> Option<u64> {
        let since = self.running_since.take()?;
        self.accumulated += now.saturating_duration_since(since);
        self.ended_at = Some(now);
        self.epoch += 1;
        Some(self.epoch)
    }

    /// Close the keep-alive window opened at `epoch`.
    ///
    /// Returns the accumulated duration and resets the session to idle, or
    /// `None` if the window was already closed by a restart.
    pub fn expire(&mut self, epoch: u64) -> Option<Duration> {
        if self.ended_at.is_none() || epoch != self.epoch {
            return None;
        }
        self.ended_at = None;
        Some(std::mem::take(&mut self.accumulated))
    }

    /// Active time so far, including the current run.
    #[must_use]
    pub fn duration(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .running_since
                .map_or(Duration::ZERO, |since| now.saturating_duration_since(since))
    }
}
