//! Application lifecycle transitions that drive timers.

use serde::{Deserialize, Serialize};

/// Foreground/background transitions reported by the host app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycle {
    /// App became active; sessions resume and the flush timer runs.
    DidBecomeActive,
    /// App is about to go inactive; sessions pause and the flush timer stops.
    WillResignActive,
    /// App moved to the background; pending events are flushed.
    DidEnterBackground,
}
