//! Named sessions that report their duration once they truly end.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rover_core::{AppLifecycle, EventInfo, EventSink, SessionConfig};
use tokio::time::Instant;

use crate::{Session, SessionState};

type CompletionHandler = Arc<dyn Fn(Duration) -> EventInfo + Send + Sync>;

struct SessionEntry {
    session: Session,
    is_unregistered: bool,
    on_complete: CompletionHandler,
    /// Background time elapsed when the session last ended.
    background_mark: Duration,
}

#[derive(Default)]
struct TrackerState {
    sessions: HashMap<String, SessionEntry>,
    background_since: Option<Instant>,
    background_total: Duration,
}

impl TrackerState {
    /// Total time spent inactive, including the current stretch.
    fn background_elapsed(&self, now: Instant) -> Duration {
        self.background_total
            + self
                .background_since
                .map_or(Duration::ZERO, |since| now.saturating_duration_since(since))
    }
}

struct Inner {
    sink: Arc<dyn EventSink>,
    keep_alive: Duration,
    state: Mutex<TrackerState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks overlapping named sessions, such as screens being viewed.
///
/// Ending a session (unregistering it, or the app going inactive) opens a
/// keep-alive window. If the session is not restarted before the window
/// closes, its accumulated active time is turned into an event by the
/// completion handler and handed to the sink. Unregistered sessions are then
/// forgotten; registered ones start over on the next foreground.
///
/// All methods that may open a keep-alive window spawn a timer and must be
/// called from within a Tokio runtime.
#[derive(Clone)]
pub struct SessionTracker {
    inner: Arc<Inner>,
}

impl SessionTracker {
    /// Create a tracker using the configured keep-alive time.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, config: &SessionConfig) -> Self {
        Self::with_keep_alive(sink, config.keep_alive())
    }

    #[must_use]
    pub fn with_keep_alive(sink: Arc<dyn EventSink>, keep_alive: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                keep_alive,
                state: Mutex::new(TrackerState::default()),
            }),
        }
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.inner.keep_alive
    }

    /// Start a session, or resume it if it is still within its keep-alive
    /// window.
    ///
    /// Resuming an unregistered session continues its duration as if it had
    /// never ended, except for any time the app spent inactive since. The
    /// completion handler of the first registration is kept for the life of
    /// the session.
    pub fn register_session<F>(&self, identifier: impl Into<String>, on_complete: F)
    where
        F: Fn(Duration) -> EventInfo + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        let now = Instant::now();
        let mut state = self.inner.state();
        let background = state.background_elapsed(now);

        if let Some(entry) = state.sessions.get_mut(&identifier) {
            if entry.is_unregistered {
                entry.is_unregistered = false;
                let excluded = background.saturating_sub(entry.background_mark);
                entry.session.resume(now, excluded);
                tracing::debug!(%identifier, ?excluded, "Session resumed");
            } else {
                entry.session.start(now);
            }
            return;
        }

        let mut session = Session::new();
        session.start(now);
        tracing::debug!(%identifier, "Session started");
        state.sessions.insert(
            identifier,
            SessionEntry {
                session,
                is_unregistered: false,
                on_complete: Arc::new(on_complete),
                background_mark: background,
            },
        );
    }

    /// End a session. It completes after the keep-alive time unless it is
    /// registered again first.
    pub fn unregister_session(&self, identifier: &str) {
        let now = Instant::now();
        let mut state = self.inner.state();
        let background = state.background_elapsed(now);

        let Some(entry) = state.sessions.get_mut(identifier) else {
            tracing::debug!(%identifier, "Unregistering unknown session");
            return;
        };
        entry.is_unregistered = true;
        if let Some(epoch) = entry.session.end(now) {
            entry.background_mark = background;
            self.schedule_expiry(identifier.to_owned(), epoch);
        }
    }

    /// Pause or resume every registered session on foreground changes.
    pub fn handle_lifecycle(&self, transition: AppLifecycle) {
        let now = Instant::now();
        let mut state = self.inner.state();

        match transition {
            AppLifecycle::WillResignActive => {
                state.background_since.get_or_insert(now);
                let background = state.background_elapsed(now);
                for (identifier, entry) in &mut state.sessions {
                    if let Some(epoch) = entry.session.end(now) {
                        entry.background_mark = background;
                        self.schedule_expiry(identifier.clone(), epoch);
                    }
                }
            }
            AppLifecycle::DidBecomeActive => {
                if let Some(since) = state.background_since.take() {
                    state.background_total += now.saturating_duration_since(since);
                }
                for entry in state.sessions.values_mut().filter(|e| !e.is_unregistered) {
                    entry.session.start(now);
                }
            }
            AppLifecycle::DidEnterBackground => {}
        }
    }

    /// True if a session with this identifier is live or pending removal.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.inner.state().sessions.contains_key(identifier)
    }

    #[must_use]
    pub fn state(&self, identifier: &str) -> Option<SessionState> {
        self.inner
            .state()
            .sessions
            .get(identifier)
            .map(|entry| entry.session.state())
    }

    /// Active time accumulated so far by a session.
    #[must_use]
    pub fn duration(&self, identifier: &str) -> Option<Duration> {
        let now = Instant::now();
        self.inner
            .state()
            .sessions
            .get(identifier)
            .map(|entry| entry.session.duration(now))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state().sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn schedule_expiry(&self, identifier: String, epoch: u64) {
        let weak = Arc::downgrade(&self.inner);
        let keep_alive = self.inner.keep_alive;

        tokio::spawn(async move {
            tokio::time::sleep(keep_alive).await;
            if let Some(inner) = weak.upgrade() {
                Self { inner }.expire(&identifier, epoch).await;
            }
        });
    }

    async fn expire(&self, identifier: &str, epoch: u64) {
        let completed = {
            let mut state = self.inner.state();
            let sessions = &mut state.sessions;
            let Some(entry) = sessions.get_mut(identifier) else {
                return;
            };
            let Some(duration) = entry.session.expire(epoch) else {
                return;
            };
            let on_complete = Arc::clone(&entry.on_complete);
            if entry.is_unregistered {
                sessions.remove(identifier);
            }
            (on_complete, duration)
        };

        let (on_complete, duration) = completed;
        tracing::debug!(%identifier, ?duration, "Session completed");
        self.inner.sink.add_event(on_complete(duration)).await;
    }
}
