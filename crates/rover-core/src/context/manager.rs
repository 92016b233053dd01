//! Cached provider implementations updated by platform observers.

use std::{
    fmt::Write as _,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::Utc;

use super::{
    DebugContextProvider, DeviceInfo, Locale, LocaleContextProvider, PushEnvironment, PushToken,
    PushTokenContextProvider, Reachability, ReachabilityContextProvider, StaticContextProvider,
    TimeZoneContextProvider, UserInfoContextProvider,
};
use crate::Attributes;

#[derive(Default)]
struct Cached {
    locale: Option<Locale>,
    push_token: Option<PushToken>,
    reachability: Option<Reachability>,
    device: Option<DeviceInfo>,
    time_zone: Option<String>,
    user_info: Attributes,
}

/// In-memory store for context values refreshed elsewhere.
///
/// Platform observers (locale changes, push registration, reachability
/// callbacks) write through the setters; the registry reads through the
/// provider traits. Reads never wait on a refresh.
#[derive(Default)]
pub struct ContextManager {
    cached: RwLock<Cached>,
}

impl ContextManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Cached) -> T) -> T {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        f(&cached)
    }

    fn write(&self, f: impl FnOnce(&mut Cached)) {
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut cached);
    }

    pub fn set_locale(&self, locale: Locale) {
        self.write(|c| c.locale = Some(locale));
    }

    pub fn set_reachability(&self, reachability: Reachability) {
        self.write(|c| c.reachability = Some(reachability));
    }

    pub fn set_device(&self, device: DeviceInfo) {
        self.write(|c| c.device = Some(device));
    }

    pub fn set_time_zone(&self, time_zone: impl Into<String>) {
        let time_zone = time_zone.into();
        self.write(|c| c.time_zone = Some(time_zone));
    }

    /// Store a raw device token, hex-encoded.
    pub fn set_push_token(&self, token: &[u8], environment: PushEnvironment) {
        let value = token.iter().fold(String::with_capacity(token.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        });
        tracing::debug!(%value, ?environment, "Push token updated");
        self.write(|c| {
            c.push_token = Some(PushToken {
                value,
                environment,
                timestamp: Utc::now(),
            });
        });
    }

    pub fn clear_push_token(&self) {
        self.write(|c| c.push_token = None);
    }

    /// Mutate the user info attributes in place.
    pub fn update_user_info(&self, f: impl FnOnce(&mut Attributes)) {
        self.write(|c| f(&mut c.user_info));
    }

    pub fn clear_user_info(&self) {
        self.write(|c| c.user_info = Attributes::new());
    }
}

impl LocaleContextProvider for ContextManager {
    fn locale(&self) -> Option<Locale> {
        self.read(|c| c.locale.clone())
    }
}

impl PushTokenContextProvider for ContextManager {
    fn push_token(&self) -> Option<PushToken> {
        self.read(|c| c.push_token.clone())
    }
}

impl ReachabilityContextProvider for ContextManager {
    fn reachability(&self) -> Option<Reachability> {
        self.read(|c| c.reachability)
    }
}

impl StaticContextProvider for ContextManager {
    fn device(&self) -> Option<DeviceInfo> {
        self.read(|c| c.device.clone())
    }
}

impl TimeZoneContextProvider for ContextManager {
    fn time_zone(&self) -> Option<String> {
        self.read(|c| c.time_zone.clone())
    }
}

impl UserInfoContextProvider for ContextManager {
    fn user_info(&self) -> Option<Attributes> {
        self.read(|c| (!c.user_info.is_empty()).then(|| c.user_info.clone()))
    }
}

/// Test-device flag, toggled from a debug settings screen.
#[derive(Debug, Default)]
pub struct DebugContextManager {
    is_test_device: AtomicBool,
}

impl DebugContextManager {
    #[must_use]
    pub const fn new(is_test_device: bool) -> Self {
        Self {
            is_test_device: AtomicBool::new(is_test_device),
        }
    }

    pub fn set_test_device(&self, value: bool) {
        self.is_test_device.store(value, Ordering::Relaxed);
    }
}

impl DebugContextProvider for DebugContextManager {
    fn is_test_device(&self) -> bool {
        self.is_test_device.load(Ordering::Relaxed)
    }
}
