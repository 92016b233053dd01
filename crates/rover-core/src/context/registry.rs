//! Modular context provider assembled from independent sources.

use std::{fmt, sync::Arc};

use super::{
    BluetoothContextProvider, Context, ContextProvider, DebugContextProvider,
    LocaleContextProvider, LocationContextProvider, NotificationsContextProvider,
    PushTokenContextProvider, ReachabilityContextProvider, StaticContextProvider,
    TelephonyContextProvider, TimeZoneContextProvider, UserInfoContextProvider,
};

/// Registry of context providers, fixed once built.
///
/// Holds no mutable state of its own, so snapshots can be taken from any
/// thread without locking. Each provider is queried independently.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    bluetooth: Option<Arc<dyn BluetoothContextProvider>>,
    debug: Option<Arc<dyn DebugContextProvider>>,
    location: Option<Arc<dyn LocationContextProvider>>,
    locale: Option<Arc<dyn LocaleContextProvider>>,
    notifications: Option<Arc<dyn NotificationsContextProvider>>,
    push_token: Option<Arc<dyn PushTokenContextProvider>>,
    reachability: Option<Arc<dyn ReachabilityContextProvider>>,
    device: Option<Arc<dyn StaticContextProvider>>,
    telephony: Option<Arc<dyn TelephonyContextProvider>>,
    time_zone: Option<Arc<dyn TimeZoneContextProvider>>,
    user_info: Option<Arc<dyn UserInfoContextProvider>>,
}

impl ContextRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> ContextRegistryBuilder {
        ContextRegistryBuilder::default()
    }

    /// Query every registered provider and assemble a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Context {
        Context {
            location: self.location.as_ref().and_then(|p| p.location()),
            locale: self.locale.as_ref().and_then(|p| p.locale()),
            is_bluetooth_enabled: self
                .bluetooth
                .as_ref()
                .and_then(|p| p.is_bluetooth_enabled()),
            push_token: self.push_token.as_ref().and_then(|p| p.push_token()),
            reachability: self.reachability.as_ref().and_then(|p| p.reachability()),
            time_zone: self.time_zone.as_ref().and_then(|p| p.time_zone()),
            user_info: self.user_info.as_ref().and_then(|p| p.user_info()),
            device: self.device.as_ref().and_then(|p| p.device()),
            is_test_device: self.debug.as_ref().map(|p| p.is_test_device()),
            notification_authorization: self
                .notifications
                .as_ref()
                .and_then(|p| p.notification_authorization()),
            telephony: self.telephony.as_ref().and_then(|p| p.telephony()),
        }
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        [
            self.bluetooth.is_some(),
            self.debug.is_some(),
            self.location.is_some(),
            self.locale.is_some(),
            self.notifications.is_some(),
            self.push_token.is_some(),
            self.reachability.is_some(),
            self.device.is_some(),
            self.telephony.is_some(),
            self.time_zone.is_some(),
            self.user_info.is_some(),
        ]
        .into_iter()
        .filter(|registered| *registered)
        .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContextProvider for ContextRegistry {
    fn context(&self) -> Context {
        self.snapshot()
    }
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("providers", &self.len())
            .finish()
    }
}

/// Builder for [`ContextRegistry`].
#[derive(Default)]
pub struct ContextRegistryBuilder {
    registry: ContextRegistry,
}

impl ContextRegistryBuilder {
    #[must_use]
    pub fn bluetooth(mut self, provider: Arc<dyn BluetoothContextProvider>) -> Self {
        self.registry.bluetooth = Some(provider);
        self
    }

    #[must_use]
    pub fn debug(mut self, provider: Arc<dyn DebugContextProvider>) -> Self {
        self.registry.debug = Some(provider);
        self
    }

    #[must_use]
    pub fn location(mut self, provider: Arc<dyn LocationContextProvider>) -> Self {
        self.registry.location = Some(provider);
        self
    }

    #[must_use]
    pub fn locale(mut self, provider: Arc<dyn LocaleContextProvider>) -> Self {
        self.registry.locale = Some(provider);
        self
    }

    #[must_use]
    pub fn notifications(mut self, provider: Arc<dyn NotificationsContextProvider>) -> Self {
        self.registry.notifications = Some(provider);
        self
    }

    #[must_use]
    pub fn push_token(mut self, provider: Arc<dyn PushTokenContextProvider>) -> Self {
        self.registry.push_token = Some(provider);
        self
    }

    #[must_use]
    pub fn reachability(mut self, provider: Arc<dyn ReachabilityContextProvider>) -> Self {
        self.registry.reachability = Some(provider);
        self
    }

    #[must_use]
    pub fn device(mut self, provider: Arc<dyn StaticContextProvider>) -> Self {
        self.registry.device = Some(provider);
        self
    }

    #[must_use]
    pub fn telephony(mut self, provider: Arc<dyn TelephonyContextProvider>) -> Self {
        self.registry.telephony = Some(provider);
        self
    }

    #[must_use]
    pub fn time_zone(mut self, provider: Arc<dyn TimeZoneContextProvider>) -> Self {
        self.registry.time_zone = Some(provider);
        self
    }

    #[must_use]
    pub fn user_info(mut self, provider: Arc<dyn UserInfoContextProvider>) -> Self {
        self.registry.user_info = Some(provider);
        self
    }

    #[must_use]
    pub fn build(self) -> ContextRegistry {
        self.registry
    }
}
