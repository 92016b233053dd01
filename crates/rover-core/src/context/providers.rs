//! Provider traits, one per context field.
//!
//! Providers answer from cached state and must never block: any expensive
//! refresh (location updates, reachability polling) happens elsewhere and
//! only the latest value is read here.

use super::{
    Context, DeviceInfo, Locale, Location, NotificationAuthorization, PushToken, Reachability,
    Telephony,
};
use crate::Attributes;

/// Source of complete context snapshots, consumed by the event queue.
pub trait ContextProvider: Send + Sync {
    fn context(&self) -> Context;
}

pub trait BluetoothContextProvider: Send + Sync {
    fn is_bluetooth_enabled(&self) -> Option<bool>;
}

pub trait DebugContextProvider: Send + Sync {
    fn is_test_device(&self) -> bool;
}

pub trait LocationContextProvider: Send + Sync {
    fn location(&self) -> Option<Location>;
}

pub trait LocaleContextProvider: Send + Sync {
    fn locale(&self) -> Option<Locale>;
}

pub trait NotificationsContextProvider: Send + Sync {
    fn notification_authorization(&self) -> Option<NotificationAuthorization>;
}

pub trait PushTokenContextProvider: Send + Sync {
    fn push_token(&self) -> Option<PushToken>;
}

pub trait ReachabilityContextProvider: Send + Sync {
    fn reachability(&self) -> Option<Reachability>;
}

pub trait StaticContextProvider: Send + Sync {
    fn device(&self) -> Option<DeviceInfo>;
}

pub trait TelephonyContextProvider: Send + Sync {
    fn telephony(&self) -> Option<Telephony>;
}

pub trait TimeZoneContextProvider: Send + Sync {
    fn time_zone(&self) -> Option<String>;
}

pub trait UserInfoContextProvider: Send + Sync {
    fn user_info(&self) -> Option<Attributes>;
}
