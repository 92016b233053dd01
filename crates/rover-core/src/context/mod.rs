//! Device and user context attached to every event.
//!
//! A [`Context`] is a point-in-time snapshot assembled by a
//! [`ContextRegistry`] from independently refreshed providers. Every field is
//! optional: a provider that is not registered simply leaves its field empty.

mod manager;
mod providers;
mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Attributes;

pub use manager::{ContextManager, DebugContextManager};
pub use providers::{
    BluetoothContextProvider, ContextProvider, DebugContextProvider, LocaleContextProvider,
    LocationContextProvider, NotificationsContextProvider, PushTokenContextProvider,
    ReachabilityContextProvider, StaticContextProvider, TelephonyContextProvider,
    TimeZoneContextProvider, UserInfoContextProvider,
};
pub use registry::{ContextRegistry, ContextRegistryBuilder};

/// Immutable snapshot of device and user state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<Locale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bluetooth_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<PushToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachability: Option<Reachability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Attributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_test_device: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_authorization: Option<NotificationAuthorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephony: Option<Telephony>,
}

impl Context {
    /// True when no provider contributed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Last known location fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    pub horizontal_accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// User locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locale {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// APNs environment the token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushEnvironment {
    Production,
    Development,
}

/// Registered push token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushToken {
    pub value: String,
    pub environment: PushEnvironment,
    pub timestamp: DateTime<Utc>,
}

/// Network reachability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reachability {
    pub is_wifi_enabled: bool,
    pub is_cellular_enabled: bool,
}

/// Static app and device facts, fixed for the process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub app_build: String,
    pub app_identifier: String,
    pub app_version: String,
    pub device_manufacturer: String,
    pub device_model: String,
    pub device_name: String,
    pub operating_system_name: String,
    pub operating_system_version: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub sdk_version: String,
}

/// Push notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAuthorization {
    NotDetermined,
    Denied,
    Authorized,
    Provisional,
}

/// Cellular carrier details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telephony {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radio: Option<String>,
}
