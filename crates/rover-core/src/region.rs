//! Monitored regions delivered by the server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Attributes, EventInfo};

/// A geofence or beacon region to monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Region {
    Geofence {
        identifier: String,
        latitude: f64,
        longitude: f64,
        radius: f64,
    },
    Beacon {
        identifier: String,
        uuid: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        major: Option<u16>,
        /// Only meaningful together with `major`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minor: Option<u16>,
    },
}

impl Region {
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Geofence { identifier, .. } | Self::Beacon { identifier, .. } => identifier,
        }
    }

    /// Attribute form used in location-transition events.
    #[must_use]
    pub fn attribute_value(&self) -> Attributes {
        let mut attrs = Attributes::new();
        match self {
            Self::Geofence {
                identifier,
                latitude,
                longitude,
                radius,
            } => {
                attrs.insert_static("identifier", identifier.as_str());
                attrs.insert_static("center", vec![*latitude, *longitude]);
                attrs.insert_static("radius", *radius);
            }
            Self::Beacon {
                identifier,
                uuid,
                major,
                minor,
            } => {
                attrs.insert_static("identifier", identifier.as_str());
                attrs.insert_static("uuid", uuid.to_string());
                if let Some(major) = major {
                    attrs.insert_static("major", u32::from(*major));
                    if let Some(minor) = minor {
                        attrs.insert_static("minor", u32::from(*minor));
                    }
                }
            }
        }
        attrs
    }

    fn transition_event(&self, verb: &str) -> EventInfo {
        let (name, key) = match self {
            Self::Geofence { .. } => (format!("Geofence {verb}"), "geofence"),
            Self::Beacon { .. } => (format!("Beacon Region {verb}"), "beaconRegion"),
        };
        let mut attributes = Attributes::new();
        attributes.insert_static(key, self.attribute_value());
        EventInfo::new(name)
            .with_namespace("rover")
            .with_attributes(attributes)
    }
}

impl EventInfo {
    /// Event recorded when the device enters `region`.
    #[must_use]
    pub fn region_entered(region: &Region) -> Self {
        region.transition_event("Entered")
    }

    /// Event recorded when the device exits `region`.
    #[must_use]
    pub fn region_exited(region: &Region) -> Self {
        region.transition_event("Exited")
    }
}
