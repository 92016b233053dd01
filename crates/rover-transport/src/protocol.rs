//! JSON:API wire format for event batches.
//!
//! Requests carry one `events` resource per event:
//!
//! ```json
//! {"data": [{"type": "events", "id": "...", "attributes": {"name": "...", ...}}]}
//! ```
//!
//! Responses may carry an `included` array with `geofence-regions`,
//! `ibeacon-regions` and `messages` resources. Included items that do not
//! parse are skipped. A malformed document is reported as an error, which
//! [`crate::JsonApiClient`] downgrades to an empty acknowledgment.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rover_core::{
    Attributes, ClientError, Context, Event, Message, MessageAction, Region, SubmitResponse,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to encode events: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Malformed response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Request document for a batch of events.
#[derive(Debug, Serialize)]
pub struct EventsPayload<'a> {
    data: Vec<EventResource<'a>>,
}

#[derive(Debug, Serialize)]
struct EventResource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: Uuid,
    attributes: EventResourceAttributes<'a>,
}

#[derive(Debug, Serialize)]
struct EventResourceAttributes<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    attributes: &'a Attributes,
    context: &'a Context,
    timestamp: DateTime<Utc>,
}

impl<'a> EventsPayload<'a> {
    #[must_use]
    pub fn new(events: &'a [Event]) -> Self {
        let data = events
            .iter()
            .map(|event| EventResource {
                kind: "events",
                id: event.id,
                attributes: EventResourceAttributes {
                    name: &event.name,
                    namespace: event.namespace.as_deref(),
                    attributes: &event.attributes,
                    context: &event.context,
                    timestamp: event.timestamp,
                },
            })
            .collect();
        Self { data }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Serialize a batch into a request body.
///
/// # Errors
/// Returns error if an event cannot be represented as JSON.
pub fn encode_events(events: &[Event]) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(&EventsPayload::new(events)).map_err(ProtocolError::Encode)
}

#[derive(Debug, Default, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    included: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    #[serde(default)]
    attributes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GeofenceAttributes {
    latitude: f64,
    longitude: f64,
    radius: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BeaconAttributes {
    uuid: Uuid,
    major_number: Option<u16>,
    minor_number: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct MessageAttributes {
    ios_title: Option<String>,
    notification_text: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    saved_to_inbox: bool,
    content_type: Option<String>,
    website_url: Option<String>,
    landing_page: Option<serde_json::Value>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

/// Parse a response body into the regions and messages it carries.
///
/// An empty body is a valid acknowledgment with nothing attached.
///
/// # Errors
/// Returns error if the body is not a JSON object of the expected shape.
pub fn decode_response(body: &[u8]) -> Result<SubmitResponse, ProtocolError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SubmitResponse::default());
    }
    let document: EventsResponse = serde_json::from_slice(body).map_err(ProtocolError::Decode)?;

    let mut response = SubmitResponse::default();
    for item in document.included {
        let resource: Resource = match serde_json::from_value(item) {
            Ok(resource) => resource,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping included item without type or id");
                continue;
            }
        };
        match resource.kind.as_str() {
            "geofence-regions" | "ibeacon-regions" => {
                if let Some(region) = map_region(resource) {
                    response.regions.push(region);
                }
            }
            "messages" => {
                if let Some(message) = map_message(resource) {
                    response.messages.push(message);
                }
            }
            other => tracing::debug!(kind = other, "Ignoring included resource"),
        }
    }
    Ok(response)
}

fn parse_attributes<T: serde::de::DeserializeOwned>(resource: &Resource) -> Option<T> {
    serde_json::from_value(resource.attributes.clone())
        .map_err(|e| {
            tracing::debug!(
                kind = %resource.kind,
                id = %resource.id,
                error = %e,
                "Skipping invalid included resource"
            );
        })
        .ok()
}

fn map_region(resource: Resource) -> Option<Region> {
    if resource.kind == "geofence-regions" {
        let attrs: GeofenceAttributes = parse_attributes(&resource)?;
        return Some(Region::Geofence {
            identifier: resource.id,
            latitude: attrs.latitude,
            longitude: attrs.longitude,
            radius: attrs.radius,
        });
    }

    let attrs: BeaconAttributes = parse_attributes(&resource)?;
    // A minor number without a major one does not narrow the region.
    let minor = attrs.major_number.and(attrs.minor_number);
    Some(Region::Beacon {
        identifier: resource.id,
        uuid: attrs.uuid,
        major: attrs.major_number,
        minor,
    })
}

fn map_message(resource: Resource) -> Option<Message> {
    let attrs: MessageAttributes = parse_attributes(&resource)?;

    let action = match attrs.content_type.as_deref() {
        Some("website") => attrs
            .website_url
            .map_or(MessageAction::None, |url| MessageAction::Website { url }),
        Some("landing-page") => attrs
            .landing_page
            .map_or(MessageAction::None, |document| MessageAction::LandingPage { document }),
        _ => MessageAction::None,
    };

    Some(Message {
        id: resource.id,
        title: attrs.ios_title,
        text: attrs.notification_text,
        timestamp: attrs.timestamp,
        read: attrs.read,
        saved_to_inbox: attrs.saved_to_inbox,
        action,
        properties: attrs.properties,
    })
}
