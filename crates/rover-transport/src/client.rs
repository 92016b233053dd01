//! `EventsClient` that speaks the JSON:API protocol over any endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use rover_core::{ClientError, Event, EventsClient, SubmitResponse};

use crate::protocol::{decode_response, encode_events};

/// Something that can deliver a request body and return the response body.
///
/// Implementations own connection handling, authentication headers and
/// timeouts. Non-success statuses should map to `ClientError::Server`.
#[async_trait]
pub trait EventsEndpoint: Send + Sync {
    async fn post(&self, body: Vec<u8>) -> Result<Vec<u8>, ClientError>;
}

/// Encodes batches, posts them and maps the response.
pub struct JsonApiClient {
    endpoint: Arc<dyn EventsEndpoint>,
}

impl JsonApiClient {
    #[must_use]
    pub fn new(endpoint: Arc<dyn EventsEndpoint>) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl EventsClient for JsonApiClient {
    async fn submit(&self, events: &[Event]) -> Result<SubmitResponse, ClientError> {
        let body = encode_events(events)?;
        tracing::trace!(bytes = body.len(), count = events.len(), "Posting events");

        let response = self.endpoint.post(body).await?;
        // The server accepted the batch; an unreadable reply only loses the
        // regions and messages it may have carried.
        let mapped = decode_response(&response).unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                bytes = response.len(),
                "Ignoring unreadable events response"
            );
            SubmitResponse::default()
        });
        tracing::debug!(
            regions = mapped.regions.len(),
            messages = mapped.messages.len(),
            "Events acknowledged"
        );
        Ok(mapped)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rover_core::{Context, EventInfo};

    use super::*;

    struct CannedEndpoint {
        requests: Mutex<Vec<serde_json::Value>>,
        reply: Result<Vec<u8>, u16>,
    }

    impl CannedEndpoint {
        fn new(reply: Result<&str, u16>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                reply: reply.map(|body| body.as_bytes().to_vec()),
            })
        }
    }

    #[async_trait]
    impl EventsEndpoint for CannedEndpoint {
        async fn post(&self, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
            self.requests
                .lock()
                .unwrap()
                .push(serde_json::from_slice(&body).unwrap());
            self.reply.clone().map_err(|status| ClientError::Server {
                status,
                message: "unavailable".into(),
            })
        }
    }

    fn batch() -> Vec<Event> {
        ["a", "b"]
            .iter()
            .map(|name| Event::new(EventInfo::new(*name), Context::default()))
            .collect()
    }

    #[tokio::test]
    async fn test_submit_posts_batch_and_maps_reply() {
        let endpoint = CannedEndpoint::new(Ok(r#"{"included":[{"type":"geofence-regions","id":"g","attributes":{"latitude":1.0,"longitude":2.0,"radius":3.0}}]}"#));
        let client = JsonApiClient::new(endpoint.clone());

        let response = tokio_test::assert_ok!(client.submit(&batch()).await);
        assert_eq!(response.regions.len(), 1);

        let requests = endpoint.requests.lock().unwrap();
        assert_eq!(requests[0]["data"].as_array().unwrap().len(), 2);
        assert_eq!(requests[0]["data"][1]["attributes"]["name"], "b");
    }

    #[tokio::test]
    async fn test_server_error_propagates() {
        let client = JsonApiClient::new(CannedEndpoint::new(Err(503)));
        let err = tokio_test::assert_err!(client.submit(&batch()).await);
        assert!(matches!(err, ClientError::Server { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unreadable_success_reply_still_acknowledges() {
        let endpoint = CannedEndpoint::new(Ok("<html>ok</html>"));
        let client = JsonApiClient::new(endpoint.clone());

        let response = tokio_test::assert_ok!(client.submit(&batch()).await);
        assert_eq!(response, SubmitResponse::default());
        assert_eq!(endpoint.requests.lock().unwrap().len(), 1);
    }
}
