//! Broadcast notifications for subsystems observing event delivery.

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{Event, Message, Region};

/// Default channel capacity.
const CHANNEL_CAPACITY: usize = 1024;

/// Observable outputs of the event pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// An event was acknowledged by the server.
    DidPostEvent(Event),
    /// The server response carried regions to monitor.
    DidReceiveRegions(Vec<Region>),
    /// The server response carried inbox messages.
    DidReceiveMessages(Vec<Message>),
}

/// Fan-out of pipeline notifications to any number of observers.
///
/// Publishing never blocks and never fails: with no subscribers the
/// notification is dropped, and slow subscribers skip what they missed.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a notification to current subscribers.
    pub fn publish(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }

    pub fn post_event(&self, event: Event) {
        self.publish(Notification::DidPostEvent(event));
    }

    /// Publish regions; empty lists are not announced.
    pub fn receive_regions(&self, regions: Vec<Region>) {
        if !regions.is_empty() {
            self.publish(Notification::DidReceiveRegions(regions));
        }
    }

    /// Publish messages; empty lists are not announced.
    pub fn receive_messages(&self, messages: Vec<Message>) {
        if !messages.is_empty() {
            self.publish(Notification::DidReceiveMessages(messages));
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream of notifications published after this call.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, Notification> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(notification) => Some(notification),
                    Err(err) => {
                        tracing::warn!(%err, "Notification subscriber lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, EventInfo};

    #[tokio::test]
    async fn test_stream_receives_published_notifications() {
        let notifier = Notifier::new();
        let mut stream = notifier.stream();

        let event = Event::new(EventInfo::new("Screen Viewed"), Context::default());
        notifier.post_event(event.clone());
        notifier.receive_regions(Vec::new());
        notifier.receive_messages(Vec::new());
        notifier.receive_regions(vec![Region::Geofence {
            identifier: "g".into(),
            latitude: 1.0,
            longitude: 2.0,
            radius: 3.0,
        }]);

        assert_eq!(stream.next().await, Some(Notification::DidPostEvent(event)));
        match stream.next().await {
            Some(Notification::DidReceiveRegions(regions)) => assert_eq!(regions.len(), 1),
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let notifier = Notifier::with_capacity(1);
        assert_eq!(notifier.subscriber_count(), 0);
        notifier.post_event(Event::new(EventInfo::new("x"), Context::default()));
    }
}
