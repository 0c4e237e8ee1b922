//! Event listener adapter.
//!
//! The SDK calls `notify` from whatever thread it likes. The listener logs the
//! event and hands it to a sink that enqueues the matching state change onto
//! the owning lane, so `notify` never blocks the caller.

use super::{PublisherEvent, SubscriberEvent};
use std::fmt;
use std::sync::Arc;

type Sink<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Listener handed to a [`Publisher`](super::Publisher).
#[derive(Clone)]
pub struct PublisherListener {
    sink: Sink<PublisherEvent>,
}

impl PublisherListener {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(PublisherEvent) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn notify(&self, event: PublisherEvent) {
        match &event {
            PublisherEvent::Connected => log::info!("[Pub][Ltn] Connected"),
            PublisherEvent::ConnectionError { status, reason } => {
                log::warn!("[Pub][Ltn] Connection error {}: {}", status, reason)
            }
            PublisherEvent::Publishing => log::info!("[Pub][Ltn] Publishing"),
            PublisherEvent::PublishingError(error) => {
                log::warn!("[Pub][Ltn] Publishing error: {}", error)
            }
            PublisherEvent::Disconnected => log::info!("[Pub][Ltn] Disconnected"),
            PublisherEvent::SignalingError(error) => {
                log::warn!("[Pub][Ltn] Signaling error: {}", error)
            }
            PublisherEvent::Stats(report) => log::debug!("[Pub][Ltn] Stats {}", report.summary()),
            PublisherEvent::ViewerCount(count) => log::info!("[Pub][Ltn] Viewers: {}", count),
            PublisherEvent::Active => log::info!("[Pub][Ltn] Stream active"),
            PublisherEvent::Inactive => log::info!("[Pub][Ltn] Stream inactive"),
        }
        (self.sink)(event);
    }
}

impl fmt::Debug for PublisherListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PublisherListener")
    }
}

/// Listener handed to a [`Subscriber`](super::Subscriber).
#[derive(Clone)]
pub struct SubscriberListener {
    sink: Sink<SubscriberEvent>,
}

impl SubscriberListener {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(SubscriberEvent) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn notify(&self, event: SubscriberEvent) {
        match &event {
            SubscriberEvent::ConnectionError { status, reason } => {
                log::warn!("[Sub][Ltn] Connection error {}: {}", status, reason)
            }
            SubscriberEvent::SubscribedError(error) | SubscriberEvent::SignalingError(error) => {
                log::warn!("[Sub][Ltn] {}: {}", event.name(), error)
            }
            SubscriberEvent::AudioTrack {
                track,
                transceiver_id,
            }
            | SubscriberEvent::VideoTrack {
                track,
                transceiver_id,
            } => log::info!(
                "[Sub][Ltn] Track {} ({}) negotiated, transceiver: {:?}",
                track.id(),
                track.kind().as_str(),
                transceiver_id
            ),
            SubscriberEvent::Stats(report) => log::debug!("[Sub][Ltn] Stats {}", report.summary()),
            SubscriberEvent::Layers { mid, active, inactive } => log::debug!(
                "[Sub][Ltn] Layers on {}: {} active, {} inactive",
                mid,
                active.len(),
                inactive.len()
            ),
            SubscriberEvent::Vad { mid, .. } => log::debug!("[Sub][Ltn] Voice activity on {}", mid),
            other => log::info!("[Sub][Ltn] {}", other.name()),
        }
        (self.sink)(event);
    }
}

impl fmt::Debug for SubscriberListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubscriberListener")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_notify_forwards_to_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = PublisherListener::new(move |event: PublisherEvent| {
            sink.lock().unwrap().push(event.name());
        });

        listener.notify(PublisherEvent::Connected);
        listener.clone().notify(PublisherEvent::ViewerCount(2));

        assert_eq!(*seen.lock().unwrap(), vec!["connected", "viewer_count"]);
    }

    #[test]
    fn test_subscriber_notify_does_not_block_on_channel() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = SubscriberListener::new(move |event: SubscriberEvent| {
            let _ = tx.send(event.name());
        });

        listener.notify(SubscriberEvent::Subscribed);
        listener.notify(SubscriberEvent::Stopped);

        assert_eq!(rx.try_recv().unwrap(), "subscribed");
        assert_eq!(rx.try_recv().unwrap(), "stopped");
    }
}
