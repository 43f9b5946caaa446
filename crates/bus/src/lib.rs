//! In-process message bus between channel adapters and upstream consumers.
//!
//! Inbound events flow through a single bounded queue; outbound events are
//! routed to per-adapter queues keyed by the adapter prefix of the target
//! channel id ("telegram:123" → the queue registered as "telegram").

use dashmap::DashMap;
use proto::{BusError, InboundEvent, OutboundEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default queue capacity for inbound and outbound channels.
pub const DEFAULT_CAPACITY: usize = 128;

/// Routes inbound events upstream and outbound events back to adapters.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundEvent>,
    /// adapter name -> outbound event sender
    outbound: DashMap<String, mpsc::Sender<OutboundEvent>>,
}

impl MessageBus {
    /// Creates a bus, returning the handle and the upstream inbound receiver.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<InboundEvent>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        (
            Self {
                inbound_tx,
                outbound: DashMap::new(),
            },
            inbound_rx,
        )
    }

    /// Publishes an inbound event from a channel adapter.
    ///
    /// Delivery is at-least-once from the adapter's point of view; the event
    /// is consumed exactly once by the upstream receiver.
    pub async fn publish(&self, event: InboundEvent) -> Result<(), BusError> {
        self.inbound_tx
            .send(event)
            .await
            .map_err(|_| BusError::Closed)
    }

    /// Returns a sender handle for adapters that publish inbound events
    /// from their own tasks.
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundEvent> {
        self.inbound_tx.clone()
    }

    /// Registers an adapter and returns the stream of outbound events
    /// addressed to its channel ids.
    pub fn subscribe(&self, adapter: &str) -> mpsc::Receiver<OutboundEvent> {
        debug!("Registering outbound subscriber: {adapter}");
        let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
        self.outbound.insert(adapter.to_string(), tx);
        rx
    }

    /// Removes an adapter's outbound queue.
    pub fn unsubscribe(&self, adapter: &str) {
        debug!("Removing outbound subscriber: {adapter}");
        self.outbound.remove(adapter);
    }

    /// Routes an outbound event to the adapter owning its channel id.
    pub async fn send_outbound(&self, event: OutboundEvent) -> Result<(), BusError> {
        let adapter = adapter_prefix(event.channel_id.as_str());
        let Some(tx) = self.outbound.get(adapter).map(|entry| entry.clone()) else {
            warn!("No outbound subscriber for channel: {}", event.channel_id);
            return Err(BusError::PublishFailed(format!(
                "no subscriber for {adapter}"
            )));
        };
        tx.send(event).await.map_err(|_| BusError::Closed)
    }

    /// Number of registered outbound subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.outbound.len()
    }
}

/// Returns the adapter prefix of a channel id string.
fn adapter_prefix(channel_id: &str) -> &str {
    match channel_id.split_once(':') {
        Some((adapter, _)) => adapter,
        None => channel_id,
    }
}

#[cfg(test)]
mod tests {
    use proto::{ChannelId, SenderId};

    use super::*;

    fn inbound(channel: &str, message: &str) -> InboundEvent {
        InboundEvent::new(ChannelId::from(channel), SenderId::from("42"), message)
    }

    #[tokio::test]
    async fn publish_delivers_to_upstream_receiver() {
        let (bus, mut rx) = MessageBus::new(4);
        bus.publish(inbound("telegram:7", "hello"))
            .await
            .expect("publish");

        let received = rx.recv().await.expect("event should arrive");
        assert_eq!(received.channel_id.as_str(), "telegram:7");
        assert_eq!(received.content, "hello");
    }

    #[tokio::test]
    async fn publish_fails_when_receiver_dropped() {
        let (bus, rx) = MessageBus::new(2);
        drop(rx);
        let err = bus
            .publish(inbound("telegram:7", "hello"))
            .await
            .expect_err("closed bus should error");
        assert!(matches!(err, BusError::Closed));
    }

    #[tokio::test]
    async fn send_outbound_routes_by_adapter_prefix() {
        let (bus, _rx) = MessageBus::new(4);
        let mut telegram_rx = bus.subscribe("telegram");
        assert_eq!(bus.subscriber_count(), 1);

        bus.send_outbound(OutboundEvent::new(ChannelId::new("telegram", "7"), "hi"))
            .await
            .expect("outbound routed");

        let event = telegram_rx.recv().await.expect("event should arrive");
        assert_eq!(event.channel_id.as_str(), "telegram:7");
        assert_eq!(event.content, "hi");
    }

    #[tokio::test]
    async fn send_outbound_without_subscriber_fails() {
        let (bus, _rx) = MessageBus::new(4);
        let err = bus
            .send_outbound(OutboundEvent::new(ChannelId::new("telegram", "7"), "hi"))
            .await
            .expect_err("missing subscriber should error");
        assert!(matches!(err, BusError::PublishFailed(_)));
    }

    #[tokio::test]
    async fn unsubscribe_removes_queue() {
        let (bus, _rx) = MessageBus::new(4);
        let _telegram_rx = bus.subscribe("telegram");
        bus.unsubscribe("telegram");
        assert_eq!(bus.subscriber_count(), 0);
    }
}
