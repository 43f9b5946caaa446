//! Common interface implemented by every channel adapter.

use std::sync::Arc;

use async_trait::async_trait;
use proto::{ChannelError, InboundEvent, OutboundEvent};
use tokio::sync::mpsc;

/// A bidirectional bridge between one chat platform and the bus.
///
/// `run` owns the inbound side (connect, poll, dispatch) and only returns
/// once the adapter has been stopped. `send` is called concurrently from
/// the outbound pump and must be safe to invoke in any lifecycle state.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Stable adapter name, used as the channel id prefix ("telegram").
    fn name(&self) -> &'static str;

    /// Runs the adapter until stopped, publishing inbound events to `tx`.
    async fn run(self: Arc<Self>, tx: mpsc::Sender<InboundEvent>) -> Result<(), ChannelError>;

    /// Delivers one outbound event to the platform.
    async fn send(&self, event: OutboundEvent) -> Result<(), ChannelError>;

    /// Requests shutdown; unblocks `run` and tears down platform state.
    async fn stop(&self);
}
