//! Shared protocol types for channel adapters and the message bus.
//!
//! This crate defines the serializable inbound/outbound event structures
//! and strongly-typed error enums shared across the workspace.

pub mod error;
pub mod event;
pub mod ident;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of inbound/outbound event types.
pub use event::{InboundEvent, OutboundEvent, OutboundIntent};
/// Re-export of channel/sender identity types.
pub use ident::{ChannelId, SenderId};
