//! Channel adapters bridging external chat platforms to the message bus.

pub mod adapter;
pub mod telegram;
pub mod transcribe;

pub use adapter::ChannelAdapter;
pub use telegram::{TelegramChannel, TelegramChannelConfig};
pub use transcribe::{Transcriber, WhisperTranscriber};
