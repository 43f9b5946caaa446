//! Thin trait over the Telegram Bot API.
//!
//! All teloxide types stay inside this module: the rest of the channel
//! works with the normalized [`IncomingMessage`] and classifies failures
//! through [`TransportError`], which keeps the connection logic testable
//! against a scripted transport.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::Bot;
use teloxide::net::Download;
use teloxide::payloads::{DeleteWebhookSetters, GetUpdatesSetters, SendMessageSetters};
use teloxide::requests::Requester;
use teloxide::types::{
    AllowedUpdate, BotCommand, ChatAction, ChatId, ChatKind, FileId, Message, ParseMode,
    UpdateKind,
};
use thiserror::Error;
use tracing::debug;

use super::connection::FailureKind;
use super::media::{MediaKind, MediaRef};

/// Transport failure, classified for retry policy and send fallback.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Another getUpdates session holds this bot token.
    #[error("session conflict: {0}")]
    Conflict(String),

    /// The platform rejected the message markup.
    #[error("markup rejected: {0}")]
    MarkupRejected(String),

    /// Anything else: network failures, timeouts, server errors.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Maps this failure onto the reconnect policy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Conflict(_) => FailureKind::Conflict,
            _ => FailureKind::Transient,
        }
    }

    /// True when a plain-text retry of the same content could succeed.
    pub fn is_markup_rejection(&self) -> bool {
        matches!(self, Self::MarkupRejected(_))
    }
}

/// The bot's own identity as reported by the platform.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

/// One long-poll update, decoded to the fields the channel uses.
#[derive(Debug, Clone)]
pub struct UpdateEnvelope {
    pub update_id: i32,
    pub message: Option<IncomingMessage>,
}

/// A platform message normalized at the transport boundary.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub is_group: bool,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Attachments present on the message, unordered.
    pub media: Vec<MediaRef>,
}

/// Platform operations the channel needs, mockable for tests.
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn get_me(&self) -> Result<BotIdentity, TransportError>;
    async fn set_commands(&self, commands: &[(&str, &str)]) -> Result<(), TransportError>;
    /// Clears any registered webhook; long polling and webhooks are
    /// mutually exclusive on the platform side.
    async fn delete_webhook(&self, drop_pending: bool) -> Result<(), TransportError>;
    async fn get_updates(
        &self,
        offset: i32,
        timeout_secs: u32,
    ) -> Result<Vec<UpdateEnvelope>, TransportError>;
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        html: bool,
    ) -> Result<(), TransportError>;
    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError>;
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<(), TransportError>;
    /// Best-effort session teardown before the handle is dropped.
    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// Builds a fresh transport for each connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<std::sync::Arc<dyn TelegramApi>, TransportError>;
}

/// Production connector backed by teloxide over rustls.
pub struct TeloxideConnector {
    token: String,
    proxy: Option<String>,
}

impl TeloxideConnector {
    pub fn new(token: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            token: token.into(),
            proxy,
        }
    }
}

#[async_trait]
impl Connector for TeloxideConnector {
    async fn connect(&self) -> Result<std::sync::Arc<dyn TelegramApi>, TransportError> {
        let transport = TeloxideTransport::new(&self.token, self.proxy.as_deref())?;
        Ok(std::sync::Arc::new(transport))
    }
}

/// [`TelegramApi`] implementation over a tuned reqwest client.
pub struct TeloxideTransport {
    bot: Bot,
}

impl TeloxideTransport {
    /// Builds the transport. The request timeout must exceed the long-poll
    /// timeout or every idle poll would surface as a network error.
    pub fn new(token: &str, proxy: Option<&str>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(45))
            .pool_idle_timeout(Duration::from_secs(90));
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| TransportError::Other(format!("invalid proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Other(format!("http client build failed: {e}")))?;
        Ok(Self {
            bot: Bot::with_client(token, client),
        })
    }
}

#[async_trait]
impl TelegramApi for TeloxideTransport {
    async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        let me = self.bot.get_me().await.map_err(classify)?;
        Ok(BotIdentity {
            id: me.user.id.0 as i64,
            username: me.user.username.clone().unwrap_or_default(),
        })
    }

    async fn set_commands(&self, commands: &[(&str, &str)]) -> Result<(), TransportError> {
        let commands: Vec<BotCommand> = commands
            .iter()
            .map(|(command, description)| BotCommand {
                command: (*command).to_string(),
                description: (*description).to_string(),
            })
            .collect();
        self.bot.set_my_commands(commands).await.map_err(classify)?;
        Ok(())
    }

    async fn delete_webhook(&self, drop_pending: bool) -> Result<(), TransportError> {
        self.bot
            .delete_webhook()
            .drop_pending_updates(drop_pending)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn get_updates(
        &self,
        offset: i32,
        timeout_secs: u32,
    ) -> Result<Vec<UpdateEnvelope>, TransportError> {
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message])
            .await
            .map_err(classify)?;

        let mut envelopes = Vec::with_capacity(updates.len());
        for update in updates {
            #[allow(clippy::cast_possible_wrap)]
            let update_id = update.id.0 as i32;
            let message = match update.kind {
                UpdateKind::Message(msg) => normalize_message(&msg),
                _ => None,
            };
            envelopes.push(UpdateEnvelope { update_id, message });
        }
        Ok(envelopes)
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        html: bool,
    ) -> Result<(), TransportError> {
        let request = self.bot.send_message(ChatId(chat_id), text);
        let request = if html {
            request.parse_mode(ParseMode::Html)
        } else {
            request
        };
        request.await.map_err(classify)?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<(), TransportError> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(classify)?;
        let mut out = tokio::fs::File::create(dest)
            .await
            .map_err(|e| TransportError::Other(format!("create {}: {e}", dest.display())))?;
        self.bot
            .download_file(&file.path, &mut out)
            .await
            .map_err(|e| TransportError::Other(format!("download failed: {e}")))?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        // Long polling holds no server-side session beyond the in-flight
        // request; dropping the handle is enough.
        debug!("Telegram transport released");
        Ok(())
    }
}

/// Decodes a platform message into the channel's normalized shape.
///
/// Messages without a sender (channel posts, service messages) are dropped
/// here.
fn normalize_message(msg: &Message) -> Option<IncomingMessage> {
    let from = msg.from.as_ref()?;
    let mut media = Vec::new();

    if let Some(photos) = msg.photo() {
        // Sizes are ordered smallest first; take the largest.
        if let Some(photo) = photos.last() {
            media.push(MediaRef {
                kind: MediaKind::Photo,
                file_id: photo.file.id.0.clone(),
                mime_type: None,
            });
        }
    }
    if let Some(voice) = msg.voice() {
        media.push(MediaRef {
            kind: MediaKind::Voice,
            file_id: voice.file.id.0.clone(),
            mime_type: voice.mime_type.as_ref().map(|m| m.to_string()),
        });
    }
    if let Some(audio) = msg.audio() {
        media.push(MediaRef {
            kind: MediaKind::Audio,
            file_id: audio.file.id.0.clone(),
            mime_type: audio.mime_type.as_ref().map(|m| m.to_string()),
        });
    }
    if let Some(document) = msg.document() {
        media.push(MediaRef {
            kind: MediaKind::Document,
            file_id: document.file.id.0.clone(),
            mime_type: document.mime_type.as_ref().map(|m| m.to_string()),
        });
    }

    #[allow(clippy::cast_possible_wrap)]
    let user_id = from.id.0 as i64;

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        user_id,
        username: from.username.clone(),
        first_name: from.first_name.clone(),
        is_group: !matches!(msg.chat.kind, ChatKind::Private(_)),
        text: msg.text().map(String::from),
        caption: msg.caption().map(String::from),
        media,
    })
}

/// Classifies a teloxide error for the retry and fallback policies.
fn classify(err: teloxide::RequestError) -> TransportError {
    use teloxide::ApiError;
    match err {
        teloxide::RequestError::Api(ApiError::TerminatedByOtherGetUpdates) => {
            TransportError::Conflict(
                "terminated by other getUpdates request; another instance is polling this token"
                    .to_string(),
            )
        }
        teloxide::RequestError::Api(ApiError::CantParseEntities(reason)) => {
            TransportError::MarkupRejected(reason)
        }
        teloxide::RequestError::Api(api) => {
            let text = api.to_string();
            let lower = text.to_ascii_lowercase();
            if lower.contains("conflict") {
                TransportError::Conflict(text)
            } else if lower.contains("can't parse") || lower.contains("parse entities") {
                TransportError::MarkupRejected(text)
            } else {
                TransportError::Other(text)
            }
        }
        other => TransportError::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_conflict_failure_kind() {
        let err = TransportError::Conflict("terminated".to_string());
        assert_eq!(err.failure_kind(), FailureKind::Conflict);
        assert!(!err.is_markup_rejection());
    }

    #[test]
    fn markup_rejection_is_transient_for_retry_policy() {
        let err = TransportError::MarkupRejected("can't parse entities".to_string());
        assert_eq!(err.failure_kind(), FailureKind::Transient);
        assert!(err.is_markup_rejection());
    }

    #[test]
    fn network_errors_are_transient() {
        let err = TransportError::Other("connection reset".to_string());
        assert_eq!(err.failure_kind(), FailureKind::Transient);
        assert!(!err.is_markup_rejection());
    }
}
