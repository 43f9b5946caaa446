//! Telegram channel adapter.
//!
//! Bridges Telegram long polling to the bus. The inbound side runs a
//! connect/poll/recover state machine that survives session conflicts and
//! network failures; the outbound side renders markup to Telegram HTML,
//! splits long replies, and degrades to plain text when the platform
//! rejects the markup.

pub mod chunk;
pub mod connection;
pub mod media;
pub mod render;
pub mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use proto::{ChannelError, ChannelId, InboundEvent, OutboundEvent, OutboundIntent, SenderId};
use serde_json::json;
use tokio::sync::{Notify, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapter::ChannelAdapter;
use crate::transcribe::Transcriber;
use chunk::{MESSAGE_LIMIT, split_message};
use connection::{RetryState, backoff_delay};
use media::{MediaRef, media_path, pick_media};
use render::render_markup;
use transport::{Connector, IncomingMessage, TelegramApi, TeloxideConnector, TransportError};

/// Channel id prefix for this adapter.
pub const ADAPTER_NAME: &str = "telegram";

/// Telegram keeps the composing indicator for about five seconds, so it is
/// refreshed a little more often than that.
const TYPING_INTERVAL: Duration = Duration::from_secs(4);

/// How long `stop` waits for teardown before giving up.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Long-poll timeout passed to getUpdates.
const DEFAULT_POLL_TIMEOUT_SECS: u32 = 30;

/// Command menu registered with the platform on every connect.
const BOT_COMMANDS: [(&str, &str); 3] = [
    ("start", "Start the bot"),
    ("new", "Start a new conversation"),
    ("help", "Show available commands"),
];

/// Settings for one Telegram bot connection.
#[derive(Debug, Clone)]
pub struct TelegramChannelConfig {
    /// Bot API token.
    pub token: String,
    /// Optional HTTP(S) proxy url for all API traffic.
    pub proxy: Option<String>,
    /// Directory where attachments are downloaded.
    pub media_dir: PathBuf,
    /// getUpdates long-poll timeout in seconds.
    pub poll_timeout_secs: u32,
}

impl TelegramChannelConfig {
    pub fn new(token: impl Into<String>, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            token: token.into(),
            proxy: None,
            media_dir: media_dir.into(),
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }
}

/// The Telegram adapter. Create once, wrap in an `Arc`, then drive `run`
/// from its own task while `send` is fed from the outbound pump.
pub struct TelegramChannel {
    config: TelegramChannelConfig,
    connector: Box<dyn Connector>,
    transcriber: Option<Arc<dyn Transcriber>>,
    running: AtomicBool,
    /// Shared with typing tasks so they stop when the transport goes away.
    ready: Arc<AtomicBool>,
    stop_signal: Notify,
    api: RwLock<Option<Arc<dyn TelegramApi>>>,
    /// chat id -> typing refresh task; at most one per chat.
    typing: DashMap<i64, JoinHandle<()>>,
    /// sender identity -> last seen chat id, for proactive delivery.
    chats: DashMap<String, i64>,
}

impl TelegramChannel {
    pub fn new(config: TelegramChannelConfig) -> Self {
        let connector = Box::new(TeloxideConnector::new(
            config.token.clone(),
            config.proxy.clone(),
        ));
        Self::with_connector(config, connector)
    }

    fn with_connector(config: TelegramChannelConfig, connector: Box<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            transcriber: None,
            running: AtomicBool::new(false),
            ready: Arc::new(AtomicBool::new(false)),
            stop_signal: Notify::new(),
            api: RwLock::new(None),
            typing: DashMap::new(),
            chats: DashMap::new(),
        }
    }

    /// Enables voice/audio transcription for inbound media.
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// True while the poll loop has a live connection.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Last chat id seen for a sender, if any.
    pub fn chat_for_sender(&self, sender: &SenderId) -> Option<i64> {
        self.chats.get(sender.as_str()).map(|entry| *entry)
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One connect-and-poll session. Returns `Ok` only when stop was
    /// requested; any error aborts the session for the retry loop.
    async fn poll_session(
        self: Arc<Self>,
        tx: &mpsc::Sender<InboundEvent>,
        retry: &mut RetryState,
    ) -> Result<(), TransportError> {
        debug!("Connecting to Telegram");
        let api = self.connector.connect().await?;
        let me = api.get_me().await?;
        info!("Telegram connected as @{}", me.username);

        if let Err(e) = api.set_commands(&BOT_COMMANDS).await {
            warn!("Failed to register command menu: {e}");
        }
        // Polling and webhooks are mutually exclusive; also drops updates
        // queued while no instance was polling.
        if let Err(e) = api.delete_webhook(true).await {
            debug!("Webhook cleanup failed: {e}");
        }

        *self.api.write().await = Some(Arc::clone(&api));
        self.ready.store(true, Ordering::SeqCst);
        info!("Telegram polling started");

        let mut offset = 0i32;
        loop {
            if !self.running() {
                return Ok(());
            }
            let poll = api.get_updates(offset, self.config.poll_timeout_secs);
            let updates = tokio::select! {
                _ = self.stop_signal.notified() => return Ok(()),
                result = poll => result?,
            };
            retry.record_success();
            for envelope in updates {
                offset = offset.max(envelope.update_id + 1);
                if let Some(message) = envelope.message {
                    Arc::clone(&self).dispatch(&api, tx, message).await;
                }
            }
        }
    }

    /// Routes one inbound message: records the chat, answers /start
    /// locally, starts the typing indicator, and hands the rest to a
    /// background task so slow media work never stalls the poll loop.
    async fn dispatch(
        self: Arc<Self>,
        api: &Arc<dyn TelegramApi>,
        tx: &mpsc::Sender<InboundEvent>,
        message: IncomingMessage,
    ) {
        let sender_id = SenderId::composite(message.user_id, message.username.as_deref());
        self.chats.insert(sender_id.as_str().to_string(), message.chat_id);

        if message.text.as_deref().is_some_and(is_start_command) {
            let greeting = format!(
                "\u{1F44B} Hi {}! Send me a message and I'll respond.\nType /help to see available commands.",
                message.first_name
            );
            if let Err(e) = api.send_message(message.chat_id, &greeting, false).await {
                warn!("Failed to send greeting to {}: {e}", message.chat_id);
            }
            return;
        }

        self.start_typing(api, message.chat_id);

        let this = self;
        let api = Arc::clone(api);
        let tx = tx.clone();
        tokio::spawn(async move {
            let event = this.build_inbound(api.as_ref(), message).await;
            if tx.send(event).await.is_err() {
                warn!("Inbound queue closed; dropping message");
            }
        });
    }

    /// Builds the inbound event: text, caption, media annotation, metadata.
    /// Messages with nothing to forward carry a placeholder so upstream
    /// still sees (and replies to) them.
    async fn build_inbound(
        &self,
        api: &dyn TelegramApi,
        message: IncomingMessage,
    ) -> InboundEvent {
        let mut parts: Vec<String> = Vec::new();
        if let Some(text) = &message.text {
            if !text.is_empty() {
                parts.push(text.clone());
            }
        }
        if let Some(caption) = &message.caption {
            if !caption.is_empty() {
                parts.push(caption.clone());
            }
        }

        let mut paths = Vec::new();
        if let Some(media) = pick_media(&message.media) {
            let (path, annotation) = self.process_media(api, media).await;
            if let Some(path) = path {
                paths.push(path);
            }
            parts.push(annotation);
        }

        if parts.is_empty() {
            debug!("Message {} has no text or media", message.message_id);
            parts.push("[empty message]".to_string());
        }

        let sender_id = SenderId::composite(message.user_id, message.username.as_deref());
        InboundEvent::new(
            ChannelId::new(ADAPTER_NAME, &message.chat_id.to_string()),
            sender_id,
            parts.join("\n"),
        )
        .with_media(paths)
        .with_metadata(json!({
            "message_id": message.message_id,
            "user_id": message.user_id,
            "username": message.username,
            "first_name": message.first_name,
            "is_group": message.is_group,
        }))
    }

    /// Downloads one attachment and builds its content annotation.
    /// Failures degrade to an annotation; they never drop the message.
    async fn process_media(
        &self,
        api: &dyn TelegramApi,
        media: &MediaRef,
    ) -> (Option<PathBuf>, String) {
        let label = media.kind.label();
        if let Err(e) = tokio::fs::create_dir_all(&self.config.media_dir).await {
            warn!(
                "Cannot create media dir {}: {e}",
                self.config.media_dir.display()
            );
            return (None, format!("[{label}: download failed]"));
        }

        let dest = media_path(&self.config.media_dir, media);
        if let Err(e) = api.download_file(&media.file_id, &dest).await {
            warn!("Failed to download {label} {}: {e}", media.file_id);
            return (None, format!("[{label}: download failed]"));
        }

        if media.kind.is_audio() {
            if let Some(transcriber) = &self.transcriber {
                match transcriber.transcribe(&dest).await {
                    Ok(Some(text)) => return (Some(dest), format!("[transcription: {text}]")),
                    Ok(None) => debug!("Empty transcription for {}", dest.display()),
                    Err(e) => warn!("Transcription failed for {}: {e}", dest.display()),
                }
            }
        }

        let annotation = format!("[{label}: {}]", dest.display());
        (Some(dest), annotation)
    }

    /// Sends one chunk with the markup fallback ladder: HTML, then plain
    /// text, then a fixed failure notice. Only a markup rejection opens
    /// the ladder; other errors propagate to the caller.
    async fn send_chunk(
        &self,
        api: &dyn TelegramApi,
        chat_id: i64,
        text: &str,
        n: usize,
        total: usize,
    ) -> Result<(), ChannelError> {
        match api.send_message(chat_id, text, true).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_markup_rejection() => {
                warn!("Markup rejected for chunk {n}/{total}: {err}; retrying as plain text");
                match api.send_message(chat_id, text, false).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        error!("Plain-text retry failed for chunk {n}/{total}: {err}");
                        let notice = format!(
                            "\u{26A0} Failed to send message (chunk {n}/{total}). \
                             The content could not be delivered."
                        );
                        if let Err(e) = api.send_message(chat_id, &notice, false).await {
                            error!("Failure notice not delivered to {chat_id}: {e}");
                        }
                        Ok(())
                    }
                }
            }
            Err(err) => Err(send_error(err)),
        }
    }

    fn start_typing(&self, api: &Arc<dyn TelegramApi>, chat_id: i64) {
        if let Some((_, old)) = self.typing.remove(&chat_id) {
            old.abort();
        }
        let api = Arc::clone(api);
        let ready = Arc::clone(&self.ready);
        let handle = tokio::spawn(async move {
            // The api handle is only valid while the channel is ready;
            // teardown also aborts this task, this check covers the gap.
            while ready.load(Ordering::SeqCst) {
                if let Err(e) = api.send_typing(chat_id).await {
                    debug!("Typing indicator stopped for {chat_id}: {e}");
                    break;
                }
                tokio::time::sleep(TYPING_INTERVAL).await;
            }
        });
        self.typing.insert(chat_id, handle);
    }

    fn stop_typing(&self, chat_id: i64) {
        if let Some((_, handle)) = self.typing.remove(&chat_id) {
            handle.abort();
        }
    }

    fn stop_all_typing(&self) {
        let chats: Vec<i64> = self.typing.iter().map(|entry| *entry.key()).collect();
        for chat_id in chats {
            self.stop_typing(chat_id);
        }
    }

    /// Releases the transport. Cleanup errors are logged and swallowed;
    /// teardown must always complete. Typing tasks hold a reference to
    /// the transport and die with it.
    async fn teardown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.stop_all_typing();
        let api = self.api.write().await.take();
        if let Some(api) = api {
            if let Err(e) = api.shutdown().await {
                debug!("Transport cleanup error (ignored): {e}");
            }
        }
    }

    /// Sleeps for `delay` unless stop arrives first. Returns true when the
    /// loop should exit.
    async fn interruptible_sleep(&self, delay: Duration) -> bool {
        let notified = self.stop_signal.notified();
        tokio::pin!(notified);
        if !self.running() {
            return true;
        }
        tokio::select! {
            _ = &mut notified => true,
            _ = tokio::time::sleep(delay) => !self.running(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    /// Runs the connect/poll/recover loop until stopped.
    ///
    /// Every failed session is fully torn down before the backoff sleep,
    /// and the sleep itself is interruptible so stop never waits out a
    /// ten-minute conflict delay.
    async fn run(self: Arc<Self>, tx: mpsc::Sender<InboundEvent>) -> Result<(), ChannelError> {
        if self.config.token.trim().is_empty() {
            return Err(ChannelError::NotConfigured(
                "telegram bot token is empty".to_string(),
            ));
        }
        self.running.store(true, Ordering::SeqCst);
        info!("Starting Telegram channel");

        let mut retry = RetryState::new();
        while self.running() {
            match Arc::clone(&self).poll_session(&tx, &mut retry).await {
                Ok(()) => break,
                Err(err) => {
                    let kind = err.failure_kind();
                    self.teardown().await;
                    if !self.running() {
                        break;
                    }
                    let attempt = retry.record_failure();
                    let delay = backoff_delay(kind, attempt);
                    match kind {
                        connection::FailureKind::Conflict => warn!(
                            "Polling conflict (attempt {attempt}): {err}; another instance \
                             holds this token, retrying in {}s",
                            delay.as_secs()
                        ),
                        connection::FailureKind::Transient => warn!(
                            "Polling failed (attempt {attempt}): {err}; retrying in {}s",
                            delay.as_secs()
                        ),
                    }
                    if self.interruptible_sleep(delay).await {
                        break;
                    }
                }
            }
        }

        self.stop_all_typing();
        self.teardown().await;
        info!("Telegram channel stopped");
        Ok(())
    }

    /// Delivers one outbound event: stops the typing indicator, renders
    /// the content, splits it, and sends every chunk. A chunk failure is
    /// reported but does not abort the remaining chunks.
    async fn send(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        let Ok(chat_id) = event.channel_id.local_part().parse::<i64>() else {
            return Err(ChannelError::SendFailed(format!(
                "invalid chat id in {}",
                event.channel_id
            )));
        };

        self.stop_typing(chat_id);
        if event.intent == OutboundIntent::StopTyping {
            return Ok(());
        }

        if !self.is_ready() {
            warn!("Dropping outbound message to {chat_id}: channel not ready");
            return Ok(());
        }
        let api = self.api.read().await.clone();
        let Some(api) = api else {
            warn!("Dropping outbound message to {chat_id}: no active transport");
            return Ok(());
        };

        let html = render_markup(&event.content);
        let chunks = split_message(&html, MESSAGE_LIMIT);
        let total = chunks.len();
        if total > 1 {
            info!("Splitting long reply into {total} chunks for chat {chat_id}");
        }

        let mut first_err = None;
        for (n, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.send_chunk(api.as_ref(), chat_id, chunk, n + 1, total).await {
                error!("Failed to send chunk {}/{total} to {chat_id}: {e}", n + 1);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    async fn stop(&self) {
        info!("Stopping Telegram channel");
        self.running.store(false, Ordering::SeqCst);
        self.stop_signal.notify_waiters();
        self.stop_all_typing();
        if tokio::time::timeout(STOP_GRACE, self.teardown())
            .await
            .is_err()
        {
            warn!("Teardown did not finish within {}s", STOP_GRACE.as_secs());
        }
    }
}

/// True for the `/start` command token itself: bare, with arguments, or
/// with a `@botname` suffix. `/startfoo` is an ordinary message.
fn is_start_command(text: &str) -> bool {
    match text.strip_prefix("/start") {
        Some(rest) => {
            rest.is_empty() || rest.starts_with('@') || rest.starts_with(char::is_whitespace)
        }
        None => false,
    }
}

/// Maps a transport failure onto the channel error surface for `send`.
fn send_error(err: TransportError) -> ChannelError {
    match err {
        TransportError::Conflict(reason) => ChannelError::Conflict(reason),
        TransportError::MarkupRejected(reason) => ChannelError::MarkupRejected(reason),
        TransportError::Other(reason) => ChannelError::SendFailed(reason),
    }
}
