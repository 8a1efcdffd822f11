//! Telegram adapter: all teloxide usage is confined here. Live updates come in through a
//! teloxide dispatcher and are pushed to the worker's inbound queue; session negotiation and
//! channel lookup use raw Bot API calls.
//!
//! The Bot API exposes neither message history nor the account's dialog list, so the
//! directory reports no history and the backfill is skipped with a warning.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use teloxide::update_listeners;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ChannelId, Config, TelegramConfig};
use crate::error::{ConnectError, DirectoryError, TelegramApiError};
use crate::monitor::{self, MonitorState};
use crate::relay::backfill::backfill_channels;
use crate::relay::directory::{ChannelDirectory, ResolvedChannel};
use crate::relay::event::{ChatEvent, IncomingMessage, Peer};
use crate::relay::notify::SubscriptionClient;
use crate::relay::pipeline::{LinkPipeline, LiveHandler};
use crate::relay::worker::run_worker;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Per-attempt limit while establishing the session.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);
pub const REDIAL_DELAY: Duration = Duration::from_secs(5);

/// Bot API ids of channels and supergroups are `-(10^12 + id)`.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

const INBOUND_QUEUE: usize = 64;

/// Timing for session negotiation and receiver restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPolicy {
    /// Limit for one getMe attempt.
    pub timeout: Duration,
    /// Pause before the next attempt.
    pub redial_delay: Duration,
}

impl Default for DialPolicy {
    fn default() -> Self {
        Self { timeout: DIAL_TIMEOUT, redial_delay: REDIAL_DELAY }
    }
}

/// Map a Bot API chat id to the peer it addresses.
pub fn peer_from_chat_id(chat_id: i64) -> Peer {
    if chat_id > 0 {
        Peer::User(chat_id)
    } else if chat_id < -CHANNEL_ID_OFFSET {
        Peer::Channel(-chat_id - CHANNEL_ID_OFFSET)
    } else {
        Peer::Group(-chat_id)
    }
}

/// Bot API chat id of a channel.
pub fn bot_chat_id(channel: ChannelId) -> i64 {
    -(CHANNEL_ID_OFFSET + channel)
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    description: String,
}

/// The account behind the bot token (getMe).
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

impl BotIdentity {
    pub fn display_name(&self) -> String {
        self.username
            .as_ref()
            .map(|u| format!("@{}", u))
            .unwrap_or_else(|| self.first_name.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ChatInfo {
    id: i64,
    title: Option<String>,
}

/// Raw Bot API calls that teloxide's dispatcher doesn't cover.
#[derive(Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    base: String,
}

impl TelegramApi {
    /// `api_url` is the server root; `None` means the public Bot API.
    pub fn new(client: reqwest::Client, api_url: Option<&reqwest::Url>, token: &str) -> Self {
        let root = api_url.map_or(TELEGRAM_API_URL, |u| u.as_str());
        Self::with_base(client, &format!("{}/bot{}", root.trim_end_matches('/'), token))
    }

    /// `base` is everything before the method name, e.g. `https://api.telegram.org/bot<token>`.
    pub fn with_base(client: reqwest::Client, base: &str) -> Self {
        Self { client, base: base.trim_end_matches('/').to_string() }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, TelegramApiError> {
        let url = format!("{}/{}", self.base, method);
        let res = self.client.post(&url).json(&params).send().await?;
        let status = res.status();
        let body = res.text().await?;
        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|_| {
            TelegramApiError::Network(format!("{} returned status {} with invalid JSON ({} bytes)", method, status, body.len()))
        })?;
        match parsed.result {
            Some(result) if parsed.ok => Ok(result),
            _ => Err(TelegramApiError::Api {
                code: parsed.error_code,
                description: parsed.description,
            }),
        }
    }

    pub async fn get_me(&self) -> Result<BotIdentity, TelegramApiError> {
        self.call("getMe", serde_json::json!({})).await
    }

    async fn get_chat(&self, chat_id: i64) -> Result<ChatInfo, TelegramApiError> {
        self.call("getChat", serde_json::json!({ "chat_id": chat_id })).await
    }
}

/// Unauthorized (revoked token) or Not Found (malformed token). Redialing can't fix either.
fn is_refusal(e: &TelegramApiError) -> bool {
    matches!(e, TelegramApiError::Api { code: 401 | 404, .. })
}

/// Establish the session: one getMe per dial attempt, each bounded by `policy.timeout`.
/// A token refusal is final; network failures, flood waits and server errors are redialed.
pub async fn connect(
    api: &TelegramApi,
    state: &MonitorState,
    policy: &DialPolicy,
    cancel: &CancellationToken,
) -> Result<BotIdentity, ConnectError> {
    loop {
        let attempt = state.record_dial_attempt();
        info!(attempt, "connecting to Telegram");
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
            r = tokio::time::timeout(policy.timeout, api.get_me()) => r,
        };
        match result {
            Ok(Ok(me)) => {
                info!(attempt, "connected");
                return Ok(me);
            }
            Ok(Err(e)) if is_refusal(&e) => return Err(ConnectError::Rejected(e)),
            Ok(Err(e)) => warn!(attempt, error = %e, "connection failed"),
            Err(_) => warn!(attempt, timeout_secs = policy.timeout.as_secs(), "connection timed out"),
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
            _ = tokio::time::sleep(policy.redial_delay) => {}
        }
    }
}

/// Channel lookup through the Bot API. It offers no history or dialog listing.
pub struct TelegramDirectory {
    api: TelegramApi,
}

impl TelegramDirectory {
    pub fn new(api: TelegramApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ChannelDirectory for TelegramDirectory {
    fn offers_history(&self) -> bool {
        false
    }

    async fn resolve_channel(&self, id: ChannelId) -> Result<ResolvedChannel, DirectoryError> {
        match self.api.get_chat(bot_chat_id(id)).await {
            Ok(chat) => Ok(ResolvedChannel {
                id: peer_from_chat_id(chat.id).channel_id().unwrap_or(id),
                title: chat.title.unwrap_or_default(),
            }),
            Err(TelegramApiError::Api { code: 400, .. }) => Err(DirectoryError::NotFound(id)),
            Err(e) => Err(DirectoryError::Request(e.to_string())),
        }
    }

    async fn list_recent_conversations(&self, _limit: usize) -> Result<Vec<ResolvedChannel>, DirectoryError> {
        Err(DirectoryError::Unsupported("conversation list"))
    }

    async fn get_history(
        &self,
        _channel: &ResolvedChannel,
        _limit: usize,
    ) -> Result<Vec<IncomingMessage>, DirectoryError> {
        Err(DirectoryError::Unsupported("message history"))
    }
}

/// Text of a message; captions count as text. None for messages without either.
fn incoming_message(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text().or_else(|| msg.caption())?;
    Some(IncomingMessage::new(text, peer_from_chat_id(msg.chat.id.0), msg.date))
}

/// Count the update and queue it for the worker. Sending waits when the queue is full, so
/// the dispatcher never reorders or drops updates.
async fn forward(
    msg: &Message,
    wrap: fn(IncomingMessage) -> ChatEvent,
    inbound_tx: &mpsc::Sender<ChatEvent>,
    state: &MonitorState,
) {
    let n = state.record_dispatch();
    let Some(incoming) = incoming_message(msg) else {
        debug!(chat_id = msg.chat.id.0, "non-text update, ignored");
        return;
    };
    let event = wrap(incoming);
    debug!(n, kind = event.kind(), "update queued");
    if inbound_tx.send(event).await.is_err() {
        debug!("worker stopped, update dropped");
    }
}

async fn on_message(msg: Message, tx: mpsc::Sender<ChatEvent>, state: Arc<MonitorState>) -> ResponseResult<()> {
    forward(&msg, ChatEvent::NewMessage, &tx, &state).await;
    Ok(())
}

async fn on_edited_message(msg: Message, tx: mpsc::Sender<ChatEvent>, state: Arc<MonitorState>) -> ResponseResult<()> {
    forward(&msg, ChatEvent::EditedMessage, &tx, &state).await;
    Ok(())
}

async fn on_channel_post(msg: Message, tx: mpsc::Sender<ChatEvent>, state: Arc<MonitorState>) -> ResponseResult<()> {
    forward(&msg, ChatEvent::ChannelPost, &tx, &state).await;
    Ok(())
}

async fn on_edited_channel_post(msg: Message, tx: mpsc::Sender<ChatEvent>, state: Arc<MonitorState>) -> ResponseResult<()> {
    forward(&msg, ChatEvent::EditedChannelPost, &tx, &state).await;
    Ok(())
}

/// Run the receiver (long polling) until `cancel` fires. Updates are handled one at a time
/// in arrival order and pushed to `inbound_tx`.
///
/// The dispatcher checks the token with getMe and clears any webhook before it starts
/// polling. A failure there is logged and the start is retried after `policy.redial_delay`.
/// A cancel that lands before polling has started abandons the start; once polling, the
/// dispatcher is shut down and in-flight updates finish.
pub async fn run_receiver(
    bot: Bot,
    inbound_tx: mpsc::Sender<ChatEvent>,
    state: Arc<MonitorState>,
    policy: DialPolicy,
    cancel: CancellationToken,
) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_edited_message().endpoint(on_edited_message))
        .branch(Update::filter_channel_post().endpoint(on_channel_post))
        .branch(Update::filter_edited_channel_post().endpoint(on_edited_channel_post));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![inbound_tx, state.clone()])
        // one key for every update: a single sequential queue
        .distribution_function(|_| Some(()))
        .default_handler(|_| async {})
        .build();
    let shutdown = dispatcher.shutdown_token();

    loop {
        let run = async {
            let listener = update_listeners::polling_default(bot.clone()).await;
            dispatcher
                .try_dispatch_with_listener(listener, LoggingErrorHandler::with_custom_text("update listener error"))
                .await
        };
        let stop = async {
            cancel.cancelled().await;
            match shutdown.shutdown() {
                Ok(done) => done.await,
                Err(_) => debug!("receiver cancelled before polling started"),
            }
        };

        let started = tokio::select! {
            result = run => result,
            _ = stop => return,
        };
        match started {
            Ok(()) => return,
            Err(e) => {
                let attempt = state.record_dial_attempt();
                warn!(attempt, error = %e, "receiver failed to start, retrying");
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(policy.redial_delay) => {}
        }
    }
}

fn build_client(config: &TelegramConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = teloxide::net::default_reqwest_settings();
    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    builder.build()
}

fn build_bot(config: &TelegramConfig, client: reqwest::Client) -> Bot {
    let bot = Bot::with_client(&config.bot_token, client);
    match &config.api_url {
        Some(url) => bot.set_api_url(url.clone()),
        None => bot,
    }
}

/// Run the watcher: negotiate the session (with the progress reporter running), optionally
/// backfill history, then relay live updates until `cancel` fires.
///
/// A cancel during negotiation is a clean stop, not an error.
pub async fn run_telegram_watcher(
    config: &Config,
    policy: DialPolicy,
    cancel: CancellationToken,
) -> Result<(), ConnectError> {
    let client = build_client(&config.telegram)?;
    let notifier = Arc::new(SubscriptionClient::new(&config.subscription)?);
    info!(endpoint = notifier.endpoint(), "subscription service");
    let api = TelegramApi::new(client.clone(), config.telegram.api_url.as_ref(), &config.telegram.bot_token);
    let state = Arc::new(MonitorState::new());

    let negotiation = cancel.child_token();
    let progress = tokio::spawn(monitor::run_progress_reporter(state.clone(), negotiation.clone()));
    let connected = connect(&api, &state, &policy, &cancel).await;
    negotiation.cancel();
    let _ = progress.await;
    let me = match connected {
        Ok(me) => me,
        Err(ConnectError::Cancelled) => {
            info!(dial_attempts = state.dial_attempts(), "stopped before the session was established");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    info!(bot = %me.display_name(), id = me.id, "session established");

    let pipeline = Arc::new(LinkPipeline::new(config, notifier));
    let heartbeat = tokio::spawn(monitor::run_heartbeat_reporter(state.clone(), cancel.clone()));

    if config.fetch_history_enabled && !config.monitored_channels.is_empty() {
        let directory = TelegramDirectory::new(api.clone());
        info!(channels = config.monitored_channels.len(), "backfilling history");
        tokio::select! {
            _ = cancel.cancelled() => info!("backfill interrupted"),
            report = backfill_channels(&directory, &pipeline, &config.monitored_channels) => {
                if !report.skipped {
                    info!(completed = report.completed.len(), failed = report.failed.len(), "backfill finished");
                }
            }
        }
    }

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let worker = tokio::spawn(run_worker(
        inbound_rx,
        Arc::new(LiveHandler::new(pipeline)),
        cancel.clone(),
    ));

    if cancel.is_cancelled() {
        drop(inbound_tx);
    } else {
        info!("listening for new messages");
        let bot = build_bot(&config.telegram, client);
        run_receiver(bot, inbound_tx, state.clone(), policy, cancel.clone()).await;
    }

    // the receiver can also stop on its own; take the other loops down with it
    cancel.cancel();
    let _ = worker.await;
    let _ = heartbeat.await;
    info!(messages = state.dispatch_count(), "watcher stopped");
    Ok(())
}
