use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::platforms::PlatformConnection;
use crate::types::{Attachment, ChatMessage, CommandInvocation, CommandOption, CommandReply, Embed, PlatformEvent};

// Type aliases for cleaner code
type WebSocketWriter = Arc<RwLock<futures_util::stream::SplitSink<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, Message>>>;

const API_BASE: &str = "https://discord.com/api/v10";
const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

// GUILDS | GUILD_MEMBERS | GUILD_MESSAGES | MESSAGE_CONTENT
const INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 9) | (1 << 15);

const MODERATE_MEMBERS: u64 = 1 << 40;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INTERACTION_APPLICATION_COMMAND: u8 = 2;
const CALLBACK_CHANNEL_MESSAGE: u8 = 4;
const FLAG_EPHEMERAL: u64 = 1 << 6;

/// Gateway payload envelope
#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelloData {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct ReadyData {
    user: DiscordUser,
    application: PartialApplication,
}

#[derive(Debug, Deserialize)]
struct PartialApplication {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    id: String,
    channel_id: String,
    guild_id: Option<String>,
    author: DiscordUser,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<DiscordAttachment>,
    webhook_id: Option<String>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordAttachment {
    url: String,
    filename: String,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InteractionCreate {
    id: String,
    token: String,
    #[serde(rename = "type")]
    kind: u8,
    guild_id: Option<String>,
    channel_id: Option<String>,
    member: Option<InteractionMember>,
    user: Option<DiscordUser>,
    data: Option<InteractionData>,
}

#[derive(Debug, Deserialize)]
struct InteractionMember {
    user: DiscordUser,
}

#[derive(Debug, Deserialize)]
struct InteractionData {
    name: String,
    #[serde(default)]
    options: Vec<InteractionOption>,
}

#[derive(Debug, Deserialize)]
struct InteractionOption {
    name: String,
    value: Option<Value>,
}

/// Configuration for the Discord connection
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: String,
    /// Register slash commands in this guild only (faster propagation)
    pub guild_id: Option<String>,
    /// "Playing ..." presence text
    pub activity: Option<String>,
}

impl DiscordConfig {
    /// Load Discord configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let token = env::var("DISCORD_TOKEN")
            .context("DISCORD_TOKEN environment variable not set")?;

        let token = token.trim().trim_start_matches("Bot ").to_string();
        if token.is_empty() {
            return Err(anyhow::anyhow!("DISCORD_TOKEN is empty"));
        }

        let guild_id = env::var("DISCORD_GUILD_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if let Some(ref guild) = guild_id {
            info!("Slash commands will be registered in guild {}", guild);
        }

        Ok(Self {
            token,
            guild_id,
            activity: None,
        })
    }

    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        let activity = activity.into();
        self.activity = if activity.is_empty() { None } else { Some(activity) };
        self
    }
}

/// State shared between the connection and its gateway tasks
#[derive(Clone)]
struct GatewayContext {
    http: reqwest::Client,
    config: DiscordConfig,
    events: broadcast::Sender<PlatformEvent>,
    application_id: Arc<RwLock<Option<String>>>,
}

/// Discord gateway + REST connection
pub struct DiscordConnection {
    config: DiscordConfig,
    http: reqwest::Client,
    event_sender: Option<broadcast::Sender<PlatformEvent>>,
    websocket_writer: Option<WebSocketWriter>,
    is_connected: Arc<RwLock<bool>>,
    application_id: Arc<RwLock<Option<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DiscordConnection {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            event_sender: None,
            websocket_writer: None,
            is_connected: Arc::new(RwLock::new(false)),
            application_id: Arc::new(RwLock::new(None)),
            tasks: Vec::new(),
        }
    }

    fn identify_payload(config: &DiscordConfig) -> Value {
        let presence = config.activity.as_ref().map(|activity| {
            json!({
                "since": null,
                "activities": [{ "name": activity, "type": 0 }],
                "status": "online",
                "afk": false
            })
        });

        let mut data = json!({
            "token": config.token,
            "intents": INTENTS,
            "properties": {
                "os": env::consts::OS,
                "browser": "modwarden",
                "device": "modwarden"
            }
        });
        if let Some(presence) = presence {
            data["presence"] = presence;
        }

        json!({ "op": OP_IDENTIFY, "d": data })
    }

    fn heartbeat_payload(sequence: &AtomicU64) -> String {
        let seq = sequence.load(Ordering::Relaxed);
        let d = if seq == 0 { Value::Null } else { json!(seq) };
        json!({ "op": OP_HEARTBEAT, "d": d }).to_string()
    }

    /// Slash command definitions for the bot's four admin commands
    fn command_definitions() -> Value {
        let moderators = MODERATE_MEMBERS.to_string();
        json!([
            {
                "name": "warnings",
                "description": "Show a user's warning points",
                "options": [
                    { "type": 6, "name": "user", "description": "User to check", "required": false }
                ]
            },
            {
                "name": "resetwarnings",
                "description": "Reset a user's warning points",
                "default_member_permissions": moderators,
                "options": [
                    { "type": 6, "name": "user", "description": "User to reset", "required": false }
                ]
            },
            {
                "name": "announce",
                "description": "Post an announcement in this channel",
                "default_member_permissions": moderators,
                "options": [
                    { "type": 3, "name": "title", "description": "Announcement title", "required": true },
                    { "type": 3, "name": "content", "description": "Announcement text", "required": true }
                ]
            },
            {
                "name": "topviolators",
                "description": "List the users with the most warning points"
            }
        ])
    }

    async fn register_commands(ctx: &GatewayContext, application_id: &str) -> Result<()> {
        let path = match ctx.config.guild_id {
            Some(ref guild) => format!("/applications/{}/guilds/{}/commands", application_id, guild),
            None => format!("/applications/{}/commands", application_id),
        };

        api_request(&ctx.http, &ctx.config.token, reqwest::Method::PUT, &path, Some(Self::command_definitions()), None)
            .await
            .context("Failed to register slash commands")?;

        info!("Registered slash commands for application {}", application_id);
        Ok(())
    }

    async fn handle_dispatch(ctx: &GatewayContext, event_type: &str, data: Value) {
        match event_type {
            "READY" => match serde_json::from_value::<ReadyData>(data) {
                Ok(ready) => {
                    info!("Logged in as {} ({})", ready.user.username, ready.user.id);
                    *ctx.application_id.write().await = Some(ready.application.id.clone());
                    if let Err(e) = Self::register_commands(ctx, &ready.application.id).await {
                        error!("{:#}", e);
                    }
                }
                Err(e) => error!("Malformed READY payload: {}", e),
            },
            "MESSAGE_CREATE" => {
                if let Some(message) = parse_message_create(data) {
                    debug!("Message from {} in {}: {}", message.username, message.channel_id, message.content);
                    if let Err(e) = ctx.events.send(PlatformEvent::Message(message)) {
                        warn!("Failed to broadcast message: {}", e);
                    }
                }
            }
            "INTERACTION_CREATE" => {
                if let Some(invocation) = parse_interaction(data) {
                    debug!("Command /{} from {}", invocation.name, invocation.invoker_id);
                    if let Err(e) = ctx.events.send(PlatformEvent::Command(invocation)) {
                        warn!("Failed to broadcast command: {}", e);
                    }
                }
            }
            other => debug!("Ignoring dispatch {}", other),
        }
    }
}

/// Convert a MESSAGE_CREATE payload. Webhook posts count as automated.
fn parse_message_create(data: Value) -> Option<ChatMessage> {
    let raw: MessageCreate = match serde_json::from_value(data) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Could not parse MESSAGE_CREATE: {}", e);
            return None;
        }
    };

    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now);

    Some(ChatMessage {
        platform: "discord".to_string(),
        message_id: raw.id,
        channel_id: raw.channel_id,
        guild_id: raw.guild_id,
        user_id: raw.author.id,
        username: raw.author.username,
        is_bot: raw.author.bot || raw.webhook_id.is_some(),
        content: raw.content,
        attachments: raw
            .attachments
            .into_iter()
            .map(|a| Attachment {
                url: a.url,
                filename: a.filename,
                content_type: a.content_type,
            })
            .collect(),
        timestamp,
    })
}

/// Convert an INTERACTION_CREATE payload; only application commands are kept
fn parse_interaction(data: Value) -> Option<CommandInvocation> {
    let raw: InteractionCreate = match serde_json::from_value(data) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Could not parse INTERACTION_CREATE: {}", e);
            return None;
        }
    };

    if raw.kind != INTERACTION_APPLICATION_COMMAND {
        return None;
    }

    let invoker = raw.member.map(|m| m.user).or(raw.user)?;
    let data = raw.data?;

    let options = data
        .options
        .into_iter()
        .filter_map(|o| {
            let value = match o.value? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some(CommandOption { name: o.name, value })
        })
        .collect();

    Some(CommandInvocation {
        interaction_id: raw.id,
        interaction_token: raw.token,
        name: data.name,
        channel_id: raw.channel_id.unwrap_or_default(),
        guild_id: raw.guild_id,
        invoker_id: invoker.id,
        options,
    })
}

/// Issue a REST call and turn non-success statuses into errors
async fn api_request(
    http: &reqwest::Client,
    token: &str,
    method: reqwest::Method,
    path: &str,
    body: Option<Value>,
    audit_reason: Option<&str>,
) -> Result<()> {
    let url = format!("{}{}", API_BASE, path);
    let mut request = http
        .request(method.clone(), &url)
        .header("Authorization", format!("Bot {}", token));

    if let Some(reason) = audit_reason {
        request = request.header("X-Audit-Log-Reason", urlencoding::encode(reason).into_owned());
    }
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("{} {} failed", method, path))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("{} {} returned {}: {}", method, path, status, text));
    }

    Ok(())
}

#[async_trait]
impl PlatformConnection for DiscordConnection {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Discord gateway...");

        let (ws_stream, _) = connect_async(GATEWAY_URL)
            .await
            .context("Failed to connect to Discord gateway")?;

        let (write, mut read) = ws_stream.split();

        // The gateway opens with HELLO carrying the heartbeat interval
        let hello = match read.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<GatewayPayload>(&text)
                .context("Malformed HELLO payload")?,
            Some(Ok(other)) => return Err(anyhow::anyhow!("Unexpected first gateway frame: {:?}", other)),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(anyhow::anyhow!("Gateway closed before HELLO")),
        };
        if hello.op != OP_HELLO {
            return Err(anyhow::anyhow!("Expected HELLO (op 10), got op {}", hello.op));
        }
        let hello: HelloData = serde_json::from_value(hello.d).context("Malformed HELLO data")?;
        let heartbeat_interval = Duration::from_millis(hello.heartbeat_interval);
        debug!("Gateway heartbeat interval: {:?}", heartbeat_interval);

        let writer_arc = Arc::new(RwLock::new(write));
        self.websocket_writer = Some(Arc::clone(&writer_arc));

        writer_arc.write().await.send(Message::Text(Self::identify_payload(&self.config).to_string())).await
            .context("Failed to send IDENTIFY")?;

        // Set up event broadcasting
        let (tx, _) = broadcast::channel(1000);
        self.event_sender = Some(tx.clone());

        *self.is_connected.write().await = true;

        let sequence = Arc::new(AtomicU64::new(0));

        // Heartbeat task
        let heartbeat = {
            let writer = Arc::clone(&writer_arc);
            let sequence = Arc::clone(&sequence);
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + heartbeat_interval;
                let mut interval = tokio::time::interval_at(start, heartbeat_interval);
                loop {
                    interval.tick().await;
                    let payload = Self::heartbeat_payload(&sequence);
                    if let Err(e) = writer.write().await.send(Message::Text(payload)).await {
                        error!("Failed to send heartbeat: {}", e);
                        break;
                    }
                    debug!("Heartbeat sent");
                }
            })
        };

        // Reader task
        let reader = {
            let ctx = GatewayContext {
                http: self.http.clone(),
                config: self.config.clone(),
                events: tx,
                application_id: Arc::clone(&self.application_id),
            };
            let writer = Arc::clone(&writer_arc);
            let is_connected = Arc::clone(&self.is_connected);

            tokio::spawn(async move {
                info!("Discord gateway reader started");

                loop {
                    match read.next().await {
                        Some(Ok(Message::Text(text))) => {
                            let payload: GatewayPayload = match serde_json::from_str(&text) {
                                Ok(payload) => payload,
                                Err(e) => {
                                    warn!("Unparseable gateway frame: {}", e);
                                    continue;
                                }
                            };

                            if let Some(seq) = payload.s {
                                sequence.store(seq, Ordering::Relaxed);
                            }

                            match payload.op {
                                OP_DISPATCH => {
                                    if let Some(event_type) = payload.t.as_deref() {
                                        Self::handle_dispatch(&ctx, event_type, payload.d).await;
                                    }
                                }
                                OP_HEARTBEAT => {
                                    debug!("Gateway requested a heartbeat");
                                    let beat = Self::heartbeat_payload(&sequence);
                                    if let Err(e) = writer.write().await.send(Message::Text(beat)).await {
                                        error!("Failed to send heartbeat: {}", e);
                                    }
                                }
                                OP_HEARTBEAT_ACK => {
                                    debug!("Heartbeat acknowledged");
                                }
                                OP_RECONNECT | OP_INVALID_SESSION => {
                                    warn!("Gateway asked us to reconnect (op {})", payload.op);
                                    break;
                                }
                                other => debug!("Ignoring gateway op {}", other),
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(e) = writer.write().await.send(Message::Pong(payload)).await {
                                error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(close_frame))) => {
                            info!("Gateway connection closed: {:?}", close_frame);
                            break;
                        }
                        Some(Ok(_)) => {
                            debug!("Received non-text gateway frame (ignoring)");
                        }
                        Some(Err(e)) => {
                            error!("Gateway error: {}", e);
                            break;
                        }
                        None => {
                            warn!("Gateway stream ended");
                            break;
                        }
                    }
                }

                *is_connected.write().await = false;
                warn!("Discord gateway reader exited");
            })
        };

        self.tasks = vec![heartbeat, reader];

        info!("Connected to Discord gateway");
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, content: &str, reply_to: Option<&str>) -> Result<()> {
        let mut body = json!({ "content": content });
        if let Some(message_id) = reply_to {
            body["message_reference"] = json!({ "message_id": message_id, "fail_if_not_exists": false });
        }

        let path = format!("/channels/{}/messages", channel_id);
        api_request(&self.http, &self.config.token, reqwest::Method::POST, &path, Some(body), None).await?;
        debug!("Sent message to {}: {}", channel_id, content);
        Ok(())
    }

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()> {
        let body = json!({ "embeds": [embed] });
        let path = format!("/channels/{}/messages", channel_id);
        api_request(&self.http, &self.config.token, reqwest::Method::POST, &path, Some(body), None).await?;
        debug!("Sent embed '{}' to {}", embed.title, channel_id);
        Ok(())
    }

    async fn reply_to_command(&self, interaction_id: &str, interaction_token: &str, reply: &CommandReply) -> Result<()> {
        let data = match reply {
            CommandReply::Text { content, ephemeral } => {
                let mut data = json!({ "content": content });
                if *ephemeral {
                    data["flags"] = json!(FLAG_EPHEMERAL);
                }
                data
            }
            CommandReply::Embed(embed) => json!({ "embeds": [embed] }),
        };

        let body = json!({ "type": CALLBACK_CHANNEL_MESSAGE, "data": data });
        let path = format!("/interactions/{}/{}/callback", interaction_id, interaction_token);
        api_request(&self.http, &self.config.token, reqwest::Method::POST, &path, Some(body), None).await
    }

    async fn timeout_member(&self, guild_id: &str, user_id: &str, duration: Duration, reason: &str) -> Result<()> {
        let until = chrono::Utc::now() + chrono::Duration::from_std(duration)?;
        let body = json!({ "communication_disabled_until": until.to_rfc3339() });
        let path = format!("/guilds/{}/members/{}", guild_id, user_id);

        api_request(&self.http, &self.config.token, reqwest::Method::PATCH, &path, Some(body), Some(reason))
            .await
            .with_context(|| format!("Failed to time out {} in {}", user_id, guild_id))?;
        info!("Timed out {} until {} ({})", user_id, until, reason);
        Ok(())
    }

    async fn ban_member(&self, guild_id: &str, user_id: &str, reason: &str) -> Result<()> {
        let body = json!({ "delete_message_seconds": 0 });
        let path = format!("/guilds/{}/bans/{}", guild_id, user_id);

        api_request(&self.http, &self.config.token, reqwest::Method::PUT, &path, Some(body), Some(reason))
            .await
            .with_context(|| format!("Failed to ban {} from {}", user_id, guild_id))?;
        info!("Banned {} from {} ({})", user_id, guild_id, reason);
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "discord"
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    fn get_event_receiver(&self) -> Option<broadcast::Receiver<PlatformEvent>> {
        self.event_sender.as_ref().map(|sender| sender.subscribe())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(writer) = self.websocket_writer.take() {
            if let Err(e) = writer.write().await.close().await {
                debug!("Error closing gateway socket: {}", e);
            }
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        *self.is_connected.write().await = false;
        self.event_sender = None;
        info!("Disconnected from Discord");
        Ok(())
    }
}
