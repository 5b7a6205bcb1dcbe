// src/ingest/providers/telegram_bot.rs
//! Secondary source: monitor messages forwarded into a chat the bot can read,
//! fetched through the Telegram Bot API (`getMe`, `getUpdates`).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::ExtractionError;
use crate::indicators::{SourceExtraction, SourceKind};
use crate::ingest::parse::{IndicatorParser, MonitorMessageParser};
use crate::ingest::types::IndicatorSource;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_MESSAGE_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub channel_post: Option<Message>,
}

impl Update {
    fn into_message(self) -> Option<Message> {
        self.message.or(self.channel_post)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub date: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Chat {
    /// Group title, or the person's name for private chats.
    pub fn display_title(&self) -> String {
        if let Some(t) = &self.title {
            return t.clone();
        }
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

pub struct TelegramBotSource {
    mode: Mode,
    chat_id: Option<String>,
    message_limit: u32,
    parser: MonitorMessageParser,
    bot: RwLock<Option<BotUser>>,
}

enum Mode {
    /// Raw `getUpdates` response body.
    Fixture(String),
    Http {
        client: reqwest::Client,
        api_base: String,
        token: Option<String>,
    },
}

impl TelegramBotSource {
    pub fn from_fixture(updates_json: &str, chat_id: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixture(updates_json.to_string()),
            chat_id: Some(chat_id.into()),
            message_limit: DEFAULT_MESSAGE_LIMIT,
            parser: MonitorMessageParser,
            bot: RwLock::new(None),
        }
    }

    pub fn http(
        token: Option<String>,
        chat_id: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("indicator-crosscheck/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            mode: Mode::Http {
                client,
                api_base: DEFAULT_API_BASE.to_string(),
                token: token.filter(|t| !t.trim().is_empty()),
            },
            chat_id: chat_id.filter(|c| !c.trim().is_empty()),
            message_limit: DEFAULT_MESSAGE_LIMIT,
            parser: MonitorMessageParser,
            bot: RwLock::new(None),
        })
    }

    pub fn with_message_limit(mut self, limit: u32) -> Self {
        self.message_limit = limit.clamp(1, 100);
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        if let Mode::Http { api_base, .. } = &mut self.mode {
            *api_base = base.into().trim_end_matches('/').to_string();
        }
        self
    }

    /// Bot identity once `connect` succeeded.
    pub async fn bot_user(&self) -> Option<BotUser> {
        self.bot.read().await.clone()
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExtractionError> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http {
                client,
                api_base,
                token,
            } => {
                let token = token
                    .as_deref()
                    .ok_or_else(|| ExtractionError::Config("TELEGRAM_BOT_TOKEN is required".into()))?;
                let url = format!("{api_base}/bot{token}/{method}");
                client.get(url).query(query).send().await?.text().await?
            }
        };

        let resp: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            ExtractionError::SourceUnavailable(format!("unreadable {method} response: {e}"))
        })?;
        if !resp.ok {
            return Err(ExtractionError::SourceUnavailable(format!(
                "{method} failed: {}",
                resp.description.as_deref().unwrap_or("unknown error")
            )));
        }
        resp.result
            .ok_or_else(|| ExtractionError::SourceUnavailable(format!("{method} returned no result")))
    }

    /// Most recent updates, newest first.
    async fn recent_updates(&self, limit: u32) -> Result<Vec<Update>, ExtractionError> {
        let mut updates: Vec<Update> = match &self.mode {
            Mode::Fixture(_) => self.call("getUpdates", &[]).await?,
            Mode::Http { .. } => {
                self.call(
                    "getUpdates",
                    &[
                        ("limit", limit.to_string()),
                        ("timeout", "10".to_string()),
                        ("allowed_updates", r#"["message","channel_post"]"#.to_string()),
                    ],
                )
                .await?
            }
        };
        updates.sort_by_key(|u| std::cmp::Reverse(u.update_id));
        updates.truncate(limit as usize);
        Ok(updates)
    }

    /// Messages of the configured chat, newest first.
    pub async fn messages(&self, limit: u32) -> Result<Vec<Message>, ExtractionError> {
        let chat_id = self.chat_id.as_deref().ok_or_else(|| {
            ExtractionError::Config("TELEGRAM_CHAT_ID or TELEGRAM_BITNEST_CHANNEL is required".into())
        })?;
        let messages: Vec<Message> = self
            .recent_updates(limit)
            .await?
            .into_iter()
            .filter_map(Update::into_message)
            .filter(|m| m.chat.id.to_string() == chat_id)
            .collect();
        tracing::info!(count = messages.len(), chat_id, "retrieved messages");
        Ok(messages)
    }

    /// Distinct chats seen in recent updates, in order of appearance.
    pub async fn recent_chats(&self, limit: u32) -> Result<Vec<Chat>, ExtractionError> {
        let mut chats: Vec<Chat> = Vec::new();
        for msg in self
            .recent_updates(limit)
            .await?
            .into_iter()
            .filter_map(Update::into_message)
        {
            if !chats.iter().any(|c| c.id == msg.chat.id) {
                chats.push(msg.chat);
            }
        }
        Ok(chats)
    }

    /// `getMe`: who the token belongs to. Needs no chat id.
    pub async fn identify(&self) -> Result<BotUser, ExtractionError> {
        match &self.mode {
            Mode::Fixture(_) => Ok(BotUser {
                id: 0,
                username: Some("fixture_bot".into()),
            }),
            Mode::Http { .. } => self.call::<BotUser>("getMe", &[]).await,
        }
    }

    async fn ensure_connected(&self) -> Result<(), ExtractionError> {
        if self.bot.read().await.is_some() {
            return Ok(());
        }
        self.connect().await
    }
}

#[async_trait]
impl IndicatorSource for TelegramBotSource {
    async fn extract(&self) -> Result<SourceExtraction, ExtractionError> {
        let t0 = Instant::now();
        self.ensure_connected().await?;
        let messages = self.messages(self.message_limit).await?;

        for msg in &messages {
            let Some(text) = msg.text.as_deref() else {
                continue;
            };
            let Some(mut reading) = self.parser.parse(text) else {
                continue;
            };
            reading.message_date = Utc.timestamp_opt(msg.date, 0).single().filter(|_| msg.date > 0);

            let elapsed_ms = t0.elapsed().as_millis() as u64;
            tracing::info!(
                liquidity = ?reading.liquidity,
                message_id = msg.message_id,
                extraction_time_ms = elapsed_ms,
                "telegram extraction successful"
            );
            return Ok(SourceExtraction::new(reading, elapsed_ms)
                .with_detail("source", "telegram_bot_api")
                .with_detail("chat_id", self.chat_id.clone().unwrap_or_default())
                .with_detail("message_id", msg.message_id));
        }

        Err(ExtractionError::IncompleteExtraction(format!(
            "No valid indicators found in recent messages ({} checked)",
            messages.len()
        )))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Telegram
    }

    fn name(&self) -> &'static str {
        "telegram_bot"
    }

    async fn connect(&self) -> Result<(), ExtractionError> {
        if self.chat_id.is_none() {
            return Err(ExtractionError::Config(
                "TELEGRAM_CHAT_ID or TELEGRAM_BITNEST_CHANNEL is required".into(),
            ));
        }
        let me = self.identify().await?;
        tracing::info!(bot_id = me.id, bot_username = ?me.username, "telegram bot connected");
        *self.bot.write().await = Some(me);
        Ok(())
    }

    async fn disconnect(&self) {
        if self.bot.write().await.take().is_some() {
            tracing::info!("telegram bot disconnected");
        }
    }
}
