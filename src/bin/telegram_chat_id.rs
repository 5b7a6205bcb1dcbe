//! Finds the chat id to put into `TELEGRAM_CHAT_ID`.
//!
//! Add the bot to the group that relays the monitor messages, post something
//! there, then run this with `TELEGRAM_BOT_TOKEN` set.

use std::time::Duration;

use anyhow::{bail, Context};
use indicator_crosscheck::TelegramBotSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let Some(token) = std::env::var("TELEGRAM_BOT_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
    else {
        bail!("TELEGRAM_BOT_TOKEN is not set (create a bot with @BotFather first)");
    };

    let bot = TelegramBotSource::http(Some(token), None, Duration::from_secs(30))?;
    let me = bot.identify().await.context("getMe failed")?;
    let username = me.username.unwrap_or_default();
    println!("Bot connected: @{username} (id {})", me.id);

    let chats = bot.recent_chats(10).await.context("getUpdates failed")?;
    if chats.is_empty() {
        println!("No messages found.");
        println!("  1. Add @{username} to the group and make it an admin");
        println!("  2. Send a message in the group");
        println!("  3. Run this again");
        return Ok(());
    }

    for (i, chat) in chats.iter().enumerate() {
        println!("Chat {}:", i + 1);
        println!("  ID:    {}", chat.id);
        println!("  Type:  {}", chat.kind);
        println!("  Title: {}", chat.display_title());
        if let Some(u) = &chat.username {
            println!("  Username: @{u}");
        }
    }
    println!();
    println!("TELEGRAM_CHAT_ID={}", chats[0].id);
    Ok(())
}
