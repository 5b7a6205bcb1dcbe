// src/ingest/providers/mod.rs
pub mod page;
pub mod telegram_bot;

pub use page::PageSource;
pub use telegram_bot::TelegramBotSource;
