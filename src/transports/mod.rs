// src/transports/mod.rs
pub mod discord;
pub mod telegram;

pub use discord::DiscordTransport;
pub use telegram::TelegramTransport;
