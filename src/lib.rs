//! mattervote — chat-integrated polling bot.

pub mod channels;
pub mod config;
pub mod error;
pub mod poll;
pub mod store;
