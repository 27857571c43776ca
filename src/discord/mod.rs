//! Discord bot integration.
//!
//! `client` keeps the gateway connection and routes inbound messages;
//! `transport` is what the bridge workers use to talk back.

pub mod client;
pub mod transport;

pub use client::DiscordBot;
