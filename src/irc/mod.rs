//! IRC protocol layer: wire messages, command parsing, and connection management.

pub mod casemap;
pub mod codec;
pub mod commands;
pub mod connection;
pub mod manager;
pub mod message;
pub mod numeric;

pub use message::{is_middle_param, Message, Outbound, ParseError, Prefix};

/// Whether a target names a channel rather than a user.
pub fn is_channel_name(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}
