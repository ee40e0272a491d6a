//! Client-side engine for IRC: wire messages, user command interpretation,
//! connection lifecycle, and per-server sessions that multiplex one
//! connection across many channels.

pub mod app;
pub mod config;
pub mod irc;
pub mod logging;
pub mod session;
pub mod sort;
