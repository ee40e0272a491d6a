//! Numeric reply codes this client interprets (RFC 2812, section 5).
//!
//! Everything not listed here is forwarded to the presentation layer as-is.

pub const RPL_WELCOME: u16 = 1;
pub const RPL_LISTSTART: u16 = 321;
pub const RPL_LIST: u16 = 322;
pub const RPL_LISTEND: u16 = 323;
pub const RPL_NOTOPIC: u16 = 331;
pub const RPL_TOPIC: u16 = 332;
pub const RPL_NAMREPLY: u16 = 353;
pub const RPL_ENDOFNAMES: u16 = 366;
pub const ERR_NICKNAMEINUSE: u16 = 433;
