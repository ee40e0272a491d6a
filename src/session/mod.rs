//! Session multiplexing: one session per server connection, owning that
//! connection's channels, rosters, and outbound traffic.

pub mod channel;
pub mod directory;
pub mod marshal;
pub mod notification;
pub mod roster;

pub type SessionId = usize;

pub use channel::{Channel, ChannelKind};
pub use marshal::{Session, SessionError, SessionOptions};
pub use notification::{ChatLine, LineKind, Notification, NotificationSender, SessionNotification};
