//! Messages from a session to its presentation collaborator.
//!
//! Notifications are delivered in order on one channel per application, each
//! tagged with the session it came from, and carry everything needed to
//! render them without calling back into the session.

use crate::irc::connection::ConnectionStatus;
use crate::irc::Message;
use crate::session::channel::ChannelKind;
use crate::session::directory::ChannelListEntry;
use crate::session::roster::RosterGroup;
use crate::session::SessionId;
use chrono::{DateTime, Local};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Normal,
    Action,
    Notice,
    System,
    Error,
    Join,
    Part,
    Quit,
}

/// One line of conversation text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub timestamp: DateTime<Local>,
    pub sender: String,
    pub text: String,
    pub kind: LineKind,
    /// The text mentions the local nickname.
    pub mention: bool,
}

impl ChatLine {
    pub fn new(sender: &str, text: &str, kind: LineKind) -> Self {
        Self {
            timestamp: Local::now(),
            sender: sender.to_string(),
            text: text.to_string(),
            kind,
            mention: false,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            sender: "***".to_string(),
            text: text.into(),
            kind: LineKind::System,
            mention: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            sender: "!!!".to_string(),
            text: text.into(),
            kind: LineKind::Error,
            mention: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Notification {
    StateChanged {
        status: ConnectionStatus,
        reason: Option<String>,
    },
    ChannelCreated {
        channel: String,
        kind: ChannelKind,
    },
    ChannelRemoved {
        channel: String,
    },
    Display {
        channel: String,
        line: ChatLine,
    },
    /// Full replacement of a channel's roster, already in display order.
    Roster {
        channel: String,
        groups: Vec<RosterGroup>,
    },
    Topic {
        channel: String,
        topic: String,
    },
    /// A complete channel listing, released once the server ends the list.
    ChannelList {
        entries: Vec<ChannelListEntry>,
    },
    /// A message with no special handling, passed through unchanged.
    Forward {
        channel: String,
        message: Message,
    },
    Rejected {
        channel: String,
        reason: String,
    },
    Clear {
        channel: String,
    },
    NicknameChanged {
        nickname: String,
    },
}

#[derive(Debug, Clone)]
pub struct SessionNotification {
    pub session: SessionId,
    pub notification: Notification,
}

pub type NotificationSender = mpsc::UnboundedSender<SessionNotification>;
