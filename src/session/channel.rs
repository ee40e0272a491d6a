use crate::irc::casemap;
use crate::session::roster::Roster;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// The server console of a session.
    Server,
    Channel,
    PrivateMessage,
}

/// A conversation context within a session. Identity is the case-mapped name.
#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    kind: ChannelKind,
    roster: Roster,
    topic: Option<String>,
}

impl Channel {
    pub fn new(name: &str, kind: ChannelKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            roster: Roster::new(),
            topic: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn matches(&self, name: &str) -> bool {
        casemap::eq(&self.name, name)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn set_topic(&mut self, topic: &str) {
        self.topic = if topic.is_empty() {
            None
        } else {
            Some(topic.to_string())
        };
    }

    pub(crate) fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }
}
