//! The per-connection session marshal.
//!
//! A [`Session`] owns one [`Connection`] and the ordered set of channels
//! multiplexed over it. All mutation happens through `&mut self` on the
//! application's event loop: inbound messages arrive through
//! [`Session::handle_event`] / [`Session::dispatch`], user commands through
//! [`Session::send`], and every visible effect leaves as a [`Notification`].

use crate::irc::casemap;
use crate::irc::connection::{
    Connection, ConnectionError, ConnectionEvent, ConnectionStatus, Identity, ServerAddress,
};
use crate::irc::message::{Message, Outbound};
use crate::irc::{is_channel_name, numeric};
use crate::session::channel::{Channel, ChannelKind};
use crate::session::directory::ChannelListEntry;
use crate::session::notification::{
    ChatLine, LineKind, Notification, NotificationSender, SessionNotification,
};
use crate::session::roster::{Role, RosterKey, RosterView, User};
use crate::session::SessionId;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("not connected")]
    NotConnected,
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
}

impl From<ConnectionError> for SessionError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::NotConnected => SessionError::NotConnected,
            ConnectionError::Failure(reason) => SessionError::ConnectionFailure(reason),
        }
    }
}

/// Per-session behaviour, resolved from configuration by the caller.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Open a private-message channel when someone messages us directly.
    pub auto_create_private: bool,
    pub group_by_role: bool,
    /// Channels to join once registration completes.
    pub autojoin: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_create_private: true,
            group_by_role: true,
            autojoin: Vec::new(),
        }
    }
}

pub struct Session {
    id: SessionId,
    connection: Connection,
    /// The server console is always first.
    channels: Vec<Channel>,
    options: SessionOptions,
    roster_view: RosterView,
    registered: bool,
    pending_list: Vec<ChannelListEntry>,
    pending_names: HashMap<String, Vec<User>>,
    events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
    notify: NotificationSender,
}

impl Session {
    pub fn new(
        id: SessionId,
        address: ServerAddress,
        identity: Identity,
        options: SessionOptions,
        notify: NotificationSender,
    ) -> Self {
        let console = Channel::new(&address.to_string(), ChannelKind::Server);
        let session = Self {
            id,
            connection: Connection::new(id, address, identity),
            channels: vec![console],
            roster_view: RosterView::new(options.group_by_role),
            options,
            registered: false,
            pending_list: Vec::new(),
            pending_names: HashMap::new(),
            events: None,
            notify,
        };
        session.notify(Notification::ChannelCreated {
            channel: session.console_name().to_string(),
            kind: ChannelKind::Server,
        });
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn key(&self) -> String {
        self.connection.key()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn console_name(&self) -> &str {
        self.channels[0].name()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Look up a channel by case-insensitive name.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.matches(name))
    }

    pub fn roster_view(&self) -> RosterView {
        self.roster_view
    }

    /// Start connecting if disconnected. Returns `false` if a connection is
    /// already open or in progress.
    pub fn connect(&mut self, events: mpsc::UnboundedSender<ConnectionEvent>) -> bool {
        if self.connection.status() != ConnectionStatus::Disconnected {
            return false;
        }
        self.connection.begin_connect(events.clone());
        self.events = Some(events);
        self.display(
            self.console_name(),
            ChatLine::system(format!("Connecting to {}...", self.connection.address())),
        );
        self.notify(Notification::StateChanged {
            status: ConnectionStatus::Connecting,
            reason: None,
        });
        true
    }

    /// Close the connection without sending anything.
    pub fn disconnect(&mut self, reason: &str) {
        if self.connection.status() == ConnectionStatus::Disconnected {
            return;
        }
        self.connection.close();
        self.teardown(reason);
    }

    pub fn handle_event(&mut self, event: ConnectionEvent) {
        if event.generation() != self.connection.generation() {
            trace!(session = self.id, generation = event.generation(), "ignoring stale connection event");
            return;
        }
        match event {
            ConnectionEvent::Established { stream, .. } => {
                if self.connection.status() != ConnectionStatus::Connecting {
                    return;
                }
                let Some(events) = self.events.clone() else {
                    return;
                };
                self.connection.attach(stream, events);
                self.on_connected();
            }
            ConnectionEvent::Failed { error, .. } => {
                if self.connection.status() != ConnectionStatus::Connecting {
                    return;
                }
                self.connection.close();
                self.display(
                    self.console_name(),
                    ChatLine::error(format!("Connection failed: {}", error)),
                );
                self.notify(Notification::StateChanged {
                    status: ConnectionStatus::Disconnected,
                    reason: Some(error),
                });
            }
            ConnectionEvent::Received { message, .. } => self.dispatch(message),
            ConnectionEvent::Closed { reason, .. } => {
                if self.connection.status() == ConnectionStatus::Disconnected {
                    return;
                }
                self.connection.close();
                self.display(
                    self.console_name(),
                    ChatLine::error(format!("Disconnected: {}", reason)),
                );
                self.teardown(&reason);
            }
        }
    }

    fn on_connected(&mut self) {
        self.registered = false;
        self.pending_list.clear();
        self.pending_names.clear();
        self.display(self.console_name(), ChatLine::system("Connected to server."));
        self.notify(Notification::StateChanged {
            status: ConnectionStatus::Connected,
            reason: None,
        });
    }

    /// Remove every joined and private channel and report the disconnect.
    fn teardown(&mut self, reason: &str) {
        let removed: Vec<Channel> = self.channels.drain(1..).collect();
        for channel in removed {
            self.notify(Notification::ChannelRemoved {
                channel: channel.name().to_string(),
            });
        }
        self.registered = false;
        self.pending_list.clear();
        self.pending_names.clear();
        self.notify(Notification::StateChanged {
            status: ConnectionStatus::Disconnected,
            reason: Some(reason.to_string()),
        });
    }

    /// Send a message on behalf of the user in `context` (a channel name, or
    /// empty for the console).
    pub fn send(&mut self, context: &str, outbound: Outbound) -> Result<(), SessionError> {
        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.connection.enqueue(outbound.to_message())?;
        debug!(session = self.id, command = outbound.command(), "queued");

        match outbound {
            Outbound::Part { channel, .. } => self.remove_channel(&channel),
            Outbound::Quit { reason } => {
                self.connection.close();
                self.teardown(reason.as_deref().unwrap_or("quit"));
            }
            Outbound::Privmsg { target, text } => {
                let channel = if self.channel(&target).is_some() {
                    target
                } else if !is_channel_name(&target) {
                    self.create_channel(&target, ChannelKind::PrivateMessage);
                    target
                } else {
                    self.context_or_console(context)
                };
                let nickname = self.connection.nickname().to_string();
                self.display(&channel, ChatLine::new(&nickname, &text, LineKind::Normal));
            }
            Outbound::List => self.pending_list.clear(),
            _ => {}
        }
        Ok(())
    }

    /// Report a rejected command in the context that issued it.
    pub fn reject(&self, context: &str, reason: impl fmt::Display) {
        self.notify(Notification::Rejected {
            channel: self.context_or_console(context),
            reason: reason.to_string(),
        });
    }

    pub fn clear(&self, context: &str) {
        self.notify(Notification::Clear {
            channel: self.context_or_console(context),
        });
    }

    /// Show a local system line (help text and the like) in `context`.
    pub fn show(&self, context: &str, text: &str) {
        self.display(&self.context_or_console(context), ChatLine::system(text));
    }

    pub fn select_roster_key(&mut self, key: RosterKey) -> bool {
        let accepted = self.roster_view.select(key);
        if accepted {
            self.publish_all_rosters();
        }
        accepted
    }

    pub fn set_group_by_role(&mut self, grouped: bool) {
        self.roster_view.set_grouped(grouped);
        self.publish_all_rosters();
    }

    /// Route one inbound message.
    pub fn dispatch(&mut self, message: Message) {
        if let Some(code) = message.numeric() {
            self.dispatch_numeric(code, message);
            return;
        }
        match message.command.as_str() {
            "PING" => self.on_ping(message),
            "JOIN" => self.on_join(message),
            "PART" => self.on_part(message),
            "KICK" => self.on_kick(message),
            "QUIT" => self.on_quit(message),
            "NICK" => self.on_nick(message),
            "MODE" => self.on_mode(message),
            "TOPIC" => self.on_topic(message),
            "PRIVMSG" | "NOTICE" => self.on_text(message),
            _ => self.forward(message),
        }
    }

    fn dispatch_numeric(&mut self, code: u16, message: Message) {
        match code {
            numeric::RPL_WELCOME => {
                self.registered = true;
                if let Some(nick) = message.params.first() {
                    if nick != self.connection.nickname() {
                        self.connection.set_nickname(nick);
                        self.notify(Notification::NicknameChanged {
                            nickname: nick.clone(),
                        });
                    }
                }
                if let Some(text) = message.last_arg() {
                    self.display(self.console_name(), ChatLine::system(text));
                }
                info!(session = self.id, nickname = self.connection.nickname(), "registered");
                for channel in self.options.autojoin.clone() {
                    let join = Outbound::Join {
                        channel: channel.clone(),
                    };
                    if let Err(e) = self.connection.enqueue(join.into()) {
                        debug!(session = self.id, %channel, error = %e, "could not queue auto-join");
                    }
                }
            }
            numeric::RPL_LISTSTART => self.pending_list.clear(),
            numeric::RPL_LIST => {
                let Some(name) = message.arg(1) else {
                    return self.forward(message);
                };
                self.pending_list.push(ChannelListEntry {
                    name: name.to_string(),
                    users: message.arg(2).and_then(|n| n.parse().ok()).unwrap_or(0),
                    topic: message.arg(3).unwrap_or_default().to_string(),
                });
            }
            numeric::RPL_LISTEND => {
                let entries = std::mem::take(&mut self.pending_list);
                debug!(session = self.id, count = entries.len(), "channel list complete");
                self.notify(Notification::ChannelList { entries });
            }
            numeric::RPL_NAMREPLY => {
                // <me> <symbol> <channel> :<names>
                let (Some(channel), Some(names)) = (message.arg(2), message.arg(3)) else {
                    return self.forward(message);
                };
                self.pending_names
                    .entry(casemap::fold(channel))
                    .or_default()
                    .extend(names.split_whitespace().filter_map(User::from_names_entry));
            }
            numeric::RPL_ENDOFNAMES => {
                let Some(channel) = message.arg(1) else {
                    return self.forward(message);
                };
                let users = self
                    .pending_names
                    .remove(&casemap::fold(channel))
                    .unwrap_or_default();
                match self.find(channel) {
                    Some(idx) => {
                        self.channels[idx].roster_mut().replace(users);
                        self.publish_roster(idx);
                    }
                    None => self.forward(message),
                }
            }
            numeric::RPL_NOTOPIC => {
                let Some(idx) = message.arg(1).and_then(|c| self.find(c)) else {
                    return self.forward(message);
                };
                self.channels[idx].set_topic("");
            }
            numeric::RPL_TOPIC => {
                let (Some(channel), Some(topic)) = (message.arg(1), message.arg(2)) else {
                    return self.forward(message);
                };
                let (channel, topic) = (channel.to_string(), topic.to_string());
                self.apply_topic(&channel, &topic, None);
            }
            numeric::ERR_NICKNAMEINUSE if !self.registered => {
                let alternative = format!("{}_", self.connection.nickname());
                self.display(
                    self.console_name(),
                    ChatLine::system(format!(
                        "Nickname {} is already in use, trying {}",
                        self.connection.nickname(),
                        alternative
                    )),
                );
                self.connection.set_nickname(&alternative);
                if let Err(e) = self.connection.enqueue(
                    Outbound::Nick {
                        nickname: alternative,
                    }
                    .into(),
                ) {
                    debug!(session = self.id, error = %e, "could not queue nickname retry");
                }
            }
            _ => self.forward(message),
        }
    }

    fn on_ping(&mut self, message: Message) {
        let token = message
            .last_arg()
            .or_else(|| message.source_nickname())
            .unwrap_or_default()
            .to_string();
        if let Err(e) = self.connection.enqueue(Outbound::Pong { token }.into()) {
            debug!(session = self.id, error = %e, "could not answer PING");
        }
    }

    fn on_join(&mut self, message: Message) {
        let (Some(nick), Some(channel)) = (message.source_nickname(), message.arg(0)) else {
            return self.forward(message);
        };
        let (nick, channel) = (nick.to_string(), channel.to_string());

        if self.is_local(&nick) {
            self.create_channel(&channel, ChannelKind::Channel);
            self.display(
                &channel,
                ChatLine::new(&nick, &format!("You have joined {}", channel), LineKind::Join),
            );
            return;
        }
        let Some(idx) = self.find(&channel) else {
            return self.forward(message);
        };
        self.channels[idx].roster_mut().insert(User::new(&nick));
        self.display(
            &channel,
            ChatLine::new(&nick, &format!("has joined {}", channel), LineKind::Join),
        );
        self.publish_roster(idx);
    }

    fn on_part(&mut self, message: Message) {
        let (Some(nick), Some(channel)) = (message.source_nickname(), message.arg(0)) else {
            return self.forward(message);
        };
        let (nick, channel) = (nick.to_string(), channel.to_string());
        let reason = message.arg(1).map(str::to_string);

        if self.is_local(&nick) {
            self.remove_channel(&channel);
            return;
        }
        let Some(idx) = self.find(&channel) else {
            return self.forward(message);
        };
        self.channels[idx].roster_mut().remove(&nick);
        let text = match reason {
            Some(r) if !r.is_empty() => format!("has left {} ({})", channel, r),
            _ => format!("has left {}", channel),
        };
        self.display(&channel, ChatLine::new(&nick, &text, LineKind::Part));
        self.publish_roster(idx);
    }

    fn on_kick(&mut self, message: Message) {
        let (Some(kicker), Some(channel), Some(victim)) =
            (message.source_nickname(), message.arg(0), message.arg(1))
        else {
            return self.forward(message);
        };
        let (kicker, channel, victim) = (kicker.to_string(), channel.to_string(), victim.to_string());
        let reason = message.arg(2).unwrap_or_default().to_string();

        if self.is_local(&victim) {
            self.display(
                self.console_name(),
                ChatLine::error(format!("You were kicked from {} by {} ({})", channel, kicker, reason)),
            );
            self.remove_channel(&channel);
            return;
        }
        let Some(idx) = self.find(&channel) else {
            return self.forward(message);
        };
        self.channels[idx].roster_mut().remove(&victim);
        self.display(
            &channel,
            ChatLine::new(
                &victim,
                &format!("was kicked by {} ({})", kicker, reason),
                LineKind::Part,
            ),
        );
        self.publish_roster(idx);
    }

    fn on_quit(&mut self, message: Message) {
        let Some(nick) = message.source_nickname() else {
            return self.forward(message);
        };
        let nick = nick.to_string();
        let text = match message.arg(0) {
            Some(r) if !r.is_empty() => format!("has quit ({})", r),
            _ => "has quit".to_string(),
        };

        for idx in 0..self.channels.len() {
            let was_member = self.channels[idx].roster_mut().remove(&nick).is_some();
            let is_query = self.channels[idx].kind() == ChannelKind::PrivateMessage
                && self.channels[idx].matches(&nick);
            if was_member || is_query {
                let channel = self.channels[idx].name().to_string();
                self.display(&channel, ChatLine::new(&nick, &text, LineKind::Quit));
            }
            if was_member {
                self.publish_roster(idx);
            }
        }
    }

    fn on_nick(&mut self, message: Message) {
        let (Some(old), Some(new)) = (message.source_nickname(), message.arg(0)) else {
            return self.forward(message);
        };
        let (old, new) = (old.to_string(), new.to_string());
        let text = format!("{} is now known as {}", old, new);

        if self.is_local(&old) {
            self.connection.set_nickname(&new);
            self.display(self.console_name(), ChatLine::system(format!("You are now known as {}", new)));
            self.notify(Notification::NicknameChanged { nickname: new.clone() });
        }

        // A private conversation follows the user to the new nickname.
        if let Some(idx) = self.find(&old) {
            let free = self.find(&new).is_none_or(|other| other == idx);
            if self.channels[idx].kind() == ChannelKind::PrivateMessage && free {
                self.notify(Notification::ChannelRemoved { channel: old.clone() });
                self.channels[idx].rename(&new);
                self.notify(Notification::ChannelCreated {
                    channel: new.clone(),
                    kind: ChannelKind::PrivateMessage,
                });
                self.display(&new, ChatLine::system(text.clone()));
            }
        }

        for idx in 0..self.channels.len() {
            if self.channels[idx].roster_mut().rename(&old, &new) {
                let channel = self.channels[idx].name().to_string();
                self.display(&channel, ChatLine::system(text.clone()));
                self.publish_roster(idx);
            }
        }
    }

    fn on_mode(&mut self, message: Message) {
        let Some(target) = message.arg(0) else {
            return self.forward(message);
        };
        if !is_channel_name(target) {
            return self.forward(message);
        }
        let Some(idx) = self.find(target) else {
            return self.forward(message);
        };
        let channel = self.channels[idx].name().to_string();
        let setter = message.source_nickname().unwrap_or_default().to_string();
        let modes = message.arg(1).unwrap_or_default().to_string();
        let args: Vec<String> = (2..message.arg_count())
            .filter_map(|i| message.arg(i).map(str::to_string))
            .collect();

        let mut args_iter = args.iter();
        let mut adding = true;
        let mut roster_changed = false;
        for c in modes.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                _ => {
                    if let Some(role) = Role::from_mode(c) {
                        if let Some(nick) = args_iter.next() {
                            roster_changed |= self.channels[idx].roster_mut().set_mode(nick, role, adding);
                        }
                    } else if takes_argument(c, adding) {
                        args_iter.next();
                    }
                }
            }
        }

        let shown = std::iter::once(modes.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.display(
            &channel,
            ChatLine::system(format!("{} sets mode {}", setter, shown)),
        );
        if roster_changed {
            self.publish_roster(idx);
        }
    }

    fn on_topic(&mut self, message: Message) {
        let (Some(channel), Some(topic)) = (message.arg(0), message.arg(1)) else {
            return self.forward(message);
        };
        let (channel, topic) = (channel.to_string(), topic.to_string());
        let setter = message.source_nickname().map(str::to_string);
        self.apply_topic(&channel, &topic, setter.as_deref());
    }

    fn apply_topic(&mut self, channel: &str, topic: &str, setter: Option<&str>) {
        let Some(idx) = self.find(channel) else {
            debug!(session = self.id, channel, "topic for unknown channel");
            return;
        };
        self.channels[idx].set_topic(topic);
        let name = self.channels[idx].name().to_string();
        let text = match setter {
            Some(who) => format!("{} changed the topic to: {}", who, topic),
            None => format!("Topic: {}", topic),
        };
        self.display(&name, ChatLine::system(text));
        self.notify(Notification::Topic {
            channel: name,
            topic: topic.to_string(),
        });
    }

    fn on_text(&mut self, message: Message) {
        let (Some(target), Some(text)) = (message.arg(0), message.arg(1)) else {
            return self.forward(message);
        };
        let sender = message.source_nickname().unwrap_or_default().to_string();
        let from_user = message
            .prefix
            .as_ref()
            .is_some_and(|p| p.user.is_some() || p.host.is_some());
        let mut kind = if message.command == "NOTICE" {
            LineKind::Notice
        } else {
            LineKind::Normal
        };
        let text = match text.strip_prefix("\x01ACTION ") {
            Some(action) => {
                kind = LineKind::Action;
                action.trim_end_matches('\x01').to_string()
            }
            None => text.to_string(),
        };

        let channel = if is_channel_name(target) {
            match self.find(target) {
                Some(idx) => self.channels[idx].name().to_string(),
                None => self.console_name().to_string(),
            }
        } else if !from_user || sender.is_empty() {
            self.console_name().to_string()
        } else if let Some(idx) = self.find(&sender) {
            self.channels[idx].name().to_string()
        } else if self.options.auto_create_private && kind != LineKind::Notice {
            self.create_channel(&sender, ChannelKind::PrivateMessage);
            sender.clone()
        } else {
            self.console_name().to_string()
        };

        let mut line = ChatLine::new(&sender, &text, kind);
        line.mention = mentions(&text, self.connection.nickname());
        self.display(&channel, line);
    }

    fn forward(&self, message: Message) {
        let channel = message
            .params
            .iter()
            .find_map(|p| self.channel(p).filter(|c| c.kind() != ChannelKind::Server))
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| self.console_name().to_string());
        self.notify(Notification::Forward { channel, message });
    }

    fn is_local(&self, nick: &str) -> bool {
        casemap::eq(nick, self.connection.nickname())
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.matches(name))
    }

    fn context_or_console(&self, context: &str) -> String {
        self.channel(context)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| self.console_name().to_string())
    }

    fn create_channel(&mut self, name: &str, kind: ChannelKind) {
        if self.find(name).is_some() {
            return;
        }
        self.channels.push(Channel::new(name, kind));
        debug!(session = self.id, channel = name, ?kind, "channel created");
        self.notify(Notification::ChannelCreated {
            channel: name.to_string(),
            kind,
        });
    }

    fn remove_channel(&mut self, name: &str) {
        let Some(idx) = self.find(name) else {
            return;
        };
        if self.channels[idx].kind() == ChannelKind::Server {
            return;
        }
        let channel = self.channels.remove(idx);
        self.pending_names.remove(&casemap::fold(name));
        debug!(session = self.id, channel = channel.name(), "channel removed");
        self.notify(Notification::ChannelRemoved {
            channel: channel.name().to_string(),
        });
    }

    fn publish_roster(&self, idx: usize) {
        let channel = &self.channels[idx];
        self.notify(Notification::Roster {
            channel: channel.name().to_string(),
            groups: channel.roster().view(&self.roster_view),
        });
    }

    fn publish_all_rosters(&self) {
        for (idx, channel) in self.channels.iter().enumerate() {
            if channel.kind() == ChannelKind::Channel {
                self.publish_roster(idx);
            }
        }
    }

    fn display(&self, channel: &str, line: ChatLine) {
        self.notify(Notification::Display {
            channel: channel.to_string(),
            line,
        });
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notify.send(SessionNotification {
            session: self.id,
            notification,
        });
    }

    #[cfg(test)]
    pub(crate) fn attach_queue(&mut self) -> mpsc::UnboundedReceiver<Message> {
        let rx = self.connection.attach_queue();
        self.on_connected();
        rx
    }
}

/// Whether a non-prefix channel mode consumes an argument.
fn takes_argument(mode: char, adding: bool) -> bool {
    match mode {
        'b' | 'e' | 'I' | 'k' => true,
        'l' => adding,
        _ => false,
    }
}

fn mentions(text: &str, nickname: &str) -> bool {
    !nickname.is_empty()
        && text
            .split(|c: char| !(c.is_alphanumeric() || "-_[]{}\\|^`".contains(c)))
            .any(|word| casemap::eq(word, nickname))
}
