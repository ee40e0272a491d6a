use crate::config::AppConfig;
use crate::irc::connection::ConnectionEvent;
use crate::irc::manager::SessionManager;
use crate::session::{NotificationSender, Session, SessionId};
use tokio::sync::mpsc;

/// Where typed text goes: a session and one of its channels. An empty
/// channel name means the session's server console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveContext {
    pub session: SessionId,
    pub channel: String,
}

pub struct AppState {
    pub config: AppConfig,
    pub manager: SessionManager,
    pub active: Option<ActiveContext>,
    /// Open channels in creation order, used to pick a new active context
    /// when the current one goes away.
    pub contexts: Vec<ActiveContext>,
    /// Lines waiting to be printed.
    pub output: Vec<String>,
    pub should_quit: bool,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        notify: NotificationSender,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let manager = SessionManager::new(
            config.identity(),
            config.session_options(None),
            notify,
            events,
        );
        Self {
            config,
            manager,
            active: None,
            contexts: Vec::new(),
            output: Vec::new(),
            should_quit: false,
        }
    }

    /// The channel name typed text is addressed to, empty for a console.
    pub fn context_name(&self) -> &str {
        self.active.as_ref().map(|a| a.channel.as_str()).unwrap_or("")
    }

    pub fn active_session_mut(&mut self) -> Option<&mut Session> {
        let id = self.active.as_ref()?.session;
        self.manager.session_mut(id)
    }

    pub fn print(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn activate(&mut self, session: SessionId, channel: &str) {
        self.active = Some(ActiveContext {
            session,
            channel: channel.to_string(),
        });
    }

    /// Forget a closed channel. If it was active, fall back to the most
    /// recent remaining channel of the same session, then its console.
    pub fn forget(&mut self, session: SessionId, channel: &str) {
        let same = |c: &ActiveContext| c.session == session && crate::irc::casemap::eq(&c.channel, channel);
        self.contexts.retain(|c| !same(c));
        if self.active.as_ref().is_some_and(same) {
            let fallback = self
                .contexts
                .iter()
                .rev()
                .find(|c| c.session == session)
                .map(|c| c.channel.clone())
                .unwrap_or_default();
            self.activate(session, &fallback);
        }
    }
}
