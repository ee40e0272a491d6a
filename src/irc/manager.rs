use crate::irc::connection::{ConnectionEvent, Identity, ServerAddress};
use crate::irc::Outbound;
use crate::session::{NotificationSender, Session, SessionId, SessionOptions};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Whether a connect request opened a new session or reused an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Created(SessionId),
    Reused(SessionId),
}

impl ConnectOutcome {
    pub fn id(self) -> SessionId {
        match self {
            ConnectOutcome::Created(id) | ConnectOutcome::Reused(id) => id,
        }
    }
}

/// Owns every session, at most one per server `host:port`.
pub struct SessionManager {
    sessions: HashMap<SessionId, Session>,
    by_key: HashMap<String, SessionId>,
    next_id: SessionId,
    identity: Identity,
    options: SessionOptions,
    notify: NotificationSender,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl SessionManager {
    pub fn new(
        identity: Identity,
        options: SessionOptions,
        notify: NotificationSender,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            by_key: HashMap::new(),
            next_id: 0,
            identity,
            options,
            notify,
            events,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Connect with the default identity and options.
    pub fn connect(&mut self, address: ServerAddress) -> ConnectOutcome {
        let identity = self.identity.clone();
        let options = self.options.clone();
        self.connect_with(address, identity, options)
    }

    /// Connect to `address`. A server that already has a session keeps its
    /// session, channels, and nickname; it is only redialled if disconnected.
    pub fn connect_with(
        &mut self,
        address: ServerAddress,
        identity: Identity,
        options: SessionOptions,
    ) -> ConnectOutcome {
        let key = address.key();
        if let Some(&id) = self.by_key.get(&key) {
            if let Some(session) = self.sessions.get_mut(&id) {
                debug!(session = id, %key, "reusing session");
                session.connect(self.events.clone());
                return ConnectOutcome::Reused(id);
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        info!(session = id, %key, nickname = %identity.nickname, "new session");
        let mut session = Session::new(id, address, identity, options, self.notify.clone());
        session.connect(self.events.clone());
        self.sessions.insert(id, session);
        self.by_key.insert(key, id);
        ConnectOutcome::Created(id)
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn find(&self, address: &ServerAddress) -> Option<SessionId> {
        self.by_key.get(&address.key()).copied()
    }

    /// Sessions in creation order.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Route a connection event to the session it belongs to.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        let id = event.session();
        match self.sessions.get_mut(&id) {
            Some(session) => session.handle_event(event),
            None => debug!(session = id, "event for unknown session"),
        }
    }

    /// Send QUIT on every connected session.
    pub fn quit_all(&mut self, reason: Option<&str>) {
        for session in self.sessions.values_mut() {
            if session.is_connected() {
                let _ = session.send(
                    "",
                    Outbound::Quit {
                        reason: reason.map(str::to_string),
                    },
                );
            }
        }
    }
}
