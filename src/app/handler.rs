use crate::app::event::AppEvent;
use crate::app::state::{ActiveContext, AppState};
use crate::irc::commands::{self, CommandError, Interpreted, LocalCommand};
use crate::irc::connection::{ConnectionStatus, ServerAddress};
use crate::irc::manager::ConnectOutcome;
use crate::irc::Outbound;
use crate::session::directory::{ChannelDirectory, COLUMN_USERS};
use crate::session::{ChannelKind, ChatLine, LineKind, Notification, SessionNotification};
use tracing::debug;

/// Channels shown from a `/list` reply, busiest first.
const LIST_LIMIT: usize = 25;

pub fn handle_event(state: &mut AppState, event: AppEvent) {
    match event {
        AppEvent::Input(line) => handle_input(state, &line),
        AppEvent::Connection(event) => state.manager.handle_event(event),
        AppEvent::InputClosed => {
            let reason = state.config.behavior.quit_message.clone();
            state.manager.quit_all(Some(&reason));
            state.should_quit = true;
        }
    }
}

fn handle_input(state: &mut AppState, line: &str) {
    let context = state.context_name().to_string();
    let interpreted = match commands::interpret(line, &context) {
        Ok(interpreted) => interpreted,
        Err(CommandError::Empty) => return,
        Err(e) => return reject(state, &context, e.to_string()),
    };

    match interpreted {
        Interpreted::Connect(address) => {
            // A saved server can be named instead of addressed.
            let target = line.trim().split_once(' ').map(|(_, r)| r.trim()).unwrap_or_default();
            let outcome = match state.config.find_server(target).cloned() {
                Some(server) => {
                    let identity = state.config.server_identity(&server);
                    let options = state.config.session_options(Some(&server));
                    state.manager.connect_with(server.address(), identity, options)
                }
                None => {
                    let address = ServerAddress::parse_with_default(target, state.config.identity.default_port)
                        .unwrap_or(address);
                    let identity = state.config.identity();
                    let options = state.config.session_options(None);
                    state.manager.connect_with(address, identity, options)
                }
            };
            if let ConnectOutcome::Reused(id) = outcome {
                debug!(session = id, "connect request reused an existing session");
            }
            state.activate(outcome.id(), "");
        }
        Interpreted::Send(outbound) => {
            let outbound = with_default_reason(state, outbound);
            let Some(session) = state.active_session_mut() else {
                return state.print("Not connected. Use /connect <host[:port]> first.");
            };
            if let Err(e) = session.send(&context, outbound) {
                session.reject(&context, e);
            }
        }
        Interpreted::Local(LocalCommand::Help) => {
            let lines = commands::help_lines();
            match state.active_session_mut() {
                Some(session) => lines.iter().for_each(|l| session.show(&context, l)),
                None => state.output.extend(lines),
            }
        }
        Interpreted::Local(LocalCommand::Clear) => match state.active_session_mut() {
            Some(session) => session.clear(&context),
            None => state.print(CLEAR_SCREEN),
        },
    }
}

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

fn reject(state: &mut AppState, context: &str, reason: String) {
    match state.active_session_mut() {
        Some(session) => session.reject(context, reason),
        None => state.print(format!("!!! {}", reason)),
    }
}

// Quit and part reasons fall back to the configured messages.
fn with_default_reason(state: &AppState, outbound: Outbound) -> Outbound {
    let behavior = &state.config.behavior;
    match outbound {
        Outbound::Quit { reason: None } => Outbound::Quit {
            reason: Some(behavior.quit_message.clone()),
        },
        Outbound::Part {
            channel,
            reason: None,
        } => Outbound::Part {
            channel,
            reason: Some(behavior.part_message.clone()),
        },
        other => other,
    }
}

/// Update the active context from a session notification and queue its
/// printable form.
pub fn apply_notification(state: &mut AppState, note: &SessionNotification) {
    let session = note.session;
    match note.notification {
        Notification::ChannelCreated { ref channel, kind } => {
            if kind == ChannelKind::Server {
                if state.active.is_none() {
                    state.activate(session, "");
                }
                return;
            }
            state.contexts.push(ActiveContext {
                session,
                channel: channel.clone(),
            });
            state.activate(session, channel);
            state.print(format!("--- now talking in {}", channel));
        }
        Notification::ChannelRemoved { ref channel } => {
            state.forget(session, channel);
            state.print(format!("--- left {}", channel));
        }
        Notification::Display {
            ref channel,
            ref line,
        } => state.print(format!("[{}] {}", channel, format_line(line))),
        Notification::Roster {
            ref channel,
            ref groups,
        } => {
            let names: Vec<String> = groups
                .iter()
                .flat_map(|g| g.users.iter().map(|u| u.display_name()))
                .collect();
            state.print(format!("[{}] Users ({}): {}", channel, names.len(), names.join(" ")));
        }
        // Topic changes are also displayed as lines.
        Notification::Topic { .. } => {}
        Notification::ChannelList { ref entries } => {
            let mut directory = ChannelDirectory::new(entries.clone());
            // Second select flips the user count to descending.
            directory.sort_by(COLUMN_USERS);
            directory.sort_by(COLUMN_USERS);
            state.print(format!("--- {} channels", directory.len()));
            let shown: Vec<String> = directory
                .visible()
                .take(LIST_LIMIT)
                .map(|e| format!("  {:<24} {:>5}  {}", e.name, e.users, e.topic))
                .collect();
            state.output.extend(shown);
        }
        Notification::Forward {
            ref channel,
            ref message,
        } => {
            let text = match message.numeric() {
                Some(_) => message.last_arg().unwrap_or_default().to_string(),
                None => message.to_string(),
            };
            state.print(format!("[{}] {}", channel, text));
        }
        Notification::Rejected {
            ref channel,
            ref reason,
        } => state.print(format!("[{}] !!! {}", channel, reason)),
        Notification::Clear { .. } => state.print(CLEAR_SCREEN),
        Notification::NicknameChanged { ref nickname } => {
            state.print(format!("--- your nickname is now {}", nickname));
        }
        Notification::StateChanged { status, ref reason } => {
            let text = match (status, reason) {
                (ConnectionStatus::Connecting, _) => "connecting".to_string(),
                (ConnectionStatus::Connected, _) => "connected".to_string(),
                (ConnectionStatus::Disconnected, Some(r)) => format!("disconnected ({})", r),
                (ConnectionStatus::Disconnected, None) => "disconnected".to_string(),
            };
            state.print(format!("--- session {} {}", session, text));
        }
    }
}

fn format_line(line: &ChatLine) -> String {
    let time = line.timestamp.format("%H:%M");
    let mark = if line.mention { "!" } else { "" };
    match line.kind {
        LineKind::Normal => format!("{} {}<{}> {}", time, mark, line.sender, line.text),
        LineKind::Notice => format!("{} {}-{}- {}", time, mark, line.sender, line.text),
        LineKind::Action => format!("{} {}* {} {}", time, mark, line.sender, line.text),
        LineKind::Join | LineKind::Part | LineKind::Quit => {
            format!("{} *** {} {}", time, line.sender, line.text)
        }
        LineKind::System => format!("{} *** {}", time, line.text),
        LineKind::Error => format!("{} !!! {}", time, line.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::session::directory::ChannelListEntry;
    use tokio::sync::mpsc;

    fn state() -> AppState {
        let (notify, _) = mpsc::unbounded_channel();
        let (events, _) = mpsc::unbounded_channel();
        AppState::new(AppConfig::default(), notify, events)
    }

    fn note(session: usize, notification: Notification) -> SessionNotification {
        SessionNotification {
            session,
            notification,
        }
    }

    #[test]
    fn test_input_without_session() {
        let mut state = state();
        handle_event(&mut state, AppEvent::Input("/join #rust".into()));
        assert_eq!(
            state.take_output(),
            vec!["Not connected. Use /connect <host[:port]> first.".to_string()]
        );

        handle_event(&mut state, AppEvent::Input("hello".into()));
        assert_eq!(
            state.take_output(),
            vec!["!!! not in a channel or conversation".to_string()]
        );

        handle_event(&mut state, AppEvent::Input("   ".into()));
        assert!(state.take_output().is_empty());

        handle_event(&mut state, AppEvent::Input("/help".into()));
        assert_eq!(state.take_output().len(), commands::COMMANDS.len() + 1);
    }

    #[test]
    fn test_active_context_follows_created_channels() {
        let mut state = state();
        apply_notification(
            &mut state,
            &note(0, Notification::ChannelCreated { channel: "irc:6667".into(), kind: ChannelKind::Server }),
        );
        assert_eq!(state.active, Some(ActiveContext { session: 0, channel: String::new() }));

        apply_notification(
            &mut state,
            &note(0, Notification::ChannelCreated { channel: "#rust".into(), kind: ChannelKind::Channel }),
        );
        apply_notification(
            &mut state,
            &note(0, Notification::ChannelCreated { channel: "pal".into(), kind: ChannelKind::PrivateMessage }),
        );
        assert_eq!(state.context_name(), "pal");

        apply_notification(&mut state, &note(0, Notification::ChannelRemoved { channel: "pal".into() }));
        assert_eq!(state.context_name(), "#rust");
    }

    #[test]
    fn test_channel_list_printed_busiest_first() {
        let mut state = state();
        let entries = vec![
            ChannelListEntry { name: "#small".into(), users: 3, topic: String::new() },
            ChannelListEntry { name: "#big".into(), users: 300, topic: "busy".into() },
        ];
        apply_notification(&mut state, &note(0, Notification::ChannelList { entries }));
        let out = state.take_output();
        assert_eq!(out[0], "--- 2 channels");
        assert!(out[1].contains("#big"));
        assert!(out[2].contains("#small"));
    }

    #[test]
    fn test_default_reasons_come_from_config() {
        let state = state();
        assert_eq!(
            with_default_reason(&state, Outbound::Quit { reason: None }),
            Outbound::Quit { reason: Some("CrabChat".into()) }
        );
        assert_eq!(
            with_default_reason(&state, Outbound::Part { channel: "#a".into(), reason: None }),
            Outbound::Part { channel: "#a".into(), reason: Some("Leaving".into()) }
        );
        assert_eq!(
            with_default_reason(&state, Outbound::List),
            Outbound::List
        );
    }

    #[test]
    fn test_input_closed_requests_shutdown() {
        let mut state = state();
        handle_event(&mut state, AppEvent::InputClosed);
        assert!(state.should_quit);
    }

    #[test]
    fn test_format_line_kinds() {
        let mut line = ChatLine::new("bob", "hi me", LineKind::Normal);
        line.mention = true;
        assert!(format_line(&line).ends_with("!<bob> hi me"));
        let action = ChatLine::new("bob", "waves", LineKind::Action);
        assert!(format_line(&action).ends_with("* bob waves"));
        assert!(format_line(&ChatLine::system("hello")).ends_with("*** hello"));
    }
}
