//! Chat transcripts on disk.
//!
//! When enabled, displayed lines are appended to daily log files organized by
//! channel or private conversation. Log files are named `<target>_<date>.log`
//! and stored in the configured log directory (default:
//! `~/.local/share/crabchat/logs/`).

use crate::config::LoggingConfig;
use crate::irc::casemap;
use crate::session::{ChannelKind, ChatLine, LineKind, Notification, SessionId, SessionNotification};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Writes displayed lines to per-channel/query daily log files.
///
/// File handles are cached for the lifetime of the logger to avoid repeated
/// opens. The logger learns each channel's kind from the notification stream.
pub struct ChatLogger {
    enabled: bool,
    log_dir: PathBuf,
    log_channels: bool,
    log_queries: bool,
    kinds: HashMap<(SessionId, String), ChannelKind>,
    file_handles: HashMap<String, fs::File>,
}

impl ChatLogger {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            enabled: config.enabled,
            log_dir: expand_home(&config.log_dir),
            log_channels: config.log_channels,
            log_queries: config.log_queries,
            kinds: HashMap::new(),
            file_handles: HashMap::new(),
        }
    }

    /// Track channel creation and removal and write displayed lines. No-op
    /// if logging is disabled.
    pub fn observe(&mut self, note: &SessionNotification) {
        if !self.enabled {
            return;
        }
        match note.notification {
            Notification::ChannelCreated { ref channel, kind } => {
                self.kinds.insert((note.session, casemap::fold(channel)), kind);
            }
            Notification::ChannelRemoved { ref channel } => {
                self.kinds.remove(&(note.session, casemap::fold(channel)));
            }
            Notification::Display {
                ref channel,
                ref line,
            } => {
                let kind = self.kinds.get(&(note.session, casemap::fold(channel))).copied();
                self.log_line(channel, kind, line);
            }
            _ => {}
        }
    }

    /// Write a line to the appropriate log file if that kind of target is
    /// configured for logging. Server consoles are never logged.
    pub fn log_line(&mut self, target: &str, kind: Option<ChannelKind>, line: &ChatLine) {
        match kind {
            Some(ChannelKind::Channel) if self.log_channels => {}
            Some(ChannelKind::PrivateMessage) if self.log_queries => {}
            _ => return,
        }

        let time = line.timestamp.format("%H:%M:%S");
        let text = match line.kind {
            LineKind::Normal => format!("[{}] <{}> {}", time, line.sender, line.text),
            LineKind::Notice => format!("[{}] -{}- {}", time, line.sender, line.text),
            LineKind::Action => format!("[{}] * {} {}", time, line.sender, line.text),
            LineKind::Join | LineKind::Part | LineKind::Quit | LineKind::System => {
                format!("[{}] *** {} {}", time, line.sender, line.text)
            }
            LineKind::Error => format!("[{}] !!! {}", time, line.text),
        };

        let date = line.timestamp.format("%Y-%m-%d");
        let filename = format!("{}_{}.log", sanitize(target), date);

        if !self.file_handles.contains_key(&filename) {
            let _ = fs::create_dir_all(&self.log_dir);
            let path = self.log_dir.join(&filename);
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    self.file_handles.insert(filename.clone(), file);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot open transcript");
                    return;
                }
            }
        }
        if let Some(handle) = self.file_handles.get_mut(&filename) {
            let _ = writeln!(handle, "{}", text);
        }
    }
}

// Channel names may contain characters that are unsafe in file names.
fn sanitize(target: &str) -> String {
    target
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

fn expand_home(dir: &str) -> PathBuf {
    match dir.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(dir)),
        None => PathBuf::from(dir),
    }
}
