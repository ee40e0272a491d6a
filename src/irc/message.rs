//! IRC wire messages.
//!
//! [`Message`] is the typed form of one protocol line, inbound or outbound.
//! Parsing follows the classic grammar:
//!
//! ```text
//! [":" prefix " "] command {" " middle} [" :" trailing]
//! ```
//!
//! Formatting is the structural inverse, so a formatted message parses back
//! to a message that formats identically. [`Outbound`] enumerates the
//! messages this client originates, each with its own parameter shape.

use std::fmt;
use thiserror::Error;

/// Failure to read a raw line as a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed wire line ({reason}): {line:?}")]
    MalformedWireLine { line: String, reason: &'static str },
}

/// Message source: `server.name` or `nick!user@host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub name: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    pub fn parse(raw: &str) -> Self {
        let (head, host) = match raw.split_once('@') {
            Some((head, host)) => (head, Some(host.to_string())),
            None => (raw, None),
        };
        let (name, user) = match head.split_once('!') {
            Some((name, user)) => (name.to_string(), Some(user.to_string())),
            None => (head.to_string(), None),
        };
        Self { name, user, host }
    }

    /// The nickname (or server name) part of the prefix.
    pub fn nickname(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(ref user) = self.user {
            write!(f, "!{}", user)?;
        }
        if let Some(ref host) = self.host {
            write!(f, "@{}", host)?;
        }
        Ok(())
    }
}

/// One protocol line.
///
/// Parameter order is positional and must be preserved; the meaning of each
/// position depends on `command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl Message {
    pub fn new(command: &str, params: Vec<String>, trailing: Option<String>) -> Self {
        Self {
            prefix: None,
            command: command.to_string(),
            params,
            trailing,
        }
    }

    /// Parse a single raw line. A trailing `\r\n` is ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let malformed = |reason| ParseError::MalformedWireLine {
            line: line.to_string(),
            reason,
        };

        let mut rest = line.trim_start_matches(' ');
        if rest.is_empty() {
            return Err(malformed("empty line"));
        }

        let prefix = match rest.strip_prefix(':') {
            Some(stripped) => {
                let (raw, tail) = stripped
                    .split_once(' ')
                    .ok_or_else(|| malformed("prefix without command"))?;
                if raw.is_empty() {
                    return Err(malformed("empty prefix"));
                }
                rest = tail.trim_start_matches(' ');
                Some(Prefix::parse(raw))
            }
            None => None,
        };

        let (head, trailing) = match rest.find(" :") {
            Some(idx) => (&rest[..idx], Some(rest[idx + 2..].to_string())),
            None => (rest, None),
        };

        let mut tokens = head.split(' ').filter(|t| !t.is_empty());
        let command = tokens.next().ok_or_else(|| malformed("missing command"))?;
        let command = if is_numeric(command) {
            command.to_string()
        } else if !command.is_empty() && command.chars().all(|c| c.is_ascii_alphabetic()) {
            command.to_ascii_uppercase()
        } else {
            return Err(malformed("invalid command"));
        };
        let params = tokens.map(str::to_string).collect();

        Ok(Self {
            prefix,
            command,
            params,
            trailing,
        })
    }

    /// Numeric reply code, if the command is a three-digit numeric.
    pub fn numeric(&self) -> Option<u16> {
        if is_numeric(&self.command) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Nickname of the sender, if the message carries a prefix.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().map(Prefix::nickname)
    }

    /// Positional argument, counting the trailing parameter as the last one.
    pub fn arg(&self, index: usize) -> Option<&str> {
        match self.params.get(index) {
            Some(p) => Some(p.as_str()),
            None if index == self.params.len() => self.trailing.as_deref(),
            None => None,
        }
    }

    /// Number of positional arguments, trailing included.
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.trailing.is_some())
    }

    /// The final argument, which for most replies holds the human-readable text.
    pub fn last_arg(&self) -> Option<&str> {
        self.trailing
            .as_deref()
            .or_else(|| self.params.last().map(String::as_str))
    }
}

fn is_numeric(command: &str) -> bool {
    command.len() == 3 && command.bytes().all(|b| b.is_ascii_digit())
}

// The last middle parameter needs trailing syntax when it would not survive
// a re-parse as a plain token.
fn needs_trailing(param: &str) -> bool {
    param.is_empty() || param.contains(' ') || param.starts_with(':')
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;
        let count = self.params.len();
        for (i, param) in self.params.iter().enumerate() {
            if i + 1 == count && self.trailing.is_none() && needs_trailing(param) {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        if let Some(ref trailing) = self.trailing {
            write!(f, " :{}", trailing)?;
        }
        Ok(())
    }
}

/// Messages this client originates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Join { channel: String },
    Part { channel: String, reason: Option<String> },
    Quit { reason: Option<String> },
    Whois { nickname: String },
    List,
    Nick { nickname: String },
    Privmsg { target: String, text: String },
    User { username: String, mode: String, realname: String },
    Pong { token: String },
}

impl Outbound {
    pub fn command(&self) -> &'static str {
        match self {
            Outbound::Join { .. } => "JOIN",
            Outbound::Part { .. } => "PART",
            Outbound::Quit { .. } => "QUIT",
            Outbound::Whois { .. } => "WHOIS",
            Outbound::List => "LIST",
            Outbound::Nick { .. } => "NICK",
            Outbound::Privmsg { .. } => "PRIVMSG",
            Outbound::User { .. } => "USER",
            Outbound::Pong { .. } => "PONG",
        }
    }

    pub fn to_message(&self) -> Message {
        let (params, trailing) = match self {
            Outbound::Join { channel } => (vec![token(channel)], None),
            Outbound::Part { channel, reason } => (vec![token(channel)], reason.as_deref().map(text)),
            Outbound::Quit { reason } => (vec![], reason.as_deref().map(text)),
            Outbound::Whois { nickname } => (vec![token(nickname)], None),
            Outbound::List => (vec![], None),
            Outbound::Nick { nickname } => (vec![token(nickname)], None),
            Outbound::Privmsg { target, text: body } => (vec![token(target)], Some(text(body))),
            Outbound::User {
                username,
                mode,
                realname,
            } => (
                vec![token(username), token(mode), "*".to_string()],
                Some(text(realname)),
            ),
            Outbound::Pong { token: t } => (vec![], Some(text(t))),
        };
        Message::new(self.command(), params, trailing)
    }
}

impl From<Outbound> for Message {
    fn from(outbound: Outbound) -> Self {
        outbound.to_message()
    }
}

impl TryFrom<&Message> for Outbound {
    type Error = ();

    fn try_from(msg: &Message) -> Result<Self, ()> {
        let owned = |i| msg.arg(i).map(str::to_string).ok_or(());
        let outbound = match msg.command.as_str() {
            "JOIN" => Outbound::Join { channel: owned(0)? },
            "PART" => Outbound::Part {
                channel: owned(0)?,
                reason: msg.arg(1).map(str::to_string),
            },
            "QUIT" => Outbound::Quit {
                reason: msg.arg(0).map(str::to_string),
            },
            "WHOIS" => Outbound::Whois { nickname: owned(0)? },
            "LIST" => Outbound::List,
            "NICK" => Outbound::Nick { nickname: owned(0)? },
            "PRIVMSG" => Outbound::Privmsg {
                target: owned(0)?,
                text: owned(1)?,
            },
            "USER" => Outbound::User {
                username: owned(0)?,
                mode: owned(1)?,
                realname: owned(3)?,
            },
            "PONG" => Outbound::Pong { token: owned(0)? },
            _ => return Err(()),
        };
        Ok(outbound)
    }
}

/// Whether `s` can be sent as a middle parameter and read back unchanged:
/// non-empty, not starting with `:`, and free of spaces and line breaks.
pub fn is_middle_param(s: &str) -> bool {
    !s.is_empty() && !s.starts_with(':') && !s.contains([' ', '\r', '\n', '\0'])
}

// Middle parameters must not contain spaces or line breaks. Callers are
// expected to have checked `is_middle_param` for values they accept.
fn token(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '\r' | '\n' | '\0'))
        .collect()
}

// Trailing text may contain spaces but never a line break.
fn text(s: &str) -> String {
    s.replace(['\r', '\n'], " ").replace('\0', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_with_prefix() {
        let msg = Message::parse(":nick!user@host JOIN #chan").unwrap();
        assert_eq!(msg.command, "JOIN");
        assert_eq!(msg.source_nickname(), Some("nick"));
        let prefix = msg.prefix.as_ref().unwrap();
        assert_eq!(prefix.user.as_deref(), Some("user"));
        assert_eq!(prefix.host.as_deref(), Some("host"));
        assert_eq!(msg.params, vec!["#chan"]);
        assert_eq!(msg.trailing, None);
    }

    #[test]
    fn test_parse_numeric_with_trailing() {
        let msg = Message::parse(":server 322 me #chan 5 :Topic text").unwrap();
        assert_eq!(msg.command, "322");
        assert_eq!(msg.numeric(), Some(322));
        assert_eq!(msg.params, vec!["me", "#chan", "5"]);
        assert_eq!(msg.trailing.as_deref(), Some("Topic text"));
        assert_eq!(msg.arg(3), Some("Topic text"));
        assert_eq!(msg.arg(4), None);
        assert_eq!(msg.arg_count(), 4);
    }

    #[test]
    fn test_parse_without_prefix() {
        let msg = Message::parse("PING :irc.example.com\r\n").unwrap();
        assert!(msg.prefix.is_none());
        assert_eq!(msg.command, "PING");
        assert!(msg.params.is_empty());
        assert_eq!(msg.last_arg(), Some("irc.example.com"));
    }

    #[test]
    fn test_parse_lowercase_command_is_normalized() {
        let msg = Message::parse("privmsg #a :hi there").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.trailing.as_deref(), Some("hi there"));
    }

    #[test]
    fn test_parse_tolerates_repeated_spaces() {
        let msg = Message::parse(":srv  MODE   #chan +o  alice").unwrap();
        assert_eq!(msg.command, "MODE");
        assert_eq!(msg.params, vec!["#chan", "+o", "alice"]);
    }

    #[test]
    fn test_parse_trailing_keeps_inner_colons() {
        let msg = Message::parse(":a!b@c PRIVMSG #x :see: http://x :y").unwrap();
        assert_eq!(msg.trailing.as_deref(), Some("see: http://x :y"));
    }

    #[test]
    fn test_parse_empty_trailing() {
        let msg = Message::parse("PRIVMSG #x :").unwrap();
        assert_eq!(msg.trailing.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_malformed() {
        for line in ["", "   ", "\r\n", ":prefixonly", ": JOIN #x", ":p 12 x", ":p #bad", "12345"] {
            assert!(
                matches!(Message::parse(line), Err(ParseError::MalformedWireLine { .. })),
                "expected failure for {:?}",
                line
            );
        }
    }

    #[test]
    fn test_format_promotes_last_param() {
        let msg = Message::new("TOPIC", vec!["#x".into(), "new topic".into()], None);
        assert_eq!(msg.to_string(), "TOPIC #x :new topic");
        let msg = Message::new("TOPIC", vec!["#x".into(), "".into()], None);
        assert_eq!(msg.to_string(), "TOPIC #x :");
    }

    #[test]
    fn test_format_with_prefix() {
        let msg = Message::parse(":nick!user@host PRIVMSG #chan :hello world").unwrap();
        assert_eq!(msg.to_string(), ":nick!user@host PRIVMSG #chan :hello world");
    }

    #[test]
    fn test_outbound_shapes() {
        let cases = [
            (Outbound::Join { channel: "#rust".into() }, "JOIN #rust"),
            (
                Outbound::Part { channel: "#rust".into(), reason: None },
                "PART #rust",
            ),
            (
                Outbound::Part { channel: "#rust".into(), reason: Some("bye all".into()) },
                "PART #rust :bye all",
            ),
            (Outbound::Quit { reason: None }, "QUIT"),
            (Outbound::Quit { reason: Some("gone".into()) }, "QUIT :gone"),
            (Outbound::Whois { nickname: "alice".into() }, "WHOIS alice"),
            (Outbound::List, "LIST"),
            (Outbound::Nick { nickname: "bob".into() }, "NICK bob"),
            (
                Outbound::Privmsg { target: "#rust".into(), text: "hi there".into() },
                "PRIVMSG #rust :hi there",
            ),
            (
                Outbound::User {
                    username: "crab".into(),
                    mode: "0".into(),
                    realname: "Crab Chat".into(),
                },
                "USER crab 0 * :Crab Chat",
            ),
            (Outbound::Pong { token: "srv".into() }, "PONG :srv"),
        ];
        for (outbound, wire) in cases {
            let formatted = outbound.to_message().to_string();
            assert_eq!(formatted, wire);
            let reparsed = Message::parse(&formatted).unwrap();
            assert_eq!(reparsed.to_string(), formatted);
            assert_eq!(Outbound::try_from(&reparsed), Ok(outbound));
        }
    }

    #[test]
    fn test_outbound_strips_line_breaks() {
        let msg = Outbound::Privmsg {
            target: "#a".into(),
            text: "one\r\nQUIT :injected".into(),
        }
        .to_message();
        assert_eq!(msg.to_string(), "PRIVMSG #a :one  QUIT :injected");
        assert_eq!(
            Outbound::Join { channel: "#a b".into() }.to_message().to_string(),
            "JOIN #ab"
        );
    }

    #[test]
    fn test_middle_param_rules() {
        for ok in ["#rust", "bob", "0", "a:b"] {
            assert!(is_middle_param(ok), "{:?}", ok);
        }
        for bad in ["", ":x", "a b", "a\r\nb"] {
            assert!(!is_middle_param(bad), "{:?}", bad);
        }
    }

    #[test]
    fn test_round_trip_at_parameter_edges() {
        let cases = [
            Outbound::Privmsg { target: "a:b".into(), text: ":starts with colon".into() },
            Outbound::Privmsg { target: "#x".into(), text: String::new() },
            Outbound::Part { channel: "#x".into(), reason: Some(String::new()) },
            Outbound::User { username: "u".into(), mode: "0".into(), realname: String::new() },
        ];
        for outbound in cases {
            let formatted = outbound.to_message().to_string();
            let reparsed = Message::parse(&formatted).unwrap();
            assert_eq!(reparsed.to_string(), formatted);
            assert_eq!(Outbound::try_from(&reparsed), Ok(outbound));
        }
    }
}
