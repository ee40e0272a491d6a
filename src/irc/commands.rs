//! User command interpreter.
//!
//! Turns one line of user input, typed in some conversation context, into an
//! [`Interpreted`] value: a connection request, an outbound protocol message,
//! or a purely local action.

use crate::irc::connection::{AddressError, ServerAddress};
use crate::irc::{is_channel_name, is_middle_param, Outbound};
use thiserror::Error;

/// Result of interpreting one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpreted {
    /// Open a connection. Produces no wire message.
    Connect(ServerAddress),
    Send(Outbound),
    Local(LocalCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    Help,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command: /{0}")]
    Unrecognised(String),
    #[error("/{verb}: {reason}")]
    InvalidArguments { verb: &'static str, reason: String },
    #[error("not in a channel or conversation")]
    NoContext,
    #[error("nothing to send")]
    Empty,
}

impl CommandError {
    fn invalid(verb: &'static str, reason: impl Into<String>) -> Self {
        CommandError::InvalidArguments {
            verb,
            reason: reason.into(),
        }
    }
}

/// Supported verbs with their usage and a short description.
pub const COMMANDS: &[(&str, &str)] = &[
    ("/connect <host[:port]>", "Connect to a server (alias: /server)"),
    ("/join <#channel>", "Join a channel (alias: /j)"),
    ("/part [#channel] [reason]", "Leave a channel (alias: /leave)"),
    ("/msg <target> <text>", "Send a private message"),
    ("/nick <name>", "Change nickname"),
    ("/whois <nick>", "Look up a user"),
    ("/quit [reason]", "Disconnect from the server"),
    ("/list", "List channels on the server"),
    ("/help", "Show this help (alias: /commands)"),
    ("/clear", "Clear the current view"),
];

pub fn help_lines() -> Vec<String> {
    let width = COMMANDS.iter().map(|(usage, _)| usage.len()).max().unwrap_or(0);
    let mut lines = vec!["Available commands:".to_string()];
    lines.extend(
        COMMANDS
            .iter()
            .map(|(usage, about)| format!("  {:width$}  {}", usage, about, width = width)),
    );
    lines
}

/// Interpret `input` typed in `context`, the name of the current channel or
/// private conversation (empty for the server console).
///
/// Verbs are case-insensitive. Text without a leading slash is sent to the
/// current context; `//text` sends `/text` literally.
pub fn interpret(input: &str, context: &str) -> Result<Interpreted, CommandError> {
    let input = input.trim_end_matches(['\r', '\n']);
    if input.trim().is_empty() {
        return Err(CommandError::Empty);
    }

    let trimmed = input.trim_start();
    let command = match trimmed.strip_prefix('/') {
        Some(rest) if rest.starts_with('/') => return say(rest, context),
        Some(rest) => rest.trim_end(),
        None => return say(input, context),
    };

    let (verb, rest) = next_word(command);

    match verb.to_lowercase().as_str() {
        "connect" | "server" => {
            if rest.is_empty() {
                return Err(CommandError::invalid("connect", "usage: /connect <host[:port]>"));
            }
            if rest.contains(char::is_whitespace) {
                return Err(CommandError::invalid("connect", "expected a single host[:port]"));
            }
            ServerAddress::parse(rest)
                .map(Interpreted::Connect)
                .map_err(|e: AddressError| CommandError::invalid("connect", e.to_string()))
        }
        "join" | "j" => {
            let (channel, _) = next_word(rest);
            if channel.is_empty() {
                return Err(CommandError::invalid("join", "usage: /join <#channel>"));
            }
            let channel = if is_channel_name(channel) {
                channel.to_string()
            } else {
                format!("#{}", channel)
            };
            if channel.len() < 2 || channel.contains(',') || !is_middle_param(&channel) {
                return Err(CommandError::invalid("join", format!("invalid channel name: {}", channel)));
            }
            Ok(Interpreted::Send(Outbound::Join { channel }))
        }
        "part" | "leave" => {
            let (first, tail) = next_word(rest);
            let (channel, reason) = if is_channel_name(first) {
                (first, tail)
            } else if is_channel_name(context) {
                (context, rest)
            } else {
                return Err(CommandError::invalid("part", "usage: /part <#channel> [reason]"));
            };
            let reason = Some(reason).filter(|r| !r.is_empty()).map(str::to_string);
            Ok(Interpreted::Send(Outbound::Part {
                channel: channel.to_string(),
                reason,
            }))
        }
        "msg" => {
            let (target, text) = next_word(rest);
            if target.is_empty() || text.is_empty() {
                return Err(CommandError::invalid("msg", "usage: /msg <target> <text>"));
            }
            if !is_middle_param(target) {
                return Err(CommandError::invalid("msg", format!("invalid target: {}", target)));
            }
            Ok(Interpreted::Send(Outbound::Privmsg {
                target: target.to_string(),
                text: text.to_string(),
            }))
        }
        "nick" => {
            let (nickname, extra) = next_word(rest);
            if nickname.is_empty() {
                return Err(CommandError::invalid("nick", "usage: /nick <name>"));
            }
            if !extra.is_empty() {
                return Err(CommandError::invalid("nick", "nicknames cannot contain spaces"));
            }
            if !is_valid_nickname(nickname) {
                return Err(CommandError::invalid("nick", format!("invalid nickname: {}", nickname)));
            }
            Ok(Interpreted::Send(Outbound::Nick {
                nickname: nickname.to_string(),
            }))
        }
        "whois" => {
            let (nickname, _) = next_word(rest);
            if nickname.is_empty() {
                return Err(CommandError::invalid("whois", "usage: /whois <nick>"));
            }
            if !is_middle_param(nickname) {
                return Err(CommandError::invalid("whois", format!("invalid nickname: {}", nickname)));
            }
            Ok(Interpreted::Send(Outbound::Whois {
                nickname: nickname.to_string(),
            }))
        }
        "quit" => {
            let reason = Some(rest).filter(|r| !r.is_empty()).map(str::to_string);
            Ok(Interpreted::Send(Outbound::Quit { reason }))
        }
        "list" => Ok(Interpreted::Send(Outbound::List)),
        "help" | "commands" => Ok(Interpreted::Local(LocalCommand::Help)),
        "clear" => Ok(Interpreted::Local(LocalCommand::Clear)),
        "" => Err(CommandError::Unrecognised(String::new())),
        other => Err(CommandError::Unrecognised(other.to_string())),
    }
}

// Split off the first whitespace-delimited word; the remainder has its
// leading whitespace removed.
fn next_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}

fn say(text: &str, context: &str) -> Result<Interpreted, CommandError> {
    if context.is_empty() {
        return Err(CommandError::NoContext);
    }
    Ok(Interpreted::Send(Outbound::Privmsg {
        target: context.to_string(),
        text: text.to_string(),
    }))
}

// RFC 2812 nickname: a letter or special first, then letters, digits,
// specials, or '-'.
fn is_valid_nickname(nick: &str) -> bool {
    let special = |c: char| "[]\\`_^{|}".contains(c);
    let mut chars = nick.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || special(first) => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || special(c) || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(input: &str, context: &str) -> Outbound {
        match interpret(input, context) {
            Ok(Interpreted::Send(outbound)) => outbound,
            other => panic!("expected Send, got {:?}", other),
        }
    }

    #[test]
    fn test_join_without_context() {
        assert_eq!(
            send("/join #test", ""),
            Outbound::Join {
                channel: "#test".into()
            }
        );
    }

    #[test]
    fn test_join_adds_sigil_and_alias() {
        assert_eq!(send("/J rust", ""), Outbound::Join { channel: "#rust".into() });
        assert_eq!(send("/join &local", ""), Outbound::Join { channel: "&local".into() });
        assert!(matches!(
            interpret("/join", ""),
            Err(CommandError::InvalidArguments { verb: "join", .. })
        ));
    }

    #[test]
    fn test_plain_text_in_channel() {
        assert_eq!(
            send("hello", "#test"),
            Outbound::Privmsg {
                target: "#test".into(),
                text: "hello".into()
            }
        );
    }

    #[test]
    fn test_plain_text_without_context() {
        assert_eq!(interpret("hello", ""), Err(CommandError::NoContext));
    }

    #[test]
    fn test_unknown_verb() {
        assert_eq!(
            interpret("/bogus", "#test"),
            Err(CommandError::Unrecognised("bogus".into()))
        );
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(interpret("   ", "#test"), Err(CommandError::Empty));
        assert_eq!(interpret("", ""), Err(CommandError::Empty));
    }

    #[test]
    fn test_double_slash_sends_literally() {
        assert_eq!(
            send("//shrug", "#test"),
            Outbound::Privmsg {
                target: "#test".into(),
                text: "/shrug".into()
            }
        );
    }

    #[test]
    fn test_connect_verbs() {
        let expected = ServerAddress::parse("irc.example.com:6697").unwrap();
        assert_eq!(
            interpret("/server irc.example.com:6697", ""),
            Ok(Interpreted::Connect(expected.clone()))
        );
        assert_eq!(
            interpret("/CONNECT irc.example.com:6697", "#x"),
            Ok(Interpreted::Connect(expected))
        );
        match interpret("/connect irc.example.com", "") {
            Ok(Interpreted::Connect(addr)) => assert_eq!(addr.port, 6667),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            interpret("/connect host:notaport", ""),
            Err(CommandError::InvalidArguments { verb: "connect", .. })
        ));
        assert!(matches!(
            interpret("/server", ""),
            Err(CommandError::InvalidArguments { verb: "connect", .. })
        ));
    }

    #[test]
    fn test_part_forms() {
        assert_eq!(
            send("/part", "#here"),
            Outbound::Part { channel: "#here".into(), reason: None }
        );
        assert_eq!(
            send("/leave #there see you", "#here"),
            Outbound::Part { channel: "#there".into(), reason: Some("see you".into()) }
        );
        assert_eq!(
            send("/part gone fishing", "#here"),
            Outbound::Part { channel: "#here".into(), reason: Some("gone fishing".into()) }
        );
        assert_eq!(
            send("/part #there", ""),
            Outbound::Part { channel: "#there".into(), reason: None }
        );
        assert!(matches!(
            interpret("/part", ""),
            Err(CommandError::InvalidArguments { verb: "part", .. })
        ));
        assert!(matches!(
            interpret("/part", "alice"),
            Err(CommandError::InvalidArguments { verb: "part", .. })
        ));
    }

    #[test]
    fn test_msg_requires_text() {
        assert_eq!(
            send("/msg alice hi there", ""),
            Outbound::Privmsg { target: "alice".into(), text: "hi there".into() }
        );
        assert!(matches!(
            interpret("/msg alice", ""),
            Err(CommandError::InvalidArguments { verb: "msg", .. })
        ));
        assert!(matches!(
            interpret("/msg", ""),
            Err(CommandError::InvalidArguments { verb: "msg", .. })
        ));
    }

    #[test]
    fn test_nick_validation() {
        assert_eq!(send("/nick [cool]_guy", ""), Outbound::Nick { nickname: "[cool]_guy".into() });
        for bad in ["/nick", "/nick 9lives", "/nick two words", "/nick -dash"] {
            assert!(
                matches!(interpret(bad, ""), Err(CommandError::InvalidArguments { verb: "nick", .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_whois_quit_list() {
        assert_eq!(send("/whois bob", ""), Outbound::Whois { nickname: "bob".into() });
        assert!(interpret("/whois", "").is_err());
        assert_eq!(send("/quit", ""), Outbound::Quit { reason: None });
        assert_eq!(send("/QUIT see ya", ""), Outbound::Quit { reason: Some("see ya".into()) });
        assert_eq!(send("/list", ""), Outbound::List);
    }

    #[test]
    fn test_local_verbs() {
        assert_eq!(interpret("/help", ""), Ok(Interpreted::Local(LocalCommand::Help)));
        assert_eq!(interpret("/Commands", "#x"), Ok(Interpreted::Local(LocalCommand::Help)));
        assert_eq!(interpret("/clear", "#x"), Ok(Interpreted::Local(LocalCommand::Clear)));
    }

    #[test]
    fn test_help_lists_every_verb() {
        let lines = help_lines();
        assert_eq!(lines.len(), COMMANDS.len() + 1);
        assert!(lines.iter().any(|l| l.contains("/whois <nick>")));
    }

    #[test]
    fn test_repeated_whitespace_between_arguments() {
        assert_eq!(
            send("/msg  bob   hi there", ""),
            Outbound::Privmsg { target: "bob".into(), text: "hi there".into() }
        );
        assert_eq!(send("/nick  bob", ""), Outbound::Nick { nickname: "bob".into() });
        assert_eq!(send("/whois\tbob", ""), Outbound::Whois { nickname: "bob".into() });
        assert_eq!(send("/join  #test", ""), Outbound::Join { channel: "#test".into() });
        assert_eq!(
            send("/part  #test   later", ""),
            Outbound::Part { channel: "#test".into(), reason: Some("later".into()) }
        );
        assert_eq!(
            interpret("/connect   irc.example.com", ""),
            Ok(Interpreted::Connect(ServerAddress::parse("irc.example.com").unwrap()))
        );
    }

    #[test]
    fn test_colon_leading_target_is_rejected() {
        assert!(matches!(
            interpret("/msg :x hi", ""),
            Err(CommandError::InvalidArguments { verb: "msg", .. })
        ));
        assert!(matches!(
            interpret("/whois :bob", ""),
            Err(CommandError::InvalidArguments { verb: "whois", .. })
        ));
        assert!(matches!(
            interpret("/nick :bob", ""),
            Err(CommandError::InvalidArguments { verb: "nick", .. })
        ));

        // Every accepted command survives a trip over the wire.
        for input in ["/msg a:b :hi", "/join :x", "/part #a :bye", "/whois b:c"] {
            let outbound = send(input, "");
            let wire = outbound.to_message().to_string();
            let reparsed = crate::irc::Message::parse(&wire).unwrap();
            assert_eq!(reparsed.to_string(), wire);
            assert_eq!(Outbound::try_from(&reparsed), Ok(outbound));
        }
    }
}
