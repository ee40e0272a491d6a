//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Every field has a sensible default so the client works out of the box.

use serde::{Deserialize, Serialize};

use super::nickname::generate_nickname;
use crate::irc::connection::{Identity, IdentityError, ServerAddress, DEFAULT_PORT};
use crate::session::SessionOptions;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            servers: default_servers(),
            behavior: BehaviorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// The registration identity used for servers without their own nickname.
    pub fn identity(&self) -> Identity {
        Identity {
            nickname: self.identity.nickname.clone(),
            username: self.identity.username.clone(),
            realname: self.identity.realname.clone(),
            mode: self.identity.mode.clone(),
        }
    }

    pub fn server_identity(&self, server: &ServerConfig) -> Identity {
        let mut identity = self.identity();
        if let Some(ref nick) = server.nickname {
            identity.nickname = nick.clone();
        }
        identity
    }

    /// Session behaviour, with the server's auto-join list when given one.
    pub fn session_options(&self, server: Option<&ServerConfig>) -> SessionOptions {
        SessionOptions {
            auto_create_private: self.behavior.auto_create_private,
            group_by_role: self.behavior.group_by_role,
            autojoin: server.map(|s| s.autojoin.clone()).unwrap_or_default(),
        }
    }

    /// Check every identity the config can produce, the per-server nickname
    /// overrides included.
    pub fn validate(&self) -> Result<(), IdentityError> {
        self.identity().validate()?;
        for server in &self.servers {
            self.server_identity(server).validate()?;
        }
        Ok(())
    }

    /// Look up a configured server by its label, case-insensitively.
    pub fn find_server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

/// Who the client says it is during registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_realname")]
    pub realname: String,
    /// The `USER` mode parameter.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Port used when an address omits one.
    #[serde(default = "default_port")]
    pub default_port: u16,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nickname: default_nickname(),
            username: default_username(),
            realname: default_realname(),
            mode: default_mode(),
            default_port: default_port(),
        }
    }
}

/// A saved server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// User-facing label (e.g. `"libera"`).
    pub name: String,
    /// Hostname or IP address of the IRC server.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Overrides the identity nickname for this server.
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub autojoin: Vec<String>,
    #[serde(default)]
    pub auto_connect: bool,
}

impl ServerConfig {
    pub fn address(&self) -> ServerAddress {
        ServerAddress {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Client behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_quit_message")]
    pub quit_message: String,
    #[serde(default = "default_part_message")]
    pub part_message: String,
    #[serde(default = "default_true")]
    pub auto_create_private: bool,
    #[serde(default = "default_true")]
    pub group_by_role: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            quit_message: default_quit_message(),
            part_message: default_part_message(),
            auto_create_private: true,
            group_by_role: true,
        }
    }
}

/// Chat transcript settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_true")]
    pub log_channels: bool,
    #[serde(default)]
    pub log_queries: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            log_channels: true,
            log_queries: false,
        }
    }
}

fn default_servers() -> Vec<ServerConfig> {
    [
        ("libera", "irc.libera.chat"),
        ("oftc", "irc.oftc.net"),
        ("efnet", "irc.efnet.org"),
    ]
    .into_iter()
    .map(|(name, host)| ServerConfig {
        name: name.into(),
        host: host.into(),
        port: default_port(),
        nickname: None,
        autojoin: vec![],
        auto_connect: false,
    })
    .collect()
}

fn default_nickname() -> String {
    generate_nickname()
}
fn default_username() -> String {
    "crabchat".to_string()
}
fn default_realname() -> String {
    "CrabChat user".to_string()
}
fn default_mode() -> String {
    "0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_true() -> bool {
    true
}
fn default_quit_message() -> String {
    "CrabChat".to_string()
}
fn default_part_message() -> String {
    "Leaving".to_string()
}
fn default_log_dir() -> String {
    "~/.local/share/crabchat/logs".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.identity.mode, "0");
        assert_eq!(config.identity.default_port, 6667);
        assert!(!config.identity.nickname.is_empty());
        assert_eq!(config.servers.len(), 3);
        assert!(config.behavior.auto_create_private);
        assert!(config.behavior.group_by_role);
        assert!(!config.logging.enabled);
    }

    #[test]
    fn test_partial_server_entry() {
        let config: AppConfig = toml::from_str(
            r##"
            [identity]
            nickname = "crab"

            [[servers]]
            name = "local"
            host = "localhost"
            autojoin = ["#test"]
            "##,
        )
        .unwrap();
        assert_eq!(config.servers.len(), 1);
        let server = &config.servers[0];
        assert_eq!(server.port, 6667);
        assert!(!server.auto_connect);
        assert_eq!(config.server_identity(server).nickname, "crab");

        let options = config.session_options(config.find_server("LOCAL"));
        assert_eq!(options.autojoin, vec!["#test".to_string()]);
        assert!(config.session_options(None).autojoin.is_empty());
    }

    #[test]
    fn test_server_nickname_override() {
        let mut config = AppConfig::default();
        config.identity.nickname = "global".into();
        let server = ServerConfig {
            name: "x".into(),
            host: "irc.x.org".into(),
            port: 7000,
            nickname: Some("local".into()),
            autojoin: vec![],
            auto_connect: true,
        };
        assert_eq!(config.server_identity(&server).nickname, "local");
        assert_eq!(config.identity().nickname, "global");
        assert_eq!(server.address().to_string(), "irc.x.org:7000");
    }

    #[test]
    fn test_validate_checks_server_overrides() {
        let mut config = AppConfig::default();
        assert_eq!(config.validate(), Ok(()));
        config.servers[1].nickname = Some("two words".into());
        let err = config.validate().unwrap_err();
        assert_eq!(err.field, "nickname");
        assert_eq!(err.value, "two words");
    }
}
