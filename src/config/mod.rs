//! Configuration for the keyhold agent
//!
//! Values come from a TOML file (see [`find_config_file`]); paths support
//! `~` and `$VAR` expansion, durations use forms like `"30m"` or `"1h"`.

mod file;

use crate::agent::{AllowAll, CommandConfirm, ConfirmHook, DenyAll};
use crate::error::{Error, Result};
use crate::utils::path::expand_path;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use file::{ConfigFile, ConfigPath, config_search_paths, find_config_file, load_config};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Where the agent listens
    #[serde(default = "default_socket")]
    pub socket: String,

    /// JSONL audit log; disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,

    /// Lifetime given to keys added without one, e.g. "8h"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_lifetime: Option<String>,

    /// Refuse connections from processes running as another user
    #[serde(default = "default_true")]
    pub require_same_user: bool,

    #[serde(default)]
    pub confirm: ConfirmConfig,
}

/// How keys with the confirm constraint are approved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmConfig {
    /// Answer used when no command is configured
    #[serde(default)]
    pub policy: ConfirmPolicy,

    /// Program asked for approval; exit status 0 approves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmPolicy {
    #[default]
    Deny,
    Allow,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            log_path: None,
            default_lifetime: None,
            require_same_user: true,
            confirm: ConfirmConfig::default(),
        }
    }
}

fn default_socket() -> String {
    "~/.keyhold/agent.sock".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Expand paths and parse durations
    pub fn expand(&self) -> Result<ExpandedConfig> {
        let default_lifetime = self
            .default_lifetime
            .as_deref()
            .map(parse_lifetime)
            .transpose()?;

        Ok(ExpandedConfig {
            socket: expand_path(&self.socket)?,
            log_path: self.log_path.as_deref().map(expand_path).transpose()?,
            default_lifetime,
            require_same_user: self.require_same_user,
            confirm: self.confirm.clone(),
        })
    }
}

impl ConfirmConfig {
    /// Hook the dispatcher consults for confirm-constrained keys
    pub fn build_hook(&self) -> Result<Arc<dyn ConfirmHook>> {
        if let Some(command) = &self.command {
            return Ok(Arc::new(CommandConfirm::parse(command)?));
        }
        Ok(match self.policy {
            ConfirmPolicy::Allow => Arc::new(AllowAll),
            ConfirmPolicy::Deny => Arc::new(DenyAll),
        })
    }
}

/// Configuration with paths expanded and durations parsed
#[derive(Debug, Clone)]
pub struct ExpandedConfig {
    pub socket: PathBuf,
    pub log_path: Option<PathBuf>,
    /// Seconds
    pub default_lifetime: Option<u32>,
    pub require_same_user: bool,
    pub confirm: ConfirmConfig,
}

/// Parse a duration string like "1h", "30m", "10s", "1d"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Config("Empty duration string".to_string()));
    }

    let (num_str, unit) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| (&s[..i], &s[i..]))
        .unwrap_or((s, ""));

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid duration number '{}': {}", num_str, e)))?;

    let multiplier: u64 = match unit.to_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 60 * 60,
        "d" | "day" | "days" => 60 * 60 * 24,
        "w" | "week" | "weeks" => 60 * 60 * 24 * 7,
        _ => {
            return Err(Error::Config(format!(
                "Unknown duration unit '{}' in '{}'",
                unit, s
            )));
        }
    };

    num.checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| Error::Config(format!("Duration '{}' is too long", s)))
}

/// Parse a key lifetime; it travels on the wire as u32 seconds
pub fn parse_lifetime(s: &str) -> Result<u32> {
    let secs = parse_duration(s)?.as_secs();
    u32::try_from(secs)
        .map_err(|_| Error::Config(format!("Lifetime '{}' exceeds {} seconds", s, u32::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2min").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("7days").unwrap(), Duration::from_secs(604800));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604800));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration(&format!("{}w", u64::MAX)).is_err());
    }

    #[test]
    fn test_parse_lifetime_range() {
        assert_eq!(parse_lifetime("8h").unwrap(), 28800);
        assert!(parse_lifetime("10000w").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.socket, "~/.keyhold/agent.sock");
        assert!(config.log_path.is_none());
        assert!(config.require_same_user);
        assert_eq!(config.confirm.policy, ConfirmPolicy::Deny);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
socket = "$XDG_RUNTIME_DIR/keyhold.sock"
log_path = "~/.keyhold/audit.jsonl"
default_lifetime = "4h"
require_same_user = false

[confirm]
policy = "allow"
command = "ssh-askpass -c"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.socket, "$XDG_RUNTIME_DIR/keyhold.sock");
        assert_eq!(config.default_lifetime.as_deref(), Some("4h"));
        assert!(!config.require_same_user);
        assert_eq!(config.confirm.policy, ConfirmPolicy::Allow);
        assert_eq!(config.confirm.command.as_deref(), Some("ssh-askpass -c"));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(toml::from_str::<Config>("[confirm]\npolicy = \"maybe\"\n").is_err());
    }

    #[test]
    fn test_expand() {
        let config = Config {
            socket: "/run/keyhold/agent.sock".to_string(),
            default_lifetime: Some("30m".to_string()),
            ..Config::default()
        };
        let expanded = config.expand().unwrap();
        assert_eq!(expanded.socket, PathBuf::from("/run/keyhold/agent.sock"));
        assert_eq!(expanded.default_lifetime, Some(1800));
        assert!(expanded.log_path.is_none());
    }

    #[test]
    fn test_build_hook() {
        use crate::agent::Operation;
        use crate::crypto::tests::ed25519_key_data;
        use crate::key::Key;

        let key = Key::new(ed25519_key_data(1), "k");
        let deny = ConfirmConfig::default().build_hook().unwrap();
        assert!(!deny.confirm(&key, Operation::Sign));

        let allow = ConfirmConfig {
            policy: ConfirmPolicy::Allow,
            command: None,
        };
        assert!(allow.build_hook().unwrap().confirm(&key, Operation::Sign));

        let broken = ConfirmConfig {
            policy: ConfirmPolicy::Allow,
            command: Some("'unterminated".to_string()),
        };
        assert!(broken.build_hook().is_err());
    }
}
