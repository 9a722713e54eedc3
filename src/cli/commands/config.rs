//! Config command - show or validate configuration

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use crate::cli::args::ConfigArgs;
use crate::config::{Config, ConfigFile, config_search_paths};

/// Commented example written by `config --show-default`
fn example_config() -> &'static str {
    r#"# keyhold configuration file

# Where the agent listens (env vars and ~ are expanded)
socket = "~/.keyhold/agent.sock"

# JSONL audit log of key use and changes
# log_path = "~/.keyhold/audit.jsonl"

# Lifetime for keys added without one
# default_lifetime = "8h"

# Refuse connections from other local users
require_same_user = true

[confirm]
# Answer for keys added with --confirm when no command is set: "deny" or "allow"
policy = "deny"
# Program asked for approval; exit status 0 approves.
# KEYHOLD_OPERATION, KEYHOLD_FINGERPRINT, KEYHOLD_COMMENT and
# KEYHOLD_KEY_TYPE are set in its environment.
# command = "ssh-askpass -c"
"#
}

fn render(config: &Config, format: &str) -> Result<String> {
    Ok(match format {
        "json" => serde_json::to_string_pretty(config)?,
        _ => toml::to_string_pretty(config).context("Failed to render configuration")?,
    })
}

/// Execute the config command
pub async fn execute(args: ConfigArgs, config_path: Option<PathBuf>) -> Result<()> {
    if args.paths {
        println!("Config search paths (in priority order):");
        for (i, cp) in config_search_paths().iter().enumerate() {
            let exists = if cp.path.is_file() { " [exists]" } else { "" };
            println!("  {}. {}{}", i + 1, cp.description, exists);
            println!("     {}", cp.path.display());
        }
        return Ok(());
    }

    if args.show_default {
        match args.format.as_str() {
            "json" => println!("{}", render(&Config::default(), "json")?),
            _ => print!("{}", example_config()),
        }
        return Ok(());
    }

    let loaded = ConfigFile::load(config_path.as_deref())?;
    let source = if loaded.path.as_os_str().is_empty() {
        "defaults".to_string()
    } else {
        loaded.path.display().to_string()
    };

    if args.validate {
        let expanded = loaded
            .config
            .expand()
            .with_context(|| format!("Configuration is invalid: {}", source))?;
        if let Err(e) = loaded.config.confirm.build_hook() {
            bail!("Configuration is invalid: {}: {}", source, e);
        }
        println!("Configuration is valid: {}", source);
        println!("  socket: {}", expanded.socket.display());
        return Ok(());
    }

    if args.format != "json" {
        println!("# Configuration from: {}", source);
    }
    print!("{}", render(&loaded.config, &args.format)?);
    if args.format == "json" {
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses_to_default() {
        let parsed: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_render_roundtrip() {
        let config = Config {
            default_lifetime: Some("2h".to_string()),
            ..Config::default()
        };
        let rendered = render(&config, "toml").unwrap();
        assert_eq!(toml::from_str::<Config>(&rendered).unwrap(), config);
        assert!(render(&config, "json").unwrap().contains("\"default_lifetime\": \"2h\""));
    }
}
