//! Command-line interface for the `gort` binary.

use clap::{Parser, Subcommand};
use gort_domain::config::Config;

/// Gort — a chat-ops controller.
#[derive(Debug, Parser)]
#[command(name = "gort", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the controller (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Provision the first user on a fresh controller and write a
    /// client profile for it.
    Bootstrap {
        /// Controller base URL, e.g. https://gort.example.com:4000
        url: String,
        /// Accept a plain http:// URL.
        #[arg(long)]
        allow_insecure: bool,
        /// Profile name to write (defaults to "gort").
        #[arg(long, default_value = "gort")]
        profile: String,
        /// Admin password; prompted for (or generated server-side) when
        /// omitted.
        #[arg(long)]
        password: Option<String>,
    },
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `GORT_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the
/// path that was used.
///
/// This is shared by `serve` and the `config` subcommands so the logic
/// lives in one place.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("GORT_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

/// Print validation issues; returns false when any is an error.
pub fn validate(config: &Config, config_path: &str) -> bool {
    use gort_domain::config::ConfigSeverity;

    let issues = config.validate();
    if issues.is_empty() {
        println!("{config_path}: OK");
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    !issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error)
}

/// Dump the resolved configuration as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => print!("{rendered}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}
