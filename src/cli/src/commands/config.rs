//! `campus config`: persistent CLI settings in `~/.campus/config.toml`.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::output::{self, OutputFormat, Tone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// Portal base URL
    ApiUrl,
    /// Name of the access-token cookie
    AccessCookie,
    /// Name of the refresh-token cookie
    RefreshCookie,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    Set { key: ConfigKey, value: String },
    Get { key: ConfigKey },
    /// Print every stored value
    Show,
    /// Delete the config file
    Reset {
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_cookie: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_cookie: Option<String>,
}

impl CliConfig {
    fn slot(&mut self, key: ConfigKey) -> &mut Option<String> {
        match key {
            ConfigKey::ApiUrl => &mut self.api_url,
            ConfigKey::AccessCookie => &mut self.access_cookie,
            ConfigKey::RefreshCookie => &mut self.refresh_cookie,
        }
    }

    fn path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("no home directory")?;
        Ok(home.join(".campus").join("config.toml"))
    }

    fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).with_context(|| format!("parsing {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
    }
}

/// A stored value, or `None` if unset or the file is unreadable.
pub fn load_value(key: ConfigKey) -> Option<String> {
    CliConfig::load().ok().and_then(|mut cfg| cfg.slot(key).take())
}

fn key_name(key: ConfigKey) -> String {
    key.to_possible_value()
        .map(|v| v.get_name().to_owned())
        .unwrap_or_default()
}

pub fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            let mut cfg = CliConfig::load()?;
            *cfg.slot(key) = Some(value.clone());
            cfg.save()?;
            output::say(Tone::Ok, format!("{} = {}", key_name(key), value));
        }

        ConfigCommands::Get { key } => match load_value(key) {
            Some(value) if format == OutputFormat::Table => println!("{}", value),
            Some(value) => output::document(&serde_json::json!({ "key": key_name(key), "value": value }), format)?,
            None => output::say(Tone::Warn, format!("{} is not set", key_name(key))),
        },

        ConfigCommands::Show => {
            let cfg = CliConfig::load()?;
            if cfg == CliConfig::default() {
                output::say(Tone::Info, "Nothing configured");
            } else if format == OutputFormat::Table {
                print!("{}", toml::to_string_pretty(&cfg)?);
            } else {
                output::document(&cfg, format)?;
            }
        }

        ConfigCommands::Reset { force: false } => {
            output::say(Tone::Warn, "Pass --force to delete the config file");
        }

        ConfigCommands::Reset { force: true } => {
            let path = CliConfig::path()?;
            if path.exists() {
                std::fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
            }
            output::say(Tone::Ok, "Config cleared");
        }
    }
    Ok(())
}
