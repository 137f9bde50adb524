use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{EngineConfig, FabricLayout, Strictness};

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "CRASHPARSE_CONFIG";

/// Owner values that turn the ownership fix-up off.
const OWNER_DISABLED: &[&str] = &["", "none", "off"];

/// Settings read from a crashparse INI file
///
/// Every field is optional; anything left unset keeps the value it already
/// has in the [`EngineConfig`] the file is applied to.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigFile {
    pub logs_root: Option<PathBuf>,
    pub serial: Option<PathBuf>,
    pub strictness: Option<Strictness>,
    pub fabric_layout: Option<FabricLayout>,
    pub legacy_fabric_boards: Option<Vec<String>>,
    pub critical_tags: Option<Vec<String>>,
    pub owner: Option<String>,
    pub skip_pattern: Option<String>,
}

impl ConfigFile {
    /// User-level config location: `$XDG_CONFIG_HOME/crashparse/config.ini`,
    /// falling back to `~/.config/crashparse/config.ini`.
    pub fn get_user_config_path() -> PathBuf {
        let xdg_config = env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".config"))
                    .unwrap_or_else(|_| PathBuf::from(".config"))
            });
        xdg_config.join("crashparse").join("config.ini")
    }

    /// Config file to use: explicit path, then `$CRASHPARSE_CONFIG`, then the
    /// user file if it exists.
    pub fn find_config_path(custom_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = custom_path {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        let user = Self::get_user_config_path();
        user.exists().then_some(user)
    }

    /// Load the configuration selected by [`ConfigFile::find_config_path`].
    ///
    /// An explicitly named file that cannot be read is an error; no file at
    /// all yields an empty configuration.
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<Self> {
        match Self::find_config_path(custom_path) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse_ini_content(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse INI content: `[section]` headers, `key = value` pairs, `#`/`;` comments.
    pub fn parse_ini_content(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut current_section = String::new();

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].trim().to_string();
                continue;
            }

            let Some(eq_pos) = line.find('=') else {
                continue;
            };
            let key = line[..eq_pos].trim();
            let value = line[eq_pos + 1..].trim();

            match (current_section.as_str(), key) {
                ("paths", "logs_root") => config.logs_root = Some(PathBuf::from(value)),
                ("paths", "serial") => config.serial = Some(PathBuf::from(value)),
                ("parsing", "strictness") => {
                    config.strictness = Some(parse_choice::<Strictness>(key, value)?)
                }
                ("parsing", "fabric_layout") => {
                    config.fabric_layout = Some(parse_choice::<FabricLayout>(key, value)?)
                }
                ("parsing", "legacy_fabric_boards") => {
                    config.legacy_fabric_boards = Some(parse_list(value))
                }
                ("parsing", "critical_tags") => config.critical_tags = Some(parse_list(value)),
                ("ownership", "owner") => config.owner = Some(value.to_string()),
                ("ownership", "skip_pattern") => config.skip_pattern = Some(value.to_string()),
                // Unknown sections and keys are ignored
                _ => {}
            }
        }

        Ok(config)
    }

    /// Overlay these settings onto `config`.
    pub fn apply(&self, mut config: EngineConfig) -> Result<EngineConfig> {
        if let Some(root) = &self.logs_root {
            config.serial_path = root.join(crate::config::SERIAL_FILE_NAME);
            config.logs_root = root.clone();
        }
        if let Some(serial) = &self.serial {
            config.serial_path = serial.clone();
        }
        if let Some(strictness) = self.strictness {
            config.strictness = strictness;
        }
        if let Some(layout) = self.fabric_layout {
            config.fabric_layout = layout;
        }
        if let Some(boards) = &self.legacy_fabric_boards {
            config.legacy_fabric_boards = boards.clone();
        }
        if let Some(tags) = &self.critical_tags {
            config.critical_tags = tags.clone();
        }
        if let Some(owner) = &self.owner {
            config.ownership = if OWNER_DISABLED.contains(&owner.to_ascii_lowercase().as_str()) {
                None
            } else {
                Some(owner.clone())
            };
        }
        if let Some(pattern) = &self.skip_pattern {
            config.removable_media = Regex::new(pattern)
                .with_context(|| format!("Invalid ownership skip_pattern: {}", pattern))?;
        }
        Ok(config)
    }
}

fn parse_choice<T: ValueEnum>(key: &str, value: &str) -> Result<T> {
    T::from_str(value, true).map_err(|_| anyhow!("Invalid value '{}' for {}", value, key))
}

/// Comma or whitespace separated list.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
