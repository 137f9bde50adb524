use clap::ValueEnum;
use regex::Regex;
use std::env;
use std::path::PathBuf;

use crate::tags::{DEFAULT_CRITICAL_TAGS, DEFAULT_LEGACY_FABRIC_BOARDS};

/// Environment override for the crash log root.
pub const LOGS_ROOT_ENV: &str = "CRASHPARSE_LOGS_ROOT";
pub const DEFAULT_LOGS_ROOT: &str = "/logs";
pub const SERIAL_FILE_NAME: &str = "uuid.txt";
pub const DEFAULT_OWNER: &str = "system.log";
pub const DEFAULT_REMOVABLE_MEDIA_PATTERN: &str = ".*mnt.*sdcard.*";

/// What happens when an extractor cannot read its artifact
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Strictness {
    /// The record is terminated and the parse reports failure.
    #[default]
    Strict,
    /// The failure is logged and the parse still succeeds.
    Lenient,
}

/// Which fabric dump layout to parse
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FabricLayout {
    /// Legacy layout for the boards listed in `legacy_fabric_boards`, sectioned otherwise.
    #[default]
    ByBoard,
    /// Always the flat `DWn:` / error-line layout.
    Legacy,
    /// Always the section-based layout.
    Sectioned,
}

/// Everything the engine needs besides the request itself
///
/// Built once by the caller and passed to [`crate::Engine::new`]; there is
/// no process-wide state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub logs_root: PathBuf,
    /// File whose first line is the device serial (`SN=`).
    pub serial_path: PathBuf,
    pub legacy_fabric_boards: Vec<String>,
    pub fabric_layout: FabricLayout,
    pub critical_tags: Vec<String>,
    pub strictness: Strictness,
    /// Owner handed to `chown` on the artifact directory; `None` disables the fix-up.
    pub ownership: Option<String>,
    /// Directories matching this pattern never get their owner changed.
    pub removable_media: Regex,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_logs_root(PathBuf::from(DEFAULT_LOGS_ROOT))
    }
}

impl EngineConfig {
    /// Defaults rooted at `logs_root`, with the serial file inside it.
    pub fn with_logs_root(logs_root: PathBuf) -> Self {
        Self {
            serial_path: logs_root.join(SERIAL_FILE_NAME),
            logs_root,
            legacy_fabric_boards: DEFAULT_LEGACY_FABRIC_BOARDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fabric_layout: FabricLayout::default(),
            critical_tags: DEFAULT_CRITICAL_TAGS.iter().map(|s| s.to_string()).collect(),
            strictness: Strictness::default(),
            ownership: Some(DEFAULT_OWNER.to_string()),
            removable_media: Regex::new(DEFAULT_REMOVABLE_MEDIA_PATTERN)
                .expect("default removable media pattern is valid"),
        }
    }

    /// Defaults, honouring `CRASHPARSE_LOGS_ROOT` when set.
    pub fn from_env() -> Self {
        match env::var(LOGS_ROOT_ENV) {
            Ok(root) if !root.trim().is_empty() => Self::with_logs_root(PathBuf::from(root)),
            _ => Self::default(),
        }
    }

    pub fn with_serial_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.serial_path = path.into();
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_fabric_layout(mut self, layout: FabricLayout) -> Self {
        self.fabric_layout = layout;
        self
    }

    pub fn with_ownership(mut self, owner: Option<String>) -> Self {
        self.ownership = owner;
        self
    }

    /// Whether `board` should be parsed with the legacy fabric layout.
    pub fn uses_legacy_fabric(&self, board: &str) -> bool {
        match self.fabric_layout {
            FabricLayout::Legacy => true,
            FabricLayout::Sectioned => false,
            FabricLayout::ByBoard => self.legacy_fabric_boards.iter().any(|b| b == board),
        }
    }
}
