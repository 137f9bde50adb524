// tests/common/mod.rs
// Shared fixtures for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use crashparse::{CrashArtifactRequest, Engine, EngineConfig, Strictness};

pub const SERIAL: &str = "MEDFIELD0001";

/// A crash log root with a serial file and one event directory.
pub struct LogsRoot {
    pub root: TempDir,
    pub event_dir: PathBuf,
}

impl LogsRoot {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create logs root");
        fs::write(root.path().join("uuid.txt"), format!("{}\n", SERIAL))
            .expect("Failed to write serial file");
        let event_dir = root.path().join("crashlog0");
        fs::create_dir(&event_dir).expect("Failed to create event directory");
        Self { root, event_dir }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write an artifact into the event directory.
    pub fn artifact(&self, name: &str, content: &str) -> PathBuf {
        let path = self.event_dir.join(name);
        fs::write(&path, content).expect("Failed to write artifact");
        path
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig::with_logs_root(self.path().to_path_buf()).with_ownership(None)
    }

    pub fn engine(&self) -> Engine {
        Engine::new(self.config())
    }

    pub fn lenient_engine(&self) -> Engine {
        Engine::new(self.config().with_strictness(Strictness::Lenient))
    }

    pub fn request(&self, tag: &str) -> CrashArtifactRequest {
        CrashArtifactRequest {
            dir: self.event_dir.clone(),
            tag: tag.to_string(),
            id: "7f3c2a10b4d5e6f70812".to_string(),
            uptime: "0001:02:03".to_string(),
            build: "eng.build.20160101".to_string(),
            board: "moorefield".to_string(),
            date: "2016-01-01/12:00:00".to_string(),
            imei: "350000000000000".to_string(),
            operator: "none".to_string(),
            data_ready: true,
        }
    }

    pub fn record(&self) -> String {
        fs::read_to_string(self.event_dir.join("crashfile")).expect("Failed to read crashfile")
    }

    pub fn record_lines(&self) -> Vec<String> {
        self.record().lines().map(str::to_string).collect()
    }

    /// Value of `KEY=` in the record, if present.
    pub fn record_value(&self, key: &str) -> Option<String> {
        let prefix = format!("{}=", key);
        self.record_lines()
            .into_iter()
            .find_map(|line| line.strip_prefix(&prefix).map(str::to_string))
    }
}

/// Run the built binary with a clean configuration environment.
pub fn run_crashparse(args: &[&str], logs_root: &Path) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_crashparse"))
        .args(args)
        .env("CRASHPARSE_LOGS_ROOT", logs_root)
        .env("XDG_CONFIG_HOME", logs_root.join("no-config"))
        .env_remove("CRASHPARSE_CONFIG")
        .env_remove("CRASHPARSE_LOG")
        .output()
        .expect("Failed to run crashparse");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}
