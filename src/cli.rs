// Command-line interface for the crashparse binary

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::{EngineConfig, FabricLayout, Strictness};
use crate::config_file::ConfigFile;
use crate::engine::CrashArtifactRequest;

#[derive(Parser, Debug)]
#[command(name = "crashparse")]
#[command(about = "Turn raw crash artifacts into a crashfile record")]
#[command(
    long_about = "Turn raw crash artifacts into a crashfile record\n\nThe artifacts in DIR are scanned according to --tag and the resulting\nKEY=VALUE record is written to DIR/crashfile.\n\nEXAMPLES:\n  crashparse /logs/crashlog0 --tag IPANIC --board moorefield\n  crashparse /logs/crashlog3 --tag JAVACRASH --data-ready --json"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Directory holding the crash artifacts
    pub dir: PathBuf,

    /// Event tag, e.g. IPANIC, TOMBSTONE, LOST_DROPBOX_ANR
    #[arg(short = 't', long = "tag")]
    pub tag: String,

    /// Event identifier written as ID=
    #[arg(long = "id", default_value = "", help_heading = "Event Metadata")]
    pub id: String,

    #[arg(long = "uptime", default_value = "", help_heading = "Event Metadata")]
    pub uptime: String,

    #[arg(long = "build", default_value = "", help_heading = "Event Metadata")]
    pub build: String,

    /// Board name; also selects the fabric layout in by-board mode
    #[arg(long = "board", default_value = "", help_heading = "Event Metadata")]
    pub board: String,

    #[arg(long = "date", default_value = "", help_heading = "Event Metadata")]
    pub date: String,

    #[arg(long = "imei", default_value = "", help_heading = "Event Metadata")]
    pub imei: String,

    #[arg(long = "operator", default_value = "", help_heading = "Event Metadata")]
    pub operator: String,

    /// Mark the artifacts as complete (DATA_READY=1)
    #[arg(long = "data-ready", help_heading = "Event Metadata")]
    pub data_ready: bool,

    /// Config file (default: $CRASHPARSE_CONFIG or ~/.config/crashparse/config.ini)
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Crash log root holding the serial file
    #[arg(long = "logs-root", value_name = "DIR", help_heading = "Configuration")]
    pub logs_root: Option<PathBuf>,

    /// File whose first line is the device serial
    #[arg(long = "serial", value_name = "FILE", help_heading = "Configuration")]
    pub serial: Option<PathBuf>,

    /// Behaviour when an artifact cannot be read
    #[arg(long = "strictness", value_enum, help_heading = "Configuration")]
    pub strictness: Option<Strictness>,

    #[arg(long = "fabric-layout", value_enum, help_heading = "Configuration")]
    pub fabric_layout: Option<FabricLayout>,

    /// Leave directory ownership unchanged
    #[arg(long = "no-chown", help_heading = "Configuration")]
    pub no_chown: bool,

    /// Print the parse outcome as JSON on stdout
    #[arg(long = "json", help_heading = "Output Options")]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn into_request(self) -> CrashArtifactRequest {
        CrashArtifactRequest {
            dir: self.dir,
            tag: self.tag,
            id: self.id,
            uptime: self.uptime,
            build: self.build,
            board: self.board,
            date: self.date,
            imei: self.imei,
            operator: self.operator,
            data_ready: self.data_ready,
        }
    }

    /// Engine configuration: environment, then config file, then flags.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let file = ConfigFile::load_with_custom_path(self.config.as_deref())?;
        self.apply_overrides(file.apply(EngineConfig::from_env())?)
    }

    fn apply_overrides(&self, mut config: EngineConfig) -> Result<EngineConfig> {
        if let Some(root) = &self.logs_root {
            config.serial_path = root.join(crate::config::SERIAL_FILE_NAME);
            config.logs_root = root.clone();
        }
        if let Some(serial) = &self.serial {
            config = config.with_serial_path(serial);
        }
        if let Some(strictness) = self.strictness {
            config = config.with_strictness(strictness);
        }
        if let Some(layout) = self.fabric_layout {
            config = config.with_fabric_layout(layout);
        }
        if self.no_chown {
            config = config.with_ownership(None);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_invocation() {
        let cli = Cli::try_parse_from(["crashparse", "/logs/crashlog0", "--tag", "IPANIC"]).unwrap();
        assert_eq!(cli.dir, PathBuf::from("/logs/crashlog0"));
        assert_eq!(cli.tag, "IPANIC");
        assert!(!cli.data_ready);
        assert_eq!(cli.verbose, 0);

        let request = cli.into_request();
        assert_eq!(request.tag, "IPANIC");
        assert_eq!(request.board, "");
    }

    #[test]
    fn test_tag_is_required() {
        assert!(Cli::try_parse_from(["crashparse", "/logs/crashlog0"]).is_err());
    }

    #[test]
    fn test_metadata_and_options() {
        let cli = Cli::try_parse_from([
            "crashparse",
            "/logs/crashlog1",
            "-t",
            "FABRICERR",
            "--board",
            "redhookbay",
            "--id",
            "abc",
            "--data-ready",
            "--strictness",
            "lenient",
            "--fabric-layout",
            "sectioned",
            "--no-chown",
            "--json",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.strictness, Some(Strictness::Lenient));
        assert_eq!(cli.fabric_layout, Some(FabricLayout::Sectioned));
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);

        let config = cli.apply_overrides(EngineConfig::default()).unwrap();
        assert_eq!(config.strictness, Strictness::Lenient);
        assert_eq!(config.ownership, None);
        assert!(!config.uses_legacy_fabric("redhookbay"));

        let request = cli.into_request();
        assert!(request.data_ready);
        assert_eq!(request.id, "abc");
    }

    #[test]
    fn test_invalid_strictness_rejected() {
        let result = Cli::try_parse_from([
            "crashparse",
            "/d",
            "--tag",
            "ANR",
            "--strictness",
            "sloppy",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_serial_flag_wins_over_logs_root() {
        let cli = Cli::try_parse_from([
            "crashparse",
            "/d",
            "--tag",
            "ANR",
            "--logs-root",
            "/data/logs",
            "--serial",
            "/factory/sn",
        ])
        .unwrap();
        let config = cli.apply_overrides(EngineConfig::default()).unwrap();
        assert_eq!(config.logs_root, PathBuf::from("/data/logs"));
        assert_eq!(config.serial_path, PathBuf::from("/factory/sn"));
    }
}
