// Core library for the crashparse crash-artifact engine

pub use config::{EngineConfig, FabricLayout, Strictness};
pub use engine::{CrashArtifactRequest, Engine, ParseOutcome};
pub use error::{ExtractError, ParseError};
pub use fields::{ExtractedFields, FieldKey};
pub use tags::ExtractorFamily;

pub mod cli;
pub mod config;
pub mod config_file;
pub mod decompression;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod fields;
pub mod locator;
pub mod logging;
pub mod matcher;
pub mod platform;
pub mod readers;
pub mod record;
pub mod tags;
