use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, Strictness};
use crate::error::ParseError;
use crate::extractors::{extractor_for, ExtractContext};
use crate::fields::{ExtractedFields, DATA0};
use crate::record::{RecordHeader, RecordWriter};
use crate::tags::{self, ExtractorFamily, FULL_DROPBOX_MARKER};

/// One crash event to turn into a record
#[derive(Debug, Clone, Default)]
pub struct CrashArtifactRequest {
    /// Directory holding the raw artifacts; the record is written here too.
    pub dir: PathBuf,
    /// Event tag as received, aliases allowed.
    pub tag: String,
    pub id: String,
    pub uptime: String,
    pub build: String,
    pub board: String,
    pub date: String,
    pub imei: String,
    pub operator: String,
    pub data_ready: bool,
}

/// What a successful parse produced.
#[derive(Debug, Clone, Serialize)]
pub struct ParseOutcome {
    pub record_path: PathBuf,
    /// Normalized tag written as `TYPE=`.
    pub tag: String,
    /// `None` for tags without an extractor (header-only record).
    pub family: Option<ExtractorFamily>,
    pub critical: bool,
    /// Set for `LOST_DROPBOX_*` events; the record carries `DATA0=full dropbox`
    /// ahead of the extracted fields.
    pub full_dropbox: bool,
    pub fields: ExtractedFields,
    /// Extractor failure tolerated in lenient mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
}

/// Turns crash artifact directories into `crashfile` records.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse one event directory and write its record.
    ///
    /// An invalid directory or unreadable serial fails before anything is
    /// written. Once the record exists it is always terminated, even when an
    /// extractor fails.
    pub fn parse(&self, request: &CrashArtifactRequest) -> Result<ParseOutcome, ParseError> {
        let dir = request.dir.as_path();
        if !dir.is_dir() {
            return Err(ParseError::InvalidDirectory {
                path: dir.to_path_buf(),
            });
        }

        let normalized = tags::normalize(&request.tag);
        let serial = self.read_serial()?;

        let header = RecordHeader {
            id: &request.id,
            serial: &serial,
            date: &request.date,
            uptime: &request.uptime,
            build: &request.build,
            board: &request.board,
            imei: &request.imei,
            tag: &normalized.tag,
            data_ready: request.data_ready,
            operator: &request.operator,
        };
        let mut record = RecordWriter::create(dir, &header)?;
        // The marker is its own line, ahead of whatever DATA0 the extractor finds
        if normalized.full_dropbox {
            record.write_field(DATA0, FULL_DROPBOX_MARKER)?;
        }

        let mut fields = ExtractedFields::new();

        let family = tags::family_for(&normalized.tag);
        let mut forced_critical = false;
        let mut failure = None;

        match family {
            Some(family) => {
                let ctx = ExtractContext {
                    dir,
                    tag: &normalized.tag,
                    legacy_fabric: self.config.uses_legacy_fabric(&request.board),
                };
                debug!(tag = %normalized.tag, %family, dir = %dir.display(), "running extractor");
                match extractor_for(family)(&ctx) {
                    Ok(extraction) => {
                        forced_critical = extraction.critical;
                        fields.merge(extraction.fields);
                    }
                    Err(e) => {
                        debug!(artifact = %e.path().display(), "extractor failed");
                        failure = Some(e);
                    }
                }
            }
            None => debug!(tag = %normalized.tag, "no extractor for tag, writing header only"),
        }

        let critical =
            forced_critical || tags::is_critical_tag(&normalized.tag, &self.config.critical_tags);

        record.write_fields(&fields)?;
        let record_path = record.finish(critical)?;
        self.fix_ownership(dir);

        let extraction_error = match failure {
            None => None,
            Some(source) => match self.config.strictness {
                Strictness::Strict => {
                    return Err(ParseError::Extraction {
                        tag: normalized.tag,
                        source,
                    })
                }
                Strictness::Lenient => {
                    warn!(
                        tag = %normalized.tag,
                        artifact = %source.path().display(),
                        error = %source,
                        "extraction failed, record kept"
                    );
                    Some(source.to_string())
                }
            },
        };

        info!(
            record = %record_path.display(),
            tag = %normalized.tag,
            critical,
            fields = fields.len(),
            "crash record written"
        );

        Ok(ParseOutcome {
            record_path,
            tag: normalized.tag,
            family,
            critical,
            full_dropbox: normalized.full_dropbox,
            fields,
            extraction_error,
        })
    }

    /// First line of the serial file, empty for an empty file.
    fn read_serial(&self) -> Result<String, ParseError> {
        let path = &self.config.serial_path;
        let serial_error = |source| ParseError::Serial {
            path: path.clone(),
            source,
        };

        let mut reader = BufReader::new(File::open(path).map_err(serial_error)?);
        let mut line = String::new();
        reader.read_line(&mut line).map_err(serial_error)?;
        Ok(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
    }

    /// Hand the directory to the configured owner. Failures are only logged.
    fn fix_ownership(&self, dir: &Path) {
        let Some(owner) = self.config.ownership.as_deref() else {
            return;
        };
        if self.config.removable_media.is_match(&dir.to_string_lossy()) {
            debug!(dir = %dir.display(), "removable media, ownership left unchanged");
            return;
        }

        match Command::new("chown").arg(owner).arg(dir).status() {
            Ok(status) if status.success() => {
                debug!(dir = %dir.display(), owner, "ownership updated")
            }
            Ok(status) => {
                warn!(dir = %dir.display(), owner, %status, "chown failed")
            }
            Err(e) => warn!(dir = %dir.display(), owner, error = %e, "chown could not be run"),
        }
    }
}
