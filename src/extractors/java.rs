//! Java exceptions written to the dropbox.
//!
//! Dropbox entries may be gzipped; the compressed copy is preferred over a
//! plain one of the same kind. Object addresses such as `@1a2b3c4d` vary
//! between otherwise identical crashes and are stripped from every field.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead};
use tracing::debug;

use super::{pattern, ExtractContext};
use crate::error::ExtractError;
use crate::fields::{ExtractedFields, Extraction, Slot, DATA0, DATA1, DATA2, DATA3};
use crate::locator::find_first_artifact;
use crate::matcher::{awk_opt, sep, LinePattern};
use crate::readers::{scan_artifact, LineReader};

pub(crate) static PROCESS_LINE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token(".*Process:.*", ":", 1).expect("failed to compile process pattern")
});
pub(crate) static SUBJECT_LINE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token(".*Subject:.*", ":", 1).expect("failed to compile subject pattern")
});
static CAUSED_BY: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::from_left("^Caused by:.*", ":", 1).expect("failed to compile caused-by pattern")
});
static FRAME_LINE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token(".*at .*", "at ", 1).expect("failed to compile frame pattern")
});

static ADDRESS_64: Lazy<Regex> = Lazy::new(|| pattern("@[0-9a-fA-F]{16}"));
static ADDRESS_32: Lazy<Regex> = Lazy::new(|| pattern("@[0-9a-fA-F]{8}"));

const TRANSACTION_TOO_LARGE: &str = "android.os.TransactionTooLargeException";
const TRANSACTION_TOO_LARGE_PARCEL: &str =
    "android.os.TransactionTooLargeException: data parcel size";
const NATIVE_PREFIX: &str = "app_native_crash";
const FRAME_BUDGET: usize = 4;

/// Kind of dropbox crash entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JavaCrashKind {
    App,
    SystemServer,
    AppNative,
}

struct Candidate {
    kind: JavaCrashKind,
    gzip: Lazy<Regex>,
    plain: Lazy<Regex>,
}

static CANDIDATES: [Candidate; 3] = [
    Candidate {
        kind: JavaCrashKind::App,
        gzip: Lazy::new(|| pattern(".*_app_crash.*.txt.gz")),
        plain: Lazy::new(|| pattern(".*_app_crash.*.txt")),
    },
    Candidate {
        kind: JavaCrashKind::SystemServer,
        gzip: Lazy::new(|| pattern("system_server_crash.*.txt.gz")),
        plain: Lazy::new(|| pattern("system_server_crash.*.txt")),
    },
    Candidate {
        kind: JavaCrashKind::AppNative,
        gzip: Lazy::new(|| pattern(".*_app_native_crash.*.txt.gz")),
        plain: Lazy::new(|| pattern(".*_app_native_crash.*.txt")),
    },
];

/// Remove 64-bit then 32-bit `@address` suffixes.
pub fn strip_addresses(value: &str) -> String {
    let value = ADDRESS_64.replace_all(value, "");
    ADDRESS_32.replace_all(&value, "").into_owned()
}

/// Method of a `at pkg.Class.method(File.java:1)` frame.
pub(crate) fn frame_method<'a>(frames: &LinePattern, line: &'a str) -> Option<&'a str> {
    awk_opt(frames.extract(line), &sep::OPEN_PAREN, 0)
}

/// Raw values gathered from one exception report.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct JavaCrashReport {
    pub process: String,
    /// Message of the innermost `Caused by:` line.
    pub caused_by: String,
    /// Line right before the first frame, the exception itself.
    pub exception: String,
    pub frames: String,
}

pub fn scan_java_crash<R: BufRead>(lines: &mut LineReader<R>) -> io::Result<JavaCrashReport> {
    let mut process = Slot::first();
    let mut caused_by = Slot::last();
    let mut exception = String::new();
    let mut frames: Vec<String> = Vec::new();
    let mut previous = String::new();

    while let Some(line) = lines.next_line()? {
        if process.is_open() {
            process.offer(PROCESS_LINE.extract(&line));
        }
        caused_by.offer(CAUSED_BY.extract(&line));

        if frames.len() < FRAME_BUDGET {
            if let Some(method) = frame_method(&FRAME_LINE, &line) {
                if frames.is_empty() {
                    exception = std::mem::take(&mut previous);
                }
                frames.push(method.to_string());
            }
        }
        previous = line;
    }

    Ok(JavaCrashReport {
        process: process.into_value(),
        caused_by: caused_by.into_value(),
        exception,
        frames: frames.join(" "),
    })
}

/// Record fields for a report of the given kind.
pub fn fields_for(report: JavaCrashReport, kind: JavaCrashKind) -> ExtractedFields {
    let mut fields = ExtractedFields::new();
    fields.set(DATA0, strip_addresses(&report.process));

    let summary = if report.caused_by.is_empty() {
        report.exception
    } else {
        report.caused_by
    };
    let summary = strip_addresses(&summary);

    if kind == JavaCrashKind::AppNative {
        fields.set(DATA1, format!("{}{}", NATIVE_PREFIX, summary));
    } else {
        let trimmed = summary.trim();
        match trimmed.strip_prefix(TRANSACTION_TOO_LARGE_PARCEL) {
            Some(_) => {
                // Parcel size moves to DATA3 so the signature stays stable
                let size = trimmed
                    .get(TRANSACTION_TOO_LARGE.len() + 2..)
                    .unwrap_or_default();
                fields.set(DATA1, TRANSACTION_TOO_LARGE);
                fields.set(DATA3, size);
            }
            None => fields.set(DATA1, summary.as_str()),
        }
    }

    fields.set(DATA2, strip_addresses(&report.frames));
    fields
}

pub fn extract(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    for candidate in &CANDIDATES {
        let found = find_first_artifact(&[&*candidate.gzip, &*candidate.plain], ctx.dir);
        if let Some(path) = found {
            debug!(report = %path.display(), kind = ?candidate.kind, "parsing java crash");
            let report = scan_artifact(&path, scan_java_crash)?;
            return Ok(fields_for(report, candidate.kind).into());
        }
    }
    Ok(Extraction::empty())
}
