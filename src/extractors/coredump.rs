//! Coredump summaries and the upstream `_crashdata` passthrough.
//!
//! Modem and VMM coredumps ship a small text summary next to the binary
//! dump. When it is missing, whatever the upstream collector already wrote
//! into `*_crashdata` is used instead.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead};
use std::path::Path;

use super::{pattern, ExtractContext};
use crate::error::ExtractError;
use crate::fields::{ExtractedFields, Extraction, FieldKey, Slot, DATA0, DATA1, DATA2, DATA3};
use crate::locator::{find_artifact, find_first_artifact};
use crate::matcher::LinePattern;
use crate::readers::{scan_artifact, LineReader};

static CRASHDATA: Lazy<Regex> = Lazy::new(|| pattern(".*_crashdata"));
static VMM_SUMMARY: Lazy<Regex> = Lazy::new(|| pattern("coredump_.*.txt"));
static MODEM_SUMMARY_GZ: Lazy<Regex> = Lazy::new(|| pattern(r"coredump_.*txt\.gz"));
static MODEM_SUMMARY: Lazy<Regex> = Lazy::new(|| pattern("coredump_.*txt"));

fn labelled(label: &str, separator: &str) -> LinePattern {
    LinePattern::from_left(&format!("{}{}.*", label, separator), separator, 1)
        .expect("failed to compile coredump field pattern")
}

static FILENAME: Lazy<LinePattern> = Lazy::new(|| labelled("Filename", ":"));
static LINE_NUMBER: Lazy<LinePattern> = Lazy::new(|| labelled("Line number", ":"));
static LOG_DATA: Lazy<LinePattern> = Lazy::new(|| labelled("Log data", ":"));
static VECTOR: Lazy<LinePattern> = Lazy::new(|| labelled("Vector", ":"));

/// Keys copied from `*_crashdata`, in record order.
const PASSTHROUGH_KEYS: [FieldKey; 7] = [
    FieldKey::Data(0),
    FieldKey::Data(1),
    FieldKey::Data(2),
    FieldKey::Data(3),
    FieldKey::Data(4),
    FieldKey::Data(5),
    FieldKey::ModemVersionUsed,
];

/// Marker expected downstream for modem coredump records.
pub const MODEM_COREDUMP_MARKER: &str = "CD_INFO";

/// First match of each pattern over the whole stream, empty for a miss.
fn first_matches<R: BufRead, const N: usize>(
    lines: &mut LineReader<R>,
    patterns: [&LinePattern; N],
) -> io::Result<[String; N]> {
    let mut slots: [Slot; N] = std::array::from_fn(|_| Slot::first());
    while let Some(line) = lines.next_line()? {
        for (slot, pattern) in slots.iter_mut().zip(patterns) {
            if slot.is_open() {
                slot.offer(pattern.extract(&line));
            }
        }
    }
    Ok(slots.map(Slot::into_value))
}

/// `KEY=value` lines of an upstream crashdata file.
pub fn scan_crashdata<R: BufRead>(lines: &mut LineReader<R>) -> io::Result<ExtractedFields> {
    let patterns: Vec<LinePattern> = PASSTHROUGH_KEYS
        .iter()
        .map(|key| labelled(&key.to_string(), "="))
        .collect();
    let refs: [&LinePattern; 7] = std::array::from_fn(|i| &patterns[i]);
    let values = first_matches(lines, refs)?;

    let mut fields = ExtractedFields::new();
    for (key, value) in PASSTHROUGH_KEYS.into_iter().zip(values) {
        fields.set(key, value);
    }
    Ok(fields)
}

fn generic_fields(dir: &Path) -> Result<ExtractedFields, ExtractError> {
    match find_artifact(&CRASHDATA, dir) {
        Some(path) => scan_artifact(&path, scan_crashdata),
        None => Ok(ExtractedFields::new()),
    }
}

/// `APIMR` / `APCOREDUMP`: passthrough of the upstream fields.
pub fn extract_generic(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    Ok(generic_fields(ctx.dir)?.into())
}

/// `VMMTRAP`: file, line and log message of the trap.
pub fn extract_vmm_trap(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    let Some(path) = find_artifact(&VMM_SUMMARY, ctx.dir) else {
        return extract_generic(ctx);
    };
    let [file, line, log] = scan_artifact(&path, |lines| {
        first_matches(lines, [&*FILENAME, &*LINE_NUMBER, &*LOG_DATA])
    })?;

    let mut fields = ExtractedFields::new();
    fields.set(DATA0, file);
    fields.set(DATA1, line);
    fields.set(DATA2, log);
    Ok(fields.into())
}

/// `MPANIC`: assertion location and exception vector of the modem.
pub fn extract_modem_panic(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    let summary = find_first_artifact(&[&*MODEM_SUMMARY_GZ, &*MODEM_SUMMARY], ctx.dir);
    let Some(path) = summary else {
        return extract_generic(ctx);
    };
    let [file, line, vector] = scan_artifact(&path, |lines| {
        first_matches(lines, [&*FILENAME, &*LINE_NUMBER, &*VECTOR])
    })?;

    let mut fields = ExtractedFields::new();
    fields.set(DATA0, format!("id: l:{} c:{}", line.trim(), file.trim()));
    fields.set(DATA1, vector);
    fields.set(DATA3, MODEM_COREDUMP_MARKER);
    Ok(fields.into())
}
