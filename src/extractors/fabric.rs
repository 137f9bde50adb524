//! SoC fabric error dumps.
//!
//! Two layouts exist in the field. Older boards write a flat list of
//! decoded error lines (or raw `DWn:` registers after a hardware watchdog),
//! newer ones write titled sections which are captured a few lines at a time.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead};
use std::path::Path;
use tracing::debug;

use super::{pattern, ExtractContext};
use crate::error::ExtractError;
use crate::fields::{ExtractedFields, Extraction, Slot, DATA0, DATA1, DATA2, DATA4};
use crate::locator::find_artifact;
use crate::matcher::{awk, sep, LinePattern};
use crate::readers::{scan_artifact, LineReader};

static FABRIC_DUMP: Lazy<Regex> = Lazy::new(|| pattern(".*ipanic_fabric_err.*"));

// Flat layout
static HW_WDT_EXPIRED: Lazy<Regex> = Lazy::new(|| pattern(".*HW WDT expired.*"));
static DW0: Lazy<Regex> = Lazy::new(|| pattern(".*DW0:.*"));
static DW1: Lazy<Regex> = Lazy::new(|| pattern(".*DW1:.*"));
static DW11: Lazy<Regex> = Lazy::new(|| pattern(".*DW11:.*"));
static ERROR_LINE: Lazy<Regex> = Lazy::new(|| pattern(".*[erroir|:].*"));
static NOT_ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| pattern(".*(Fabric Error|summary|Additional|Decoded).*"));

// Sectioned layout
static SUMMARY_HEADER: Lazy<Regex> = Lazy::new(|| pattern("Summary of Fabric Error detail:"));
static ERROR_LOG_HEADER: Lazy<Regex> = Lazy::new(|| pattern(".*ERROR LOG.*"));
static ADDRESS_HOLE_HEADER: Lazy<Regex> = Lazy::new(|| pattern(".*Address Hole.*"));
static DUMP_LENGTH: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token(".*Length of fabric error file:.*", ":", 1)
        .expect("failed to compile dump length pattern")
});

/// Error lines kept for `DATA2` in the flat layout, after the first two.
const FLAT_DETAIL_LINES: usize = 4;
const SECTION_LINES: usize = 4;
const ADDRESS_HOLE_PREFIX: &str = "Address hole : ";
const SCU_WATCHDOG_TAG: &str = "SCUWDT";

/// Lines that carry content inside a section: not a bullet, not a rule, not blank.
pub fn is_data_line(line: &str) -> bool {
    !line.starts_with("* ") && !line.starts_with("---------") && !line.trim().is_empty()
}

/// Flat-layout scan, `forced` when the dump reports an expired hardware watchdog.
pub fn scan_flat<R: BufRead>(lines: &mut LineReader<R>, forced: bool) -> io::Result<ExtractedFields> {
    let mut fields = ExtractedFields::new();

    if forced {
        let mut registers = [Slot::first(), Slot::first(), Slot::first()];
        let patterns: [&Regex; 3] = [&DW0, &DW1, &DW11];
        while let Some(line) = lines.next_line()? {
            for (slot, pattern) in registers.iter_mut().zip(patterns) {
                if slot.is_open() {
                    slot.offer(pattern.find(&line).map(|m| m.as_str()));
                }
            }
        }
        let [dw0, dw1, dw11] = registers;
        fields.set(DATA0, dw0.into_value());
        fields.set(DATA1, dw1.into_value());
        fields.set(DATA2, dw11.into_value());
        return Ok(fields);
    }

    let mut errors = Vec::new();
    let mut first = Slot::first();
    while let Some(line) = lines.next_line()? {
        if ERROR_LINE.is_match(&line) && !NOT_ERROR_LINE.is_match(&line) {
            if first.is_open() {
                first.offer(awk(&line, &sep::OPEN_BRACKET, 0));
            }
            errors.push(line);
        }
    }

    let second = match errors.len() {
        0 => "",
        1 => errors[0].as_str(),
        _ => errors[1].as_str(),
    };
    let detail_end = errors.len().min(2 + FLAT_DETAIL_LINES);
    let detail = errors.get(2..detail_end).map(|d| d.join(" ")).unwrap_or_default();

    fields.set(DATA0, first.into_value());
    fields.set(DATA1, awk(second, &sep::OPEN_PAREN, 0).unwrap_or_default());
    fields.set(DATA2, detail);
    Ok(fields)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionState {
    Seeking,
    Capturing,
    Done,
}

/// A titled block of the sectioned layout, captured up to `limit` data lines.
#[derive(Debug)]
struct Section {
    header: &'static Regex,
    state: SectionState,
    lines: Vec<String>,
    limit: usize,
}

impl Section {
    fn new(header: &'static Regex, limit: usize) -> Self {
        Self {
            header,
            state: SectionState::Seeking,
            lines: Vec::new(),
            limit,
        }
    }

    fn started(&self) -> bool {
        self.state != SectionState::Seeking
    }

    fn close(&mut self) {
        self.state = SectionState::Done;
    }

    fn feed(&mut self, line: &str) {
        match self.state {
            SectionState::Seeking => {
                if self.header.is_match(line) {
                    self.lines.clear();
                    self.state = SectionState::Capturing;
                }
            }
            SectionState::Capturing => {
                if !is_data_line(line) {
                    return;
                }
                if self.lines.len() < self.limit {
                    self.lines.push(line.to_string());
                } else {
                    self.state = SectionState::Done;
                }
            }
            SectionState::Done => {}
        }
    }
}

/// Sectioned-layout scan. For `SCUWDT` the `DW4:`/`DW19:` registers replace `DATA2`.
pub fn scan_sectioned<R: BufRead>(
    lines: &mut LineReader<R>,
    scu_watchdog: bool,
) -> io::Result<ExtractedFields> {
    let mut summary = Section::new(&SUMMARY_HEADER, SECTION_LINES);
    let mut hole = Section::new(&ADDRESS_HOLE_HEADER, SECTION_LINES);
    let mut error_log = Section::new(&ERROR_LOG_HEADER, SECTION_LINES);
    let mut registers = String::new();
    let mut length = Slot::first();

    while let Some(line) = lines.next_line()? {
        // The summary ends where the error log begins
        if summary.state == SectionState::Capturing && error_log.started() {
            summary.close();
        }
        summary.feed(&line);
        if summary.lines.len() == SECTION_LINES {
            summary.close();
        }
        hole.feed(&line);
        error_log.feed(&line);

        if scu_watchdog && (line.starts_with("DW4:") || line.starts_with("DW19:")) {
            registers.push_str(&line);
            registers.push_str(" / ");
        }
        if length.is_open() {
            length.offer(DUMP_LENGTH.extract(&line));
        }
    }

    let (data0, data1) = summary.lines.split_at(summary.lines.len().min(2));
    let detail = if scu_watchdog {
        registers
    } else if !hole.lines.is_empty() {
        format!("{}{}", ADDRESS_HOLE_PREFIX, hole.lines.join(" / "))
    } else {
        error_log.lines.join(" / ")
    };

    let mut fields = ExtractedFields::new();
    fields.set(DATA0, data0.join(" / "));
    fields.set(DATA1, data1.join(" / "));
    fields.set(DATA2, detail);
    fields.set(DATA4, length.into_value());
    Ok(fields)
}

fn extract_flat(path: &Path) -> Result<ExtractedFields, ExtractError> {
    let forced = scan_artifact(path, |lines| {
        while let Some(line) = lines.next_line()? {
            if HW_WDT_EXPIRED.is_match(&line) {
                return Ok(true);
            }
        }
        Ok(false)
    })?;
    debug!(forced, "flat fabric layout");
    scan_artifact(path, |lines| scan_flat(lines, forced))
}

pub fn extract(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    let Some(path) = find_artifact(&FABRIC_DUMP, ctx.dir) else {
        return Ok(Extraction::empty());
    };

    let fields = if ctx.legacy_fabric {
        extract_flat(&path)?
    } else {
        let scu_watchdog = ctx.tag == SCU_WATCHDOG_TAG;
        scan_artifact(&path, |lines| scan_sectioned(lines, scu_watchdog))?
    };
    Ok(fields.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn reader(input: &str) -> LineReader<Cursor<String>> {
        LineReader::new(Cursor::new(input.to_string()))
    }

    const SECTIONED: &str = "\
* Fabric dump
Summary of Fabric Error detail:
---------
Error type: timeout
Initiator: IA

Target: DDR
Cmd: read
Extra: ignored
ERROR LOG
* header
ERR_A
ERR_B
ERR_C
ERR_D
ERR_E
Length of fabric error file: 1024
";

    #[test]
    fn test_data_line_filter() {
        assert!(is_data_line("Error type: timeout"));
        assert!(!is_data_line("* bullet"));
        assert!(!is_data_line("------------"));
        assert!(!is_data_line("   "));
    }

    #[test]
    fn test_sectioned_layout() {
        let fields = scan_sectioned(&mut reader(SECTIONED), false).unwrap();
        assert_eq!(fields.get(DATA0), Some("Error type: timeout / Initiator: IA"));
        assert_eq!(fields.get(DATA1), Some("Target: DDR / Cmd: read"));
        assert_eq!(fields.get(DATA2), Some("ERR_A / ERR_B / ERR_C / ERR_D"));
        assert_eq!(fields.get(DATA4), Some(" 1024"));
    }

    #[test]
    fn test_summary_stops_at_error_log() {
        let input = "\
Summary of Fabric Error detail:
only line
ERROR LOG
E1
";
        let fields = scan_sectioned(&mut reader(input), false).unwrap();
        // The header line itself is still part of the summary
        assert_eq!(fields.get(DATA0), Some("only line / ERROR LOG"));
        assert_eq!(fields.get(DATA1), Some(""));
        assert_eq!(fields.get(DATA2), Some("E1"));
        assert_eq!(fields.get(DATA4), Some(""));
    }

    #[test]
    fn test_address_hole_replaces_error_log() {
        let input = "\
ERROR LOG
E1
Address Hole detected
hole 1
hole 2
";
        let fields = scan_sectioned(&mut reader(input), false).unwrap();
        assert_eq!(
            fields.get(DATA2),
            Some("Address hole : hole 1 / hole 2")
        );
    }

    #[test]
    fn test_single_address_hole_line_replaces_error_log() {
        let input = "\
ERROR LOG
E1
E2
Address Hole detected
hole 1
";
        let fields = scan_sectioned(&mut reader(input), false).unwrap();
        assert_eq!(fields.get(DATA2), Some("Address hole : hole 1"));
    }

    #[test]
    fn test_scu_watchdog_registers() {
        let input = "\
ERROR LOG
E1
DW4: 0x1
DW19: 0x2
DW5: 0x3
";
        let fields = scan_sectioned(&mut reader(input), true).unwrap();
        assert_eq!(fields.get(DATA2), Some("DW4: 0x1 / DW19: 0x2 / "));
    }

    #[test]
    fn test_flat_layout() {
        let input = "\
Fabric Error summary
Decoded info
first error [0x10]
second error (detail)
third: a
fourth: b
fifth: c
sixth: d
seventh: e
";
        let fields = scan_flat(&mut reader(input), false).unwrap();
        assert_eq!(fields.get(DATA0), Some("first error "));
        assert_eq!(fields.get(DATA1), Some("second error "));
        assert_eq!(
            fields.get(DATA2),
            Some("third: a fourth: b fifth: c sixth: d")
        );
    }

    #[test]
    fn test_flat_single_line() {
        let fields = scan_flat(&mut reader("only error (x)\n"), false).unwrap();
        assert_eq!(fields.get(DATA0), Some("only error (x)"));
        assert_eq!(fields.get(DATA1), Some("only error "));
        assert_eq!(fields.get(DATA2), Some(""));
    }

    #[test]
    fn test_hw_watchdog_registers() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("ipanic_fabric_err0"),
            "HW WDT expired\nDW0: 0xa\nDW1: 0xb\nDW11: 0xc\nDW0: 0xd\n",
        )
        .unwrap();
        let ctx = ExtractContext {
            dir: dir.path(),
            tag: "FABRICERR",
            legacy_fabric: true,
        };

        let extraction = extract(&ctx).unwrap();
        assert_eq!(extraction.fields.get(DATA0), Some("DW0: 0xa"));
        assert_eq!(extraction.fields.get(DATA1), Some("DW1: 0xb"));
        assert_eq!(extraction.fields.get(DATA2), Some("DW11: 0xc"));
    }

    #[test]
    fn test_layout_follows_context() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ipanic_fabric_err0"), SECTIONED).unwrap();
        let mut ctx = ExtractContext {
            dir: dir.path(),
            tag: "FABRICERR",
            legacy_fabric: false,
        };
        assert!(extract(&ctx).unwrap().fields.contains(DATA4));

        ctx.legacy_fabric = true;
        assert!(!extract(&ctx).unwrap().fields.contains(DATA4));
    }
}
