//! Native crash tombstones.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead};
use tracing::debug;

use super::{pattern, ExtractContext};
use crate::error::ExtractError;
use crate::fields::{ExtractedFields, Extraction, Slot, DATA0, DATA1, DATA2, DATA3};
use crate::locator::find_first_artifact;
use crate::matcher::{awk, awk_collapsed, awk_opt, sep, LinePattern};
use crate::readers::{scan_artifact, LineReader};

static TOMBSTONE: Lazy<Regex> = Lazy::new(|| pattern("tombstone_.*"));
static NATIVE_CRASH: Lazy<Regex> = Lazy::new(|| pattern(".*native_crash.*"));

static PROCESS_LINE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token(".*>>>.*", ">>>", 1).expect("failed to compile process pattern")
});
static FINGERPRINT: Lazy<Regex> = Lazy::new(|| pattern(".*Build fingerprint.*"));
static SIGNAL_LINE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token(".*signal.*", r"\(", 1).expect("failed to compile signal pattern")
});
static FRAME_LINE: Lazy<Regex> = Lazy::new(|| pattern(".*#0[0-7].*"));
static ABORT_MESSAGE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token("^Abort message:.*", ":", 1).expect("failed to compile abort pattern")
});
static FAULT_ADDR: Lazy<Regex> = Lazy::new(|| pattern("fault addr "));
static HEX_ADDRESS: Lazy<Regex> = Lazy::new(|| pattern("^(0x)?[0-9A-Fa-f]+$"));

/// Lines after the fingerprint searched for the signal, the fingerprint included.
const SIGNAL_WINDOW: usize = 5;
/// Lines after the fingerprint searched for frames, the fingerprint included.
const STACK_WINDOW: usize = 15;
const FRAME_BUDGET: usize = 8;
const SYSTEM_SERVER: &str = "system_server";

/// Counts lines from the most recent fingerprint anchor.
#[derive(Debug, Default)]
struct Window {
    active: bool,
    seen: usize,
}

impl Window {
    fn anchor(&mut self) {
        self.active = true;
        self.seen = 0;
    }

    /// Account for one line; true while the line falls inside the window.
    fn admit(&mut self, size: usize) -> bool {
        if !self.active {
            return false;
        }
        if self.seen < size {
            self.seen += 1;
            true
        } else {
            self.active = false;
            false
        }
    }
}

#[derive(Debug, Default)]
struct Backtrace {
    symbols: String,
    libraries: String,
    frames: usize,
    has_symbols: bool,
}

impl Backtrace {
    fn push_frame(&mut self, frame: &str) {
        let symbol = awk_opt(awk(frame, &sep::OPEN_PAREN, 1), &sep::CLOSE_PAREN, 0);
        if let Some(symbol) = symbol {
            if self.frames != 0 {
                self.symbols.push(' ');
            }
            self.symbols.push_str(symbol);
            self.has_symbols = true;
        } else {
            // Keep the column count of both renderings aligned
            if self.frames != 0 {
                self.symbols.push(' ');
                self.libraries.push(' ');
            }
            if let Some(library) = awk_collapsed(frame, &sep::SPACES, 3) {
                self.libraries.push_str(library);
            }
        }
        self.frames += 1;
    }

    fn render(self) -> String {
        if self.has_symbols {
            self.symbols
        } else {
            self.libraries
        }
    }
}

/// Fields of one tombstone, process name trimmed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TombstoneSummary {
    pub process: String,
    pub signal: String,
    pub backtrace: String,
    pub fault_address: String,
}

/// Fault address following `fault addr `, if it is a plain hex value.
fn fault_address(line: &str) -> Option<&str> {
    awk(line, &FAULT_ADDR, 1).filter(|addr| HEX_ADDRESS.is_match(addr))
}

pub fn scan_tombstone<R: BufRead>(lines: &mut LineReader<R>) -> io::Result<TombstoneSummary> {
    let mut process = Slot::first();
    let mut signal = Slot::first();
    let mut fault = String::new();
    let mut signal_window = Window::default();
    let mut stack_window = Window::default();
    let mut backtrace = Backtrace::default();
    let mut abort = Slot::first();

    while let Some(line) = lines.next_line()? {
        if process.is_open() {
            process.offer(awk_opt(PROCESS_LINE.extract(&line), &sep::LESS_THAN, 0));
        }

        let anchor = FINGERPRINT.is_match(&line);

        if signal.is_open() {
            if anchor {
                signal_window.anchor();
            }
            if signal_window.admit(SIGNAL_WINDOW) {
                let name = awk_opt(SIGNAL_LINE.extract(&line), &sep::CLOSE_PAREN, 0);
                if signal.offer(name) {
                    if let Some(addr) = fault_address(&line) {
                        fault = addr.to_string();
                    }
                }
            }
        }

        if backtrace.frames < FRAME_BUDGET {
            if anchor {
                stack_window.anchor();
            }
            if stack_window.admit(STACK_WINDOW) {
                if let Some(frame) = FRAME_LINE.find(&line) {
                    backtrace.push_frame(frame.as_str());
                }
            }
        }

        if abort.is_open() && stack_window.active {
            abort.offer(ABORT_MESSAGE.extract(&line));
        }
    }

    let mut rendered = backtrace.render();
    if let Some(message) = abort.value() {
        rendered = format!("{} - {}", message, rendered);
    }

    Ok(TombstoneSummary {
        process: process.into_value().trim().to_string(),
        signal: signal.into_value(),
        backtrace: rendered,
        fault_address: fault,
    })
}

pub fn extract(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    let Some(path) = find_first_artifact(&[&*TOMBSTONE, &*NATIVE_CRASH], ctx.dir) else {
        return Ok(Extraction::empty());
    };
    debug!(tombstone = %path.display(), "parsing tombstone");
    let summary = scan_artifact(&path, scan_tombstone)?;

    let critical = ctx.tag == "TOMBSTONE" && summary.process == SYSTEM_SERVER;

    let mut fields = ExtractedFields::new();
    fields.set(DATA0, summary.process);
    fields.set(DATA1, summary.signal);
    fields.set(DATA2, summary.backtrace);
    fields.set(DATA3, summary.fault_address);
    Ok(Extraction { fields, critical })
}
