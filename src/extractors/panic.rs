//! Kernel panic and lockup console dumps.
//!
//! A console is scanned once for three things: the faulting instruction
//! pointer, the `comm:` thread name and the `Kernel panic - not syncing:`
//! message. Hard lockups switch to capturing the NMI backtrace, soft
//! lockups get a second pass over the `BUG:` report.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead};
use std::path::Path;
use tracing::{debug, warn};

use super::stack::{self, format_kernel_frame, BUG_IPI_DEADLOCK, BUG_SOFT_LOCKUP};
use super::{pattern, ExtractContext};
use crate::error::ExtractError;
use crate::fields::{ExtractedFields, Extraction, Slot, DATA0, DATA1, DATA2, DATA3};
use crate::locator::find_artifact;
use crate::matcher::{awk, sep, LinePattern};
use crate::readers::{scan_artifact, LineReader};

pub const INSUFFICIENT_DATA: &str = "insufficient data";
/// Frames kept from a hard-lockup NMI backtrace.
pub const HARD_LOCKUP_FRAME_BUDGET: usize = 4;

/// Consoles tried in order, cheapest first.
static CONSOLE_CANDIDATES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        pattern(".*panic_console.*"),
        pattern("coredump.*"),
        pattern(".*console-ramoops.*"),
        pattern(".*last_kmsg.*"),
    ]
});
static PANIC_HEADER: Lazy<Regex> = Lazy::new(|| pattern(".*ipanic_header.*"));

static EIP_LINE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token("EIP:.*SS:ESP", " ", 2).expect("failed to compile EIP pattern")
});
static RIP_LINE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token(r"RIP  \[.*ffffffff.*\].*", " ", 3).expect("failed to compile RIP pattern")
});
static COMM_LINE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token("(c|C)omm: .*", " ", 1).expect("failed to compile comm pattern")
});
static PANIC_LINE: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token("Kernel panic - not syncing: .*", ":", 1)
        .expect("failed to compile panic pattern")
});
static HARD_LOCKUP: Lazy<Regex> = Lazy::new(|| pattern("hard LOCKUP.*"));
static NMI_END: Lazy<Regex> = Lazy::new(|| pattern("nmi_stack_correct.*"));
static ON_CPU: Lazy<Regex> = Lazy::new(|| pattern(" on cpu"));

/// What one pass over a console produced, after filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleSummary {
    /// Instruction-pointer token, the signature of last resort.
    pub instruction: String,
    pub comm: String,
    pub panic: String,
    /// Frames of a hard-lockup backtrace, `None` when this was not a hard lockup.
    pub lockup_frames: Option<String>,
}

impl ConsoleSummary {
    pub fn is_soft_lockup(&self) -> bool {
        self.panic.contains("softlockup")
    }
}

/// Single pass over a panic console.
///
/// The `comm` slot keeps being overwritten until either the instruction
/// pointer or the panic line has been seen; after that the next `comm`
/// closes it. If the pointer shows up after a `comm` candidate, that last
/// candidate is kept.
pub fn scan_console<R: BufRead>(lines: &mut LineReader<R>) -> io::Result<ConsoleSummary> {
    let mut instruction = Slot::first();
    let mut panic = Slot::first();
    let mut comm = String::new();
    let mut comm_closed = false;
    let mut comm_candidate = false;
    let mut previous_had_rip = false;
    let mut hard_lockup = false;
    let mut nmi_seen = false;
    let mut lockup_frames = String::new();
    let mut lockup_count = 0;

    while let Some(line) = lines.next_line()? {
        if instruction.is_open() {
            let candidate = EIP_LINE
                .extract(&line)
                .or_else(|| RIP_LINE.extract(&line))
                .or_else(|| {
                    // Third chance: the line right after a "RIP" line
                    if previous_had_rip {
                        awk(&line, &sep::FRAME_END, 1)
                    } else {
                        None
                    }
                });
            previous_had_rip = false;
            if instruction.offer(candidate) && comm_candidate {
                comm_closed = true;
            }
            if line.contains("RIP") {
                previous_had_rip = true;
            }
        }

        if !comm_closed {
            if let Some(name) = COMM_LINE.extract(&line) {
                comm = name.to_string();
                if instruction.is_found() || panic.is_found() {
                    comm_closed = true;
                } else {
                    comm_candidate = true;
                }
            }
        }

        if panic.is_open() && panic.offer(PANIC_LINE.extract(&line)) {
            hard_lockup = HARD_LOCKUP.is_match(&line);
        }

        if hard_lockup {
            if !nmi_seen {
                nmi_seen = NMI_END.is_match(&line);
            } else if lockup_count < HARD_LOCKUP_FRAME_BUDGET {
                let frame = format_kernel_frame(&line);
                if !frame.is_empty() {
                    lockup_frames.push_str(&frame);
                    lockup_count += 1;
                }
            }
        }
    }

    let mut panic = panic.into_value();

    // "swapper/0" -> "swapper"
    if comm.contains('/') {
        if let Some(name) = awk(&comm, &sep::SLASH, 0).filter(|n| !n.is_empty()) {
            comm = name.to_string();
        }
    }
    if panic.contains("Fatal exception in interrupt") {
        comm.clear();
    }
    if hard_lockup {
        if let Some(message) = awk(&panic, &ON_CPU, 0).filter(|m| !m.is_empty()) {
            panic = message.to_string();
        }
    }

    Ok(ConsoleSummary {
        instruction: instruction.into_value(),
        comm,
        panic,
        lockup_frames: hard_lockup.then_some(lockup_frames),
    })
}

/// Second pass for soft lockups: IPI deadlock banner first, plain soft lockup second.
fn soft_lockup_stack(path: &Path) -> Result<String, ExtractError> {
    let ipi = scan_artifact(path, |lines| {
        stack::extract_stack_trace(lines, &BUG_IPI_DEADLOCK)
    })?;
    if !ipi.is_empty() {
        return Ok(ipi);
    }
    scan_artifact(path, |lines| {
        stack::extract_stack_trace(lines, &BUG_SOFT_LOCKUP)
    })
}

/// Extract the panic fields from one console file.
pub fn fields_from_console(path: &Path) -> Result<ExtractedFields, ExtractError> {
    let summary = scan_artifact(path, scan_console)?;

    let mut signature = match &summary.lockup_frames {
        Some(frames) => frames.clone(),
        None if summary.is_soft_lockup() => soft_lockup_stack(path)?,
        None => String::new(),
    };
    if signature.is_empty() {
        signature = summary.instruction;
    }

    let mut fields = ExtractedFields::new();
    fields.set(DATA0, signature);
    fields.set(DATA1, summary.comm);
    fields.set(DATA2, summary.panic);

    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    if name.contains("emmc_ipanic_console") {
        fields.set(DATA3, "emmc");
    } else if name.contains("ram_ipanic_console") {
        fields.set(DATA3, "ram");
    }
    Ok(fields)
}

/// A console result counts when it has a signature or a panic message.
pub fn has_signature(fields: &ExtractedFields) -> bool {
    let filled = |key| fields.get(key).is_some_and(|v| !v.is_empty());
    filled(DATA0) || filled(DATA2)
}

pub fn extract(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    let mut any_console = false;
    let mut first_error = None;
    let mut best = None;

    for candidate in CONSOLE_CANDIDATES.iter() {
        let Some(path) = find_artifact(candidate, ctx.dir) else {
            continue;
        };
        any_console = true;
        match fields_from_console(&path) {
            Ok(fields) if has_signature(&fields) => {
                debug!(console = %path.display(), "panic signature found");
                best = Some(fields);
                break;
            }
            Ok(_) => debug!(console = %path.display(), "no panic signature, trying next console"),
            Err(e) => {
                warn!(error = %e, "panic console unreadable, trying next console");
                first_error.get_or_insert(e);
            }
        }
    }

    let mut fields = ExtractedFields::new();
    match best {
        Some(found) => {
            for key in [DATA0, DATA1, DATA2, DATA3] {
                fields.set(key, found.get(key).unwrap_or_default());
            }
        }
        None => {
            if let Some(e) = first_error {
                return Err(e);
            }
            fields.set(DATA0, INSUFFICIENT_DATA);
        }
    }

    if !any_console && find_artifact(&PANIC_HEADER, ctx.dir).is_some() {
        fields.set(DATA3, "emmc_hdr");
    }

    Ok(fields.into())
}
