//! Per-family field extractors.
//!
//! Each extractor locates its artifact inside the event directory, scans
//! it line by line and returns the ordered fields for the record. A missing
//! artifact is not an error; only I/O failures are.

pub mod anr;
pub mod coredump;
pub mod fabric;
pub mod java;
pub mod panic;
pub mod stack;
pub mod tombstone;

use regex::Regex;
use std::path::Path;

use crate::error::ExtractError;
use crate::fields::Extraction;
use crate::tags::ExtractorFamily;

/// What an extractor knows about the event it is working on.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    pub dir: &'a Path,
    /// Normalized tag.
    pub tag: &'a str,
    /// Parse fabric dumps with the flat legacy layout.
    pub legacy_fabric: bool,
}

pub type ExtractorFn = fn(&ExtractContext<'_>) -> Result<Extraction, ExtractError>;

/// Dispatch table from family to extractor.
pub fn extractor_for(family: ExtractorFamily) -> ExtractorFn {
    match family {
        ExtractorFamily::Panic => panic::extract,
        ExtractorFamily::Fabric => fabric::extract,
        ExtractorFamily::Tombstone => tombstone::extract,
        ExtractorFamily::Java => java::extract,
        ExtractorFamily::Anr => anr::extract_anr,
        ExtractorFamily::Watchdog => anr::extract_watchdog,
        ExtractorFamily::Assertion => anr::extract_assertion,
        ExtractorFamily::ModemPanic => coredump::extract_modem_panic,
        ExtractorFamily::Coredump => coredump::extract_vmm_trap,
        ExtractorFamily::Generic => coredump::extract_generic,
    }
}

/// Compile one of the built-in artifact or line patterns.
pub(crate) fn pattern(p: &str) -> Regex {
    Regex::new(p).expect("failed to compile built-in extractor regex")
}
