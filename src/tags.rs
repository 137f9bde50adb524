//! Event tags: alias normalization, extractor dispatch and criticality.

use serde::Serialize;
use std::fmt;

/// Fabric and SoC firmware error subtypes; all share the fabric extractor.
pub const FABRIC_TAGS: &[&str] = &[
    "FABRICERR",
    "MEMERR",
    "INSTERR",
    "SRAMECCERR",
    "HWWDTLOGERR",
    "FABRIC_FAKE",
    "FIRMWARE",
    "NORTHFUSEERR",
    "KERNELWDT",
    "KERNEHANG",
    "SCUWDT",
    "FABRICXML",
    "PLLLOCKERR",
    "UNDEFL1ERR",
    "PUNITMBBTIMEOUT",
    "VOLTKERR",
    "VOLTSAIATKERR",
    "LPEINTERR",
    "PSHINTERR",
    "FUSEINTERR",
    "IPC2ERR",
    "KWDTIPCERR",
];

/// Tags flagged `CRITICAL=YES` regardless of content.
pub const DEFAULT_CRITICAL_TAGS: &[&str] = &[
    "IPANIC",
    "FABRICERR",
    "IPANIC_SWWDT",
    "IPANIC_HWWDT",
    "HWWDTLOGERR",
    "MSHUTDOWN",
    "UIWDT",
    "WDT",
    "VMMTRAP",
    "VMM_UNHANDLED",
    "SECPANIC",
    "MPANIC",
    "SWWDT",
];

/// Boards whose fabric dumps use the old flat layout.
pub const DEFAULT_LEGACY_FABRIC_BOARDS: &[&str] = &["redhookbay", "victoriabay"];

/// Events whose dropbox entry was lost upstream, mapped to their plain tag.
const LOST_DROPBOX_ALIASES: &[(&str, &str)] = &[
    ("LOST_DROPBOX_JAVACRASH", "JAVACRASH"),
    ("LOST_DROPBOX_ANR", "ANR"),
    ("LOST_DROPBOX_UIWDT", "UIWDT"),
    ("LOST_DROPBOX_WTF", "WTF"),
];

/// Marker written to `DATA0` for lost-dropbox events.
pub const FULL_DROPBOX_MARKER: &str = "full dropbox";

/// Extraction recipe selected for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorFamily {
    /// Kernel panic and lockup console dumps
    Panic,
    /// SoC fabric / bus error dumps
    Fabric,
    /// Native crash tombstones
    Tombstone,
    /// Java exceptions from the dropbox
    Java,
    /// Application not responding traces
    Anr,
    /// System server watchdog reports
    Watchdog,
    /// "What a terrible failure" assertions
    Assertion,
    /// Modem panic coredump
    ModemPanic,
    /// VMM trap coredump
    Coredump,
    /// Upstream-generated `DATAn=` passthrough
    Generic,
}

impl fmt::Display for ExtractorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractorFamily::Panic => "panic",
            ExtractorFamily::Fabric => "fabric",
            ExtractorFamily::Tombstone => "tombstone",
            ExtractorFamily::Java => "java",
            ExtractorFamily::Anr => "anr",
            ExtractorFamily::Watchdog => "watchdog",
            ExtractorFamily::Assertion => "assertion",
            ExtractorFamily::ModemPanic => "modem_panic",
            ExtractorFamily::Coredump => "coredump",
            ExtractorFamily::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// An incoming tag after alias resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTag {
    pub tag: String,
    /// Set for `LOST_DROPBOX_*` aliases.
    pub full_dropbox: bool,
}

/// Resolve legacy aliases to the tag the rest of the engine understands.
pub fn normalize(raw: &str) -> NormalizedTag {
    match LOST_DROPBOX_ALIASES.iter().find(|(alias, _)| *alias == raw) {
        Some((_, plain)) => NormalizedTag {
            tag: (*plain).to_string(),
            full_dropbox: true,
        },
        None => NormalizedTag {
            tag: raw.to_string(),
            full_dropbox: false,
        },
    }
}

pub fn is_fabric_tag(tag: &str) -> bool {
    FABRIC_TAGS.contains(&tag)
}

/// Extractor family for a normalized tag; `None` yields a header-only record.
pub fn family_for(tag: &str) -> Option<ExtractorFamily> {
    let family = match tag {
        "IPANIC" | "IPANIC_SWWDT" | "IPANIC_HWWDT" | "IPANIC_FAKE" | "IPANIC_SWWDT_FAKE" => {
            ExtractorFamily::Panic
        }
        "JAVACRASH" => ExtractorFamily::Java,
        "ANR" => ExtractorFamily::Anr,
        "UIWDT" => ExtractorFamily::Watchdog,
        "WTF" => ExtractorFamily::Assertion,
        "TOMBSTONE" | "JAVA_TOMBSTONE" => ExtractorFamily::Tombstone,
        "MPANIC" | "MPANIC_FAKE" => ExtractorFamily::ModemPanic,
        "APIMR" | "APCOREDUMP" => ExtractorFamily::Generic,
        "VMMTRAP" => ExtractorFamily::Coredump,
        other if is_fabric_tag(other) => ExtractorFamily::Fabric,
        _ => return None,
    };
    Some(family)
}

/// Table lookup; surrounding whitespace in the tag is ignored.
pub fn is_critical_tag<S: AsRef<str>>(tag: &str, critical_tags: &[S]) -> bool {
    let tag = tag.trim();
    critical_tags.iter().any(|t| t.as_ref() == tag)
}
