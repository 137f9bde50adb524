//! Dropbox reports that share the `Process:` / `Subject:` header: ANR
//! traces, system server watchdog dumps and WTF assertions.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead};
use std::path::PathBuf;

use super::java::{frame_method, PROCESS_LINE, SUBJECT_LINE};
use super::{pattern, ExtractContext};
use crate::error::ExtractError;
use crate::fields::{ExtractedFields, Extraction, Slot, DATA0, DATA1, DATA2, DATA3};
use crate::locator::find_first_artifact;
use crate::matcher::LinePattern;
use crate::readers::{scan_artifact, LineReader};

static ANR_GZ: Lazy<Regex> = Lazy::new(|| pattern(".*_(app|server)_anr.*txt.gz"));
static ANR_TXT: Lazy<Regex> = Lazy::new(|| pattern(".*_(app|server)_anr.*txt"));
static WATCHDOG_GZ: Lazy<Regex> = Lazy::new(|| pattern("system_server_watchdog.*txt.gz"));
static WATCHDOG_TXT: Lazy<Regex> = Lazy::new(|| pattern("system_server_watchdog.*txt"));
static WTF_GZ: Lazy<Regex> = Lazy::new(|| pattern("wtf.*.gz"));
static WTF_TXT: Lazy<Regex> = Lazy::new(|| pattern("wtf.*.txt"));

static THREAD_FRAME: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token("^  at.*", "at ", 1).expect("failed to compile thread frame pattern")
});
static CPU_TOTAL: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token(".*TOTAL.*", "TOTAL", 0).expect("failed to compile cpu pattern")
});
static CMD_LINE: Lazy<Regex> = Lazy::new(|| pattern("^Cmd line:.*"));
static MAIN_THREAD: Lazy<Regex> = Lazy::new(|| pattern("^\"main\" prio.*"));

const FRAME_BUDGET: usize = 8;

/// Process, subject and an optional short thread stack.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DropboxHeader {
    pub process: String,
    pub subject: String,
    pub frames: String,
}

#[derive(Debug, Default)]
struct Frames {
    methods: Vec<String>,
}

impl Frames {
    fn full(&self) -> bool {
        self.methods.len() >= FRAME_BUDGET
    }

    fn offer(&mut self, line: &str) {
        if let Some(method) = frame_method(&THREAD_FRAME, line) {
            self.methods.push(method.to_string());
        }
    }

    fn render(&self) -> String {
        self.methods.join(" ")
    }
}

#[derive(Debug)]
struct HeaderSlots {
    process: Slot,
    subject: Slot,
}

impl HeaderSlots {
    fn new() -> Self {
        Self {
            process: Slot::first(),
            subject: Slot::first(),
        }
    }

    fn feed(&mut self, line: &str) {
        if self.process.is_open() {
            self.process.offer(PROCESS_LINE.extract(line));
        }
        if self.subject.is_open() {
            self.subject.offer(SUBJECT_LINE.extract(line));
        }
    }
}

/// Where the ANR scan is within the trace file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TracePhase {
    /// Looking for the `Cmd line:` of the crashing process.
    SeekingProcess,
    /// Looking for the `"main"` thread header.
    SeekingMain,
    /// Collecting main-thread frames.
    MainStack,
}

/// ANR trace: header, the main-thread stack of the right process, CPU summary.
pub fn scan_anr<R: BufRead>(lines: &mut LineReader<R>) -> io::Result<(DropboxHeader, String)> {
    let mut header = HeaderSlots::new();
    let mut cpu = Slot::first();
    let mut phase = TracePhase::SeekingProcess;
    let mut frames = Frames::default();

    while let Some(line) = lines.next_line()? {
        header.feed(&line);
        if cpu.is_open() {
            cpu.offer(CPU_TOTAL.extract(&line));
        }

        match phase {
            TracePhase::SeekingProcess => {
                let pid = header.process.value().unwrap_or_default();
                if CMD_LINE.find(&line).is_some_and(|m| m.as_str().contains(pid)) {
                    phase = TracePhase::SeekingMain;
                }
            }
            TracePhase::SeekingMain => {
                if MAIN_THREAD.is_match(&line) {
                    phase = TracePhase::MainStack;
                }
            }
            TracePhase::MainStack => {
                if !frames.full() {
                    frames.offer(&line);
                }
            }
        }
    }

    let header = DropboxHeader {
        process: header.process.into_value(),
        subject: header.subject.into_value(),
        frames: frames.render(),
    };
    Ok((header, cpu.into_value()))
}

/// Watchdog dump: header plus the first frames found anywhere in the file.
pub fn scan_watchdog<R: BufRead>(lines: &mut LineReader<R>) -> io::Result<DropboxHeader> {
    let mut header = HeaderSlots::new();
    let mut frames = Frames::default();

    while let Some(line) = lines.next_line()? {
        header.feed(&line);
        if !frames.full() {
            frames.offer(&line);
        }
    }

    Ok(DropboxHeader {
        process: header.process.into_value(),
        subject: header.subject.into_value(),
        frames: frames.render(),
    })
}

pub fn scan_header<R: BufRead>(lines: &mut LineReader<R>) -> io::Result<DropboxHeader> {
    let mut header = HeaderSlots::new();
    while let Some(line) = lines.next_line()? {
        header.feed(&line);
    }
    Ok(DropboxHeader {
        process: header.process.into_value(),
        subject: header.subject.into_value(),
        frames: String::new(),
    })
}

fn locate(ctx: &ExtractContext<'_>, gzip: &Regex, plain: &Regex) -> Option<PathBuf> {
    find_first_artifact(&[gzip, plain], ctx.dir)
}

pub fn extract_anr(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    let Some(path) = locate(ctx, &ANR_GZ, &ANR_TXT) else {
        return Ok(Extraction::empty());
    };
    let (header, cpu) = scan_artifact(&path, scan_anr)?;

    let mut fields = ExtractedFields::new();
    fields.set(DATA0, header.process);
    fields.set(DATA1, header.subject);
    fields.set(DATA2, header.frames);
    fields.set(DATA3, format!("cpu:{}", cpu));
    Ok(fields.into())
}

pub fn extract_watchdog(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    let Some(path) = locate(ctx, &WATCHDOG_GZ, &WATCHDOG_TXT) else {
        return Ok(Extraction::empty());
    };
    let header = scan_artifact(&path, scan_watchdog)?;

    let mut fields = ExtractedFields::new();
    fields.set(DATA0, header.process);
    fields.set(DATA1, header.subject);
    fields.set(DATA2, header.frames);
    Ok(fields.into())
}

pub fn extract_assertion(ctx: &ExtractContext<'_>) -> Result<Extraction, ExtractError> {
    let Some(path) = locate(ctx, &WTF_GZ, &WTF_TXT) else {
        return Ok(Extraction::empty());
    };
    let header = scan_artifact(&path, scan_header)?;

    let mut fields = ExtractedFields::new();
    fields.set(DATA0, header.process);
    fields.set(DATA1, header.subject);
    Ok(fields.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    const ANR: &str = "\
Process: com.example.app
Subject: Input dispatching timed out
CPU usage from 5000ms to 0ms ago:
  98% 1234/com.example.app: 90% user + 8% kernel
99% TOTAL: 91% user + 8% kernel

----- pid 999 at 2016-01-01 00:00:00 -----
Cmd line: com.other.app
\"main\" prio=5 tid=1 Native
  at com.other.Main.loop(Main.java:1)

----- pid 1234 at 2016-01-01 00:00:00 -----
Cmd line: com.example.app
\"Binder_1\" prio=5 tid=9 Native
  at com.example.Binder.run(Binder.java:3)
\"main\" prio=5 tid=1 Blocked
  at com.example.Main.onClick(Main.java:10)
  at android.view.View.performClick(View.java:5204)
";

    fn reader(input: &str) -> LineReader<Cursor<String>> {
        LineReader::new(Cursor::new(input.to_string()))
    }

    fn ctx(dir: &std::path::Path) -> ExtractContext<'_> {
        ExtractContext {
            dir,
            tag: "ANR",
            legacy_fabric: false,
        }
    }

    #[test]
    fn test_anr_main_thread_of_crashing_process() {
        let (header, cpu) = scan_anr(&mut reader(ANR)).unwrap();
        assert_eq!(header.process, " com.example.app");
        assert_eq!(header.subject, " Input dispatching timed out");
        assert_eq!(
            header.frames,
            "com.example.Main.onClick android.view.View.performClick"
        );
        assert_eq!(cpu, "99% ");
    }

    #[test]
    fn test_watchdog_takes_first_frames() {
        let input = "\
Process: system_server
Subject: Blocked in handler on ui thread (android.ui)
  at com.android.server.Foo.bar(Foo.java:1)
  at com.android.server.Baz.qux(Baz.java:2)
";
        let header = scan_watchdog(&mut reader(input)).unwrap();
        assert_eq!(header.process, " system_server");
        assert_eq!(header.subject, " Blocked in handler on ui thread (android.ui)");
        assert_eq!(header.frames, "com.android.server.Foo.bar com.android.server.Baz.qux");
    }

    #[test]
    fn test_watchdog_frame_budget() {
        let mut input = String::new();
        for i in 0..10 {
            input.push_str(&format!("  at f{}(X.java:1)\n", i));
        }
        let header = scan_watchdog(&mut reader(&input)).unwrap();
        assert_eq!(header.frames, "f0 f1 f2 f3 f4 f5 f6 f7");
    }

    #[test]
    fn test_extract_anr_from_gzip() {
        let dir = TempDir::new().unwrap();
        let file = fs::File::create(dir.path().join("data_app_anr@1.txt.gz")).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(ANR.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let extraction = extract_anr(&ctx(dir.path())).unwrap();
        let keys: Vec<String> = extraction.fields.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["DATA0", "DATA1", "DATA2", "DATA3"]);
        assert_eq!(extraction.fields.get(DATA3), Some("cpu:99% "));
    }

    #[test]
    fn test_assertion_header_only() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("wtf@1.txt"),
            "Process: system_server\nSubject: ActivityManager\n  at a.b(C.java:1)\n",
        )
        .unwrap();

        let extraction = extract_assertion(&ctx(dir.path())).unwrap();
        assert_eq!(extraction.fields.len(), 2);
        assert_eq!(extraction.fields.get(DATA1), Some(" ActivityManager"));
    }
}
