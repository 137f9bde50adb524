//! Kernel stack-frame helpers shared by the panic extractor.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead};

use crate::matcher::LinePattern;
use crate::readers::LineReader;

/// Frames captured after `Call Trace:` in the soft-lockup pass.
pub const SOFT_LOCKUP_FRAME_BUDGET: usize = 8;

/// Banner of an IPI deadlock report.
pub static BUG_IPI_DEADLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new("BUG: .*waiting for CSD lock.*").expect("failed to compile IPI banner regex")
});
/// Banner of a soft lockup report.
pub static BUG_SOFT_LOCKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new("BUG: soft lockup").expect("failed to compile soft lockup regex"));

static EIP_AFTER_BUG: Lazy<LinePattern> =
    Lazy::new(|| LinePattern::token("EIP:.*", " ", 2).expect("failed to compile EIP pattern"));
static RIP_AFTER_BUG: Lazy<LinePattern> = Lazy::new(|| {
    LinePattern::token(r"RIP: .*\[.*ffffffff.*\].*", r">\]", 2)
        .expect("failed to compile RIP pattern")
});

/// Strip the `[<address>]` prefix of a kernel frame line.
///
/// Returns the text after `>]` (with its leading space), or an empty string
/// when the line is not a frame or is a questionable ` ? ` frame.
pub fn format_kernel_frame(line: &str) -> String {
    match line.find(">] ") {
        Some(idx) if idx > 0 => {
            let frame = &line[idx + 2..];
            if frame.contains(" ? ") {
                String::new()
            } else {
                frame.to_string()
            }
        }
        _ => String::new(),
    }
}

/// Capture the stack following a `banner` report.
///
/// After the banner, the first instruction-pointer token is emitted as
/// `<token> - `, then up to eight lines after `Call Trace:` are appended,
/// each preceded by a space. Questionable frames contribute no text but
/// still count against the budget.
pub fn extract_stack_trace<R: BufRead>(
    lines: &mut LineReader<R>,
    banner: &Regex,
) -> io::Result<String> {
    let mut result = String::new();
    let mut banner_found = false;
    let mut pointer_found = false;
    let mut in_call_trace = false;
    let mut frames = 0;

    while let Some(line) = lines.next_line()? {
        if !banner_found {
            banner_found = banner.is_match(&line);
            continue;
        }

        if !pointer_found {
            let pointer = EIP_AFTER_BUG
                .extract(&line)
                .or_else(|| RIP_AFTER_BUG.extract(&line));
            if let Some(pointer) = pointer {
                result.push_str(pointer);
                result.push_str(" - ");
                pointer_found = true;
            }
        }

        if line.contains("Call Trace:") {
            in_call_trace = true;
            continue;
        }

        if in_call_trace {
            result.push(' ');
            result.push_str(&format_kernel_frame(&line));
            frames += 1;
        }

        if frames >= SOFT_LOCKUP_FRAME_BUDGET {
            break;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn scan(input: &str, banner: &Regex) -> String {
        extract_stack_trace(&mut LineReader::new(Cursor::new(input.to_string())), banner).unwrap()
    }

    #[test]
    fn test_format_kernel_frame() {
        assert_eq!(
            format_kernel_frame("[  12.3] [<c12345>] do_exit+0x10/0x20"),
            " do_exit+0x10/0x20"
        );
        assert_eq!(
            format_kernel_frame("[  12.3] [<c12345>] ? printk+0x10/0x20"),
            ""
        );
        assert_eq!(format_kernel_frame("no frame here"), "");
        // A marker at the very start is not a frame
        assert_eq!(format_kernel_frame(">] x"), "");
    }

    #[test]
    fn test_soft_lockup_stack() {
        let input = "\
noise
BUG: soft lockup - CPU#0 stuck for 22s! [kworker/0:1:42]
EIP: [<c1234567>] spin_loop+0x5/0x10
Call Trace:
 [<c1000001>] func_a+0x1/0x2
 [<c1000002>] ? func_b+0x1/0x2
 [<c1000003>] func_c+0x1/0x2
";
        assert_eq!(
            scan(input, &BUG_SOFT_LOCKUP),
            "spin_loop+0x5/0x10 -   func_a+0x1/0x2   func_c+0x1/0x2"
        );
    }

    #[test]
    fn test_frame_budget() {
        let mut input = String::from("BUG: soft lockup\nCall Trace:\n");
        for i in 0..12 {
            input.push_str(&format!(" [<c10000{:02}>] f{}+0x1/0x2\n", i, i));
        }
        let stack = scan(&input, &BUG_SOFT_LOCKUP);
        assert!(stack.contains("f7+"));
        assert!(!stack.contains("f8+"));
    }

    #[test]
    fn test_no_banner_yields_empty() {
        assert_eq!(scan("Call Trace:\n [<c1>] f+0x1\n", &BUG_IPI_DEADLOCK), "");
    }

    #[test]
    fn test_ipi_banner() {
        let input = "BUG: CPU1 waiting for CSD lock (#2)\nCall Trace:\n [<ffffffff8100>] smp_call+0x1/0x2\n";
        assert_eq!(scan(input, &BUG_IPI_DEADLOCK), "  smp_call+0x1/0x2");
    }
}
