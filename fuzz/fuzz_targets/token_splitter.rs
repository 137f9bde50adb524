#![no_main]

use crashparse::matcher::{awk_collapsed, awk_limited, split_tokens, LinePattern};
use libfuzzer_sys::fuzz_target;
use regex::Regex;

const MAX_PATTERN_LEN: usize = 64;
const MAX_LINE_LEN: usize = 2048;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    let index = (data[0] % 8) as usize;
    let limit = (data[1] % 4) as usize;
    let sep_len = (data[2] as usize % MAX_PATTERN_LEN).min(data.len() - 3);
    let separator = String::from_utf8_lossy(&data[3..3 + sep_len]).to_string();
    let rest = &data[3 + sep_len..];
    let line = String::from_utf8_lossy(&rest[..rest.len().min(MAX_LINE_LEN)]).to_string();

    // Invalid separators are fine; we only care about panics.
    let Ok(sep) = Regex::new(&separator) else {
        return;
    };

    let tokens = split_tokens(&sep, &line, limit);
    if limit > 0 {
        assert!(tokens.len() <= limit);
    }
    let _ = awk_limited(&line, &sep, index);
    let _ = awk_collapsed(&line, &sep, index);

    if let Ok(pattern) = LinePattern::token(".*", &separator, index) {
        let _ = pattern.extract(&line);
    }
});
