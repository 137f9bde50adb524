//! Line-pattern extraction: "grep a line, then awk a token out of the match".
//!
//! Every extractor is built from the same two steps. A [`LinePattern`] finds
//! the first match of a regex inside a line and, optionally, splits the
//! *matched text* (never the whole line) on a separator regex and returns one
//! token. A miss is `None`, which is ordinary control flow for the fallback
//! chains in the extractors.
//!
//! Splitting follows the semantics the crash tooling downstream was tuned
//! against:
//! - an unlimited split drops trailing empty tokens
//! - a limited split (`index + 1` pieces) keeps the remainder after the
//!   `index`-th separator intact, so free text such as a `Caused by:` message
//!   survives
//! - a leading separator produces a leading empty token
//! - input without any separator match is returned as the only token

use regex::Regex;

/// How the matched text is cut into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Split on every separator; trailing empty tokens are discarded.
    Unlimited,
    /// Split into at most `index + 1` pieces; the last piece keeps the rest.
    FromLeft,
}

#[derive(Debug, Clone)]
struct TokenSpec {
    separator: Regex,
    index: usize,
    mode: SplitMode,
}

/// A compiled "grep | awk" recipe for a single line.
#[derive(Debug, Clone)]
pub struct LinePattern {
    pattern: Regex,
    token: Option<TokenSpec>,
}

impl LinePattern {
    /// Pattern returning the whole matched substring.
    pub fn whole(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            token: None,
        })
    }

    /// Pattern returning token `index` of the matched substring split on `separator`.
    pub fn token(pattern: &str, separator: &str, index: usize) -> Result<Self, regex::Error> {
        Self::with_mode(pattern, separator, index, SplitMode::Unlimited)
    }

    /// Like [`LinePattern::token`] but keeps everything after the `index`-th separator.
    pub fn from_left(pattern: &str, separator: &str, index: usize) -> Result<Self, regex::Error> {
        Self::with_mode(pattern, separator, index, SplitMode::FromLeft)
    }

    fn with_mode(
        pattern: &str,
        separator: &str,
        index: usize,
        mode: SplitMode,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            token: Some(TokenSpec {
                separator: Regex::new(separator)?,
                index,
                mode,
            }),
        })
    }

    /// Run the recipe against `line`.
    pub fn extract<'a>(&self, line: &'a str) -> Option<&'a str> {
        let matched = self.pattern.find(line)?.as_str();
        match &self.token {
            None => Some(matched),
            Some(spec) => match spec.mode {
                SplitMode::Unlimited => awk(matched, &spec.separator, spec.index),
                SplitMode::FromLeft => awk_limited(matched, &spec.separator, spec.index),
            },
        }
    }
}

/// Split `input` on `separator`.
///
/// `limit == 0` means unlimited with trailing empty tokens removed; any other
/// value caps the number of pieces and keeps trailing empties.
pub fn split_tokens<'a>(separator: &Regex, input: &'a str, limit: usize) -> Vec<&'a str> {
    let mut tokens = Vec::new();
    let mut last = 0;
    let mut matched = false;

    for m in separator.find_iter(input) {
        if limit > 0 && tokens.len() + 1 >= limit {
            break;
        }
        // A zero-width match at the start never yields a leading empty token
        if m.start() == 0 && m.end() == 0 {
            continue;
        }
        matched = true;
        tokens.push(&input[last..m.start()]);
        last = m.end();
    }

    if !matched {
        return vec![input];
    }

    tokens.push(&input[last..]);

    if limit == 0 {
        while tokens.last().is_some_and(|t| t.is_empty()) {
            tokens.pop();
        }
    }

    tokens
}

/// Token `index` of an unlimited split, or `None` when there are too few tokens.
pub fn awk<'a>(input: &'a str, separator: &Regex, index: usize) -> Option<&'a str> {
    split_tokens(separator, input, 0).get(index).copied()
}

/// Token `index` of a split limited to `index + 1` pieces.
pub fn awk_limited<'a>(input: &'a str, separator: &Regex, index: usize) -> Option<&'a str> {
    split_tokens(separator, input, index + 1).get(index).copied()
}

/// Split on runs of `separator` and ignore a leading empty token.
///
/// `separator` is expected to already match repetitions (see [`sep::SPACES`]).
pub fn awk_collapsed<'a>(input: &'a str, separator: &Regex, index: usize) -> Option<&'a str> {
    let tokens = split_tokens(separator, input, 0);
    let index = match tokens.first() {
        Some(first) if first.is_empty() => index + 1,
        _ => index,
    };
    tokens.get(index).copied()
}

/// Same as [`awk`] but tolerant of a missing input, for chaining on a previous miss.
pub fn awk_opt<'a>(input: Option<&'a str>, separator: &Regex, index: usize) -> Option<&'a str> {
    input.and_then(|s| awk(s, separator, index))
}

/// Separators shared by several extractors.
pub mod sep {
    use once_cell::sync::Lazy;
    use regex::Regex;

    fn compile(pattern: &str) -> Regex {
        Regex::new(pattern).expect("failed to compile separator regex")
    }

    pub static OPEN_PAREN: Lazy<Regex> = Lazy::new(|| compile(r"\("));
    pub static CLOSE_PAREN: Lazy<Regex> = Lazy::new(|| compile(r"\)"));
    pub static OPEN_BRACKET: Lazy<Regex> = Lazy::new(|| compile(r"\["));
    pub static LESS_THAN: Lazy<Regex> = Lazy::new(|| compile("<"));
    pub static SLASH: Lazy<Regex> = Lazy::new(|| compile("/"));
    /// End of the `[<address>]` prefix on kernel stack lines.
    pub static FRAME_END: Lazy<Regex> = Lazy::new(|| compile(r">\]"));
    pub static SPACES: Lazy<Regex> = Lazy::new(|| compile("(?: )+"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn re(s: &str) -> Regex {
        Regex::new(s).unwrap()
    }

    #[test]
    fn test_whole_match_returns_matched_substring_only() {
        let p = LinePattern::whole("hard LOCKUP.*").unwrap();
        assert_eq!(
            p.extract("Kernel panic - not syncing: Watchdog detected hard LOCKUP on cpu 1"),
            Some("hard LOCKUP on cpu 1")
        );
        assert_eq!(p.extract("soft lockup"), None);
    }

    #[test]
    fn test_token_splits_match_not_line() {
        let p = LinePattern::token("(c|C)omm: .*", " ", 1).unwrap();
        assert_eq!(
            p.extract("Pid: 0, comm: swapper/0 Not tainted"),
            Some("swapper/0")
        );
    }

    #[test]
    fn test_token_out_of_range_is_none() {
        let p = LinePattern::token("Process:.*", ":", 3).unwrap();
        assert_eq!(p.extract("Process: com.example"), None);
    }

    #[test]
    fn test_from_left_keeps_remainder() {
        let p = LinePattern::from_left("^Caused by:.*", ":", 1).unwrap();
        assert_eq!(
            p.extract("Caused by: java.lang.IllegalStateException: boom: again"),
            Some(" java.lang.IllegalStateException: boom: again")
        );

        let unlimited = LinePattern::token("^Caused by:.*", ":", 1).unwrap();
        assert_eq!(
            unlimited.extract("Caused by: java.lang.IllegalStateException: boom"),
            Some(" java.lang.IllegalStateException")
        );
    }

    #[test]
    fn test_split_drops_trailing_empties() {
        assert_eq!(
            split_tokens(&re("<"), " com.example.app <<<", 0),
            vec![" com.example.app "]
        );
        assert!(split_tokens(&re(":"), ":", 0).is_empty());
    }

    #[test]
    fn test_split_keeps_leading_empty() {
        assert_eq!(
            split_tokens(&re(">>>"), ">>> app <<<", 0),
            vec!["", " app <<<"]
        );
    }

    #[test]
    fn test_split_without_match_returns_input() {
        assert_eq!(split_tokens(&re(r"\("), "no parens", 0), vec!["no parens"]);
        assert_eq!(split_tokens(&re(r"\("), "", 0), vec![""]);
    }

    #[test]
    fn test_limited_split_keeps_trailing_empties() {
        assert_eq!(split_tokens(&re("="), "DATA0=", 2), vec!["DATA0", ""]);
        assert_eq!(awk_limited("DATA0=", &re("="), 1), Some(""));
        assert_eq!(awk("DATA0=", &re("="), 1), None);
    }

    #[test]
    fn test_awk_collapsed_skips_leading_separator() {
        let line = "    #01 pc 0001a2b3  /system/lib/libc.so";
        assert_eq!(
            awk_collapsed(line, &sep::SPACES, 3),
            Some("/system/lib/libc.so")
        );
        assert_eq!(awk_collapsed("#01 pc 1234 libfoo.so", &sep::SPACES, 3), Some("libfoo.so"));
        assert_eq!(awk_collapsed("    #01 pc", &sep::SPACES, 3), None);
    }

    #[test]
    fn test_frame_end_separator() {
        let line = "[<ffffffff81234567>] panic+0x1a/0x2b";
        assert_eq!(awk(line, &sep::FRAME_END, 1), Some(" panic+0x1a/0x2b"));
    }

    #[test]
    fn test_awk_opt_chains_misses() {
        assert_eq!(awk_opt(None, &sep::CLOSE_PAREN, 0), None);
        assert_eq!(awk_opt(Some("SIGSEGV), code 1 "), &sep::CLOSE_PAREN, 0), Some("SIGSEGV"));
    }

    proptest! {
        #[test]
        fn prop_split_rejoins_to_input(parts in proptest::collection::vec("[a-z ]{0,6}", 1..6)) {
            let input = parts.join(":");
            let tokens = split_tokens(&re(":"), &input, input.len() + 1);
            prop_assert_eq!(tokens.join(":"), input);
        }

        #[test]
        fn prop_limited_split_never_exceeds_limit(input in "[a-z:]{0,20}", limit in 1usize..5) {
            let tokens = split_tokens(&re(":"), &input, limit);
            prop_assert!(tokens.len() <= limit);
        }

        #[test]
        fn prop_unlimited_split_has_no_trailing_empty(input in "[a-z:]{1,20}") {
            let tokens = split_tokens(&re(":"), &input, 0);
            if input.contains(':') {
                prop_assert!(tokens.last().map_or(true, |t| !t.is_empty()));
            }
        }
    }
}
