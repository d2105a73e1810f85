use logtriage_core::{Result, TriageError};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Placeholder written over masked secrets.
pub const REDACTED: &str = "[REDACTED]";

/// Compiled pattern size cap for caller-supplied regexes.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

// Jenkins console notes: hidden serialized annotations between `ESC[8m` and `ESC[0m`.
static CONSOLE_NOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B\[8mha:[^\x1B\n]*\x1B\[0m").expect("valid console note regex"));

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ANSI escape regex")
});

// Jenkins masks credentials bound into a build with runs of asterisks.
static SECRET_MASK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*{4,}").expect("valid secret mask regex"));

/// Remove terminal control sequences, console notes and stray ESC bytes.
pub fn strip_ansi(text: &str) -> String {
    let without_notes = CONSOLE_NOTE.replace_all(text, "");
    let without_escapes = ANSI_ESCAPE.replace_all(&without_notes, "");
    without_escapes.replace('\x1B', "")
}

/// Replace secret-mask runs with [`REDACTED`].
pub fn mask_secrets(text: &str) -> String {
    SECRET_MASK.replace_all(text, REDACTED).into_owned()
}

/// Strip control sequences, then mask secrets. Idempotent and line preserving.
pub fn redact(text: &str) -> String {
    mask_secrets(&strip_ansi(text))
}

/// Compile a caller-supplied pattern, rejecting invalid or oversized ones.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(|e| TriageError::invalid(format!("invalid regex pattern '{}': {}", pattern, e)))
}

/// Keep only the lines matching `filter`.
pub fn filter_lines(text: &str, filter: &Regex) -> String {
    text.split('\n')
        .filter(|line| filter.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let text = "\x1B[31mERROR\x1B[0m build failed\n\x1B[1;32mok\x1B[m";
        assert_eq!(strip_ansi(text), "ERROR build failed\nok");
    }

    #[test]
    fn strips_console_notes() {
        let text = "\x1B[8mha:////4PmYbase64AAAA\x1B[0m[Pipeline] stage";
        assert_eq!(strip_ansi(text), "[Pipeline] stage");
    }

    #[test]
    fn masks_secret_runs() {
        assert_eq!(mask_secrets("token=****"), "token=[REDACTED]");
        assert_eq!(mask_secrets("a *** b"), "a *** b");
        assert_eq!(mask_secrets("********"), "[REDACTED]");
    }

    #[test]
    fn redaction_is_idempotent() {
        let inputs = [
            "plain line",
            "\x1B[33mWARN\x1B[0m password=******",
            "**\x1B[0m** joined by escape",
            "lone \x1B escape ****\nsecond line",
            "\x1B[8mha:abc\x1B[0m\x1B[8mha:def\x1B[0m",
        ];
        for input in inputs {
            let once = redact(input);
            assert_eq!(redact(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn redaction_preserves_line_count() {
        let text = "\x1B[31ma\x1B[0m\n****\n\n\x1B[1mb";
        assert_eq!(redact(text).split('\n').count(), text.split('\n').count());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = compile_pattern("(unclosed").unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn filter_keeps_matching_lines() {
        let re = compile_pattern("ERROR").unwrap();
        assert_eq!(
            filter_lines("INFO a\nERROR b\nWARN c\nERROR d", &re),
            "ERROR b\nERROR d"
        );
    }
}
