use logtriage_core::SearchMatch;
use regex::Regex;

pub const DEFAULT_WINDOW_LINES: usize = 5;
pub const MAX_SEARCH_MATCHES: usize = 20;

/// Lines matching `pattern`, each with `window_lines` of context on both sides.
pub fn search_lines(
    text: &str,
    pattern: &Regex,
    window_lines: usize,
    max_matches: usize,
) -> Vec<SearchMatch> {
    let lines: Vec<&str> = text.lines().collect();
    let mut matches = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if matches.len() >= max_matches {
            break;
        }
        if !pattern.is_match(line) {
            continue;
        }
        let from = idx.saturating_sub(window_lines);
        let to = (idx + window_lines + 1).min(lines.len());
        matches.push(SearchMatch {
            line_number: idx + 1,
            context: lines[from..to].join("\n"),
        });
    }

    matches
}
