//! Stderr capture and error-phrase extraction
//!
//! Child servers dump anything from npm install noise to stack traces on
//! stderr. A bounded buffer keeps the recent tail; when a child fails, a
//! pure extractor distills the tail into one phrase suitable for
//! `last_error` and JSON-RPC `data` fields.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;

/// Cap on retained stderr bytes per child
pub const STDERR_BUFFER_BYTES: usize = 64 * 1024;

/// Cap on the extracted error phrase
const MAX_ERROR_LEN: usize = 200;

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("static pattern"));

static ERROR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)Error:\s*(.+)",
        r"(?i)Exception:\s*(.+)",
        r"(?i)FATAL:\s*(.+)",
        r"(?i)(Failed to .+)",
        r"(?i)(Cannot .+)",
        r"(?i)(Unable to .+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

const ERROR_INDICATORS: [&str; 6] = ["error", "exception", "failed", "cannot", "unable", "invalid"];

/// Bounded line buffer for a child's stderr
#[derive(Debug, Default)]
pub struct StderrBuffer {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line, evicting the oldest lines past the byte cap
    pub fn push(&mut self, line: String) {
        self.bytes += line.len();
        self.lines.push_back(line);

        while self.bytes > STDERR_BUFFER_BYTES {
            if let Some(evicted) = self.lines.pop_front() {
                self.bytes -= evicted.len();
            } else {
                break;
            }
        }
    }

    /// The retained tail as one block of text
    pub fn tail(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Best error phrase from the retained tail
    pub fn meaningful_error(&self) -> String {
        extract_meaningful_error(&self.tail())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Distill raw stderr output into a single meaningful error phrase
///
/// Order of preference: a line matching a known error pattern, then a line
/// containing an error indicator word (with timestamp/prefix noise
/// stripped), then the first non-empty line. Always ANSI-stripped and
/// capped at 200 characters.
pub fn extract_meaningful_error(stderr_text: &str) -> String {
    if stderr_text.trim().is_empty() {
        return "Unknown error - no error details provided".to_string();
    }

    let clean = ANSI_ESCAPE.replace_all(stderr_text, "");
    let lines: Vec<&str> = clean
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return "Empty error output".to_string();
    }

    for line in &lines {
        for pattern in ERROR_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(line) {
                if let Some(m) = caps.get(1) {
                    let phrase = m.as_str().trim();
                    if phrase.len() > 5 {
                        return truncate(phrase);
                    }
                }
            }
        }
    }

    for line in &lines {
        let lower = line.to_lowercase();
        if ERROR_INDICATORS.iter().any(|ind| lower.contains(ind)) {
            let cleaned = strip_prefixes(line);
            if cleaned.len() > 10 {
                return truncate(&cleaned);
            }
        }
    }

    truncate(lines[0])
}

/// Remove leading `Word:`, `[123]`, and ISO-timestamp prefixes
fn strip_prefixes(line: &str) -> String {
    static LEVEL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+:\s*").expect("static pattern"));
    static BRACKET_PREFIX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\[\d+\]\s*").expect("static pattern"));
    static DATE_PREFIX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}.*?:\s*").expect("static pattern"));

    let line = DATE_PREFIX.replace(line, "");
    let line = BRACKET_PREFIX.replace(&line, "");
    let line = LEVEL_PREFIX.replace(&line, "");
    line.trim().to_string()
}

fn truncate(phrase: &str) -> String {
    if phrase.len() > MAX_ERROR_LEN {
        let mut cut = MAX_ERROR_LEN;
        while !phrase.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &phrase[..cut])
    } else {
        phrase.to_string()
    }
}
