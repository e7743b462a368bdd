//! Response and resume-handle extraction from normalized transcripts.
//!
//! These heuristics depend on the exact glyphs and hint lines the driven
//! CLI emits, so every marker comes from [`MarkerConfig`] rather than being
//! baked in. Pure functions, unit-tested against recorded transcripts.

use regex::Regex;

use crate::config::MarkerConfig;
use crate::terminal::normalize;

/// Trailing hint lines the CLI renders below its input box.
const CHROME_HINTS: &[&str] = &[
    "? for shortcuts",
    "esc to interrupt",
    "ctrl+c to exit",
    "tab to toggle",
];

/// Transient spinner glyphs prefixing status lines while the CLI thinks.
const STATUS_GLYPHS: &[char] = &['\u{273b}', '\u{273d}', '\u{2722}', '\u{2217}', '\u{00b7}'];

/// Extract the response text from a raw transcript slice.
///
/// Normalizes the buffer, drops everything before the first response-start
/// marker, removes marker glyphs, separator rules, keyboard-hint chrome and
/// trailing prompt lines, and returns the trimmed remainder. Idempotent
/// when reapplied to its own output.
#[must_use]
pub fn extract_response(raw: &str, markers: &MarkerConfig) -> String {
    let text = normalize(raw);
    let lines: Vec<&str> = text.split('\n').collect();

    let start = lines
        .iter()
        .position(|line| line.contains(markers.response_start.as_str()))
        .unwrap_or(0);

    let mut kept: Vec<String> = Vec::new();
    for line in &lines[start..] {
        if is_chrome(line, markers) {
            continue;
        }
        kept.push(strip_marker_prefix(line, markers));
    }

    // Drop trailing blank lines left behind by removed chrome.
    while kept.last().is_some_and(|line| line.trim().is_empty()) {
        kept.pop();
    }

    kept.join("\n").trim().to_owned()
}

/// Scan a full transcript for the resume token emitted by the CLI.
///
/// The last match wins: the handle printed at exit supersedes any printed
/// during startup.
#[must_use]
pub fn extract_resume_handle(raw: &str, pattern: &Regex) -> Option<String> {
    let text = normalize(raw);
    pattern
        .captures_iter(&text)
        .last()
        .map(|caps| caps.get(1).map_or_else(|| caps[0].to_owned(), |m| m.as_str().to_owned()))
}

/// Whether a line is UI chrome rather than response content.
fn is_chrome(line: &str, markers: &MarkerConfig) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }

    // Separator rules: runs of box-drawing dashes.
    if trimmed.len() >= 3
        && trimmed
            .chars()
            .all(|c| matches!(c, '\u{2500}' | '\u{2501}' | '\u{254c}' | '\u{2574}' | '-'))
        && trimmed.contains(|c| matches!(c, '\u{2500}' | '\u{2501}' | '\u{254c}'))
    {
        return true;
    }

    // Keyboard hint footer.
    if CHROME_HINTS.iter().any(|hint| trimmed.contains(hint)) {
        return true;
    }

    // Bare input prompt, possibly boxed.
    let unboxed = trimmed.trim_start_matches(['\u{2502}', '>', ' ']).trim();
    if trimmed == markers.ready_prompt || unboxed == markers.ready_prompt {
        return true;
    }
    if matches!(trimmed, ">" | "$" | "%") {
        return true;
    }

    // Transient spinner status ("✻ Pondering…").
    if trimmed
        .chars()
        .next()
        .is_some_and(|c| STATUS_GLYPHS.contains(&c))
        && trimmed.ends_with('\u{2026}')
    {
        return true;
    }

    false
}

/// Remove a leading response-start glyph from a content line.
fn strip_marker_prefix(line: &str, markers: &MarkerConfig) -> String {
    let trimmed = line.trim_end();
    trimmed
        .strip_prefix(markers.response_start.as_str())
        .map_or_else(|| trimmed.to_owned(), |rest| rest.trim_start().to_owned())
}
