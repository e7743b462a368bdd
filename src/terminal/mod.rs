//! Terminal text stream normalization.
//!
//! Pure functions, no state. Turns raw PTY output (ANSI control sequences,
//! carriage-return overwrites, mixed line endings) into plain text that the
//! extraction heuristics can work on.

/// Strip terminal control sequences, collapse carriage-return overwrites,
/// and normalize line endings.
///
/// Bare `\r` inside a line means the cursor returned to column zero and the
/// line was overwritten; only the last segment survives, which mirrors what
/// a terminal would display.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let stripped = strip_ansi_escapes::strip_str(raw);
    let unixized = stripped.replace("\r\n", "\n");

    unixized
        .split('\n')
        .map(collapse_overwrites)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep only the last carriage-return segment of a line.
fn collapse_overwrites(line: &str) -> &str {
    line.rsplit('\r').next().unwrap_or(line)
}
