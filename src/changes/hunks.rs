//! Zero-context unified diff parsing.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@@ -\d+(?:,\d+)? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex is valid")
});

/// Target-side range of one hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkRange {
    pub start: usize,
    pub count: usize,
}

impl HunkRange {
    /// One past the last line, or `None` if it does not fit in `usize`.
    pub fn end(&self) -> Option<usize> {
        self.start.checked_add(self.count)
    }

    /// Lines `[start, start + count - 1]`; empty for pure deletions and for
    /// ranges that overflow.
    pub fn lines(&self) -> impl Iterator<Item = usize> {
        self.start..self.end().unwrap_or(self.start)
    }
}

/// Parse one `@@ -a[,b] +c[,d] @@` header. An omitted count means one line.
///
/// Headers whose range overflows are rejected.
pub fn parse_hunk_header(line: &str) -> Option<HunkRange> {
    let caps = HUNK_HEADER.captures(line)?;
    let start = caps.get(1)?.as_str().parse().ok()?;
    let count = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 1,
    };
    let hunk = HunkRange { start, count };
    if hunk.end().is_none() {
        log::debug!("Skipping hunk with overflowing range: {line}");
        return None;
    }
    Some(hunk)
}

/// Collect the added/modified line numbers of every hunk in `diff`.
pub fn parse_changed_lines(diff: &str) -> BTreeSet<usize> {
    diff.lines()
        .filter(|line| line.starts_with("@@"))
        .filter_map(parse_hunk_header)
        .flat_map(|hunk| hunk.lines())
        .collect()
}
