//! Plan extraction from the agent's first message.
//!
//! The agent is asked to open with a numbered plan, but nothing guarantees it
//! complies. Extraction therefore never fails: unnumbered transcripts fall
//! back to their first lines, and an empty transcript still yields a non-zero
//! step total so observers never see a "0 of 0 steps" report.

use std::sync::LazyLock;

use regex::Regex;

/// Step total reported when no usable lines exist at all.
pub const FALLBACK_TOTAL: usize = 6;

/// Matches a numbered plan line: `<int>. <label>`, optionally followed by a
/// hyphen or em-dash separator and a free-form description. Only the label
/// is retained.
static NUMBERED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.\s*(.+?)(?:\s*[-\u{2014}]\s*.+)?$").unwrap());

/// Ordered step labels extracted from the agent's opening message.
///
/// `total` is fixed at parse time and reported to observers on every
/// subsequent event; it never changes even if the agent later produces more
/// steps than planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub labels: Vec<String>,
    pub total: usize,
}

impl Plan {
    pub fn label_at(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }
}

/// Extract an ordered plan from free text.
///
/// Lines matching the numbered-item pattern contribute their label, in order
/// of appearance; the claimed numbers are ignored, so non-contiguous or
/// misordered numbering still yields a usable plan. If no line matches, the
/// first [`FALLBACK_TOTAL`] non-empty lines are taken verbatim.
pub fn parse_plan(text: &str) -> Plan {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut labels: Vec<String> = lines
        .iter()
        .filter_map(|line| {
            NUMBERED_ITEM_RE
                .captures(line)
                .and_then(|caps| caps.get(2))
                .map(|label| label.as_str().trim().to_string())
        })
        .collect();

    if labels.is_empty() {
        labels = lines
            .iter()
            .take(FALLBACK_TOTAL)
            .map(|line| (*line).to_string())
            .collect();
    }

    let total = if labels.is_empty() {
        FALLBACK_TOTAL
    } else {
        labels.len()
    };

    Plan { labels, total }
}
