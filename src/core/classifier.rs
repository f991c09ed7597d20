//! Deterministic classification of agent step messages.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::plan::Plan;

/// Matches an explicit step header: `[STEP i/N] Label`, case-insensitive.
static STEP_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[STEP\s+(\d+)/(\d+)\]\s*(.+)").unwrap());

/// Derive a human-readable summary for a step message.
///
/// Resolution order, first match wins:
///
/// 1. An explicit `[STEP i/N] Label` header yields its label. The embedded
///    numbers are advisory display data only; sequencing authority stays
///    with the caller's cursor, so an agent that miscounts is tolerated.
/// 2. A cursor within plan bounds yields the plan label at that position.
/// 3. Otherwise the summary is synthesized as `Implementing step <cursor+1>`.
///
/// This never fails and never blocks on malformed agent output. The cursor
/// is not advanced here; the caller advances it after dispatch.
pub fn classify(text: &str, cursor: usize, plan: &Plan) -> String {
    let text = text.trim();
    if let Some(caps) = STEP_HEADER_RE.captures(text)
        && let Some(label) = caps.get(3)
    {
        return label.as_str().trim().to_string();
    }
    if let Some(label) = plan.label_at(cursor) {
        return label.to_string();
    }
    format!("Implementing step {}", cursor + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::parse_plan;

    fn plan() -> Plan {
        parse_plan("1. Scaffold\n2. Add API\n3. Build UI\n")
    }

    #[test]
    fn explicit_header_wins_regardless_of_embedded_numbers() {
        let summary = classify("[STEP 99/99] Weird", 0, &plan());
        assert_eq!(summary, "Weird");
    }

    #[test]
    fn header_match_is_case_insensitive() {
        let summary = classify("[step 2/3] Add API routes", 0, &plan());
        assert_eq!(summary, "Add API routes");
    }

    #[test]
    fn cursor_within_bounds_uses_plan_label() {
        let summary = classify("working on the second thing now", 1, &plan());
        assert_eq!(summary, "Add API");
    }

    #[test]
    fn cursor_beyond_bounds_synthesizes_summary() {
        let summary = classify("one more thing", 3, &plan());
        assert_eq!(summary, "Implementing step 4");
    }

    #[test]
    fn header_in_later_lines_does_not_count() {
        // Header recognition is anchored to the start of the message.
        let summary = classify("doing work\n[STEP 1/3] Scaffold", 1, &plan());
        assert_eq!(summary, "Add API");
    }
}
