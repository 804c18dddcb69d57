//! Confidence scoring for generated replies.
//!
//! A cheap heuristic over the text alone. Template fallbacks are never
//! scored; they carry a fixed confidence instead.

const STRATEGIC_MARKERS: &[&str] = &[
    "strategy",
    "strategic",
    "analysis",
    "analyze",
    "framework",
    "trade-off",
];

const ALTERNATIVE_MARKERS: &[&str] = &["alternative", "option", "instead", "on the other hand"];

const ACTION_MARKERS: &[&str] = &["next step", "action", "first,", "step 1", "recommend"];

const STRUCTURE_MARKERS: &[&str] = &["##", "**", "1.", "- ", "• "];

/// Score a generated reply in `[0.5, 1.0]`.
///
/// Starts at 0.5 and adds 0.1 for each of: more than 200 characters, more
/// than 500 characters, strategic vocabulary, alternatives vocabulary,
/// action-step vocabulary, and a structural marker. Capped at 1.0.
pub fn score_confidence(text: &str) -> f32 {
    let lower = text.to_lowercase();
    let length = text.chars().count();
    let has_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    // Counted in tenths so the result is exact.
    let tenths = 5
        + u8::from(length > 200)
        + u8::from(length > 500)
        + u8::from(has_any(STRATEGIC_MARKERS))
        + u8::from(has_any(ALTERNATIVE_MARKERS))
        + u8::from(has_any(ACTION_MARKERS))
        + u8::from(has_any(STRUCTURE_MARKERS));

    f32::from(tenths.min(10)) / 10.0
}
