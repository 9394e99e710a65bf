use std::collections::BTreeSet;
use std::sync::OnceLock;

use quill_core::domain::paper::Paper;
use regex::Regex;

/// Citation marker embedded by the generation prompts: an attribute-like
/// token binding a paper id, e.g. `identifier="core-123"`.
fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"identifier="([^"]+)""#).expect("static pattern"))
}

/// Papers cited by the generated text: the marker ids intersected with the
/// set that was supplied as generation input, de-duplicated by id, in order
/// of first appearance. Pure function of its inputs, hence idempotent.
pub fn extract_cited(text: &str, papers: &[Paper]) -> Vec<Paper> {
    let mut seen = BTreeSet::new();
    let mut cited = Vec::new();
    for captures in marker_pattern().captures_iter(text) {
        let id = &captures[1];
        if !seen.insert(id.to_string()) {
            continue;
        }
        if let Some(paper) = papers.iter().find(|paper| paper.id.0 == id) {
            cited.push(paper.clone());
        }
    }
    cited
}
