//! Assembles and parses the section-mode final report independently of the write tool so both
//! directions of the round-trip (P5) are testable on their own: `extract_sections_from_markdown`
//! is the inverse of `assemble`.

use std::collections::BTreeMap;

use review_core::sections::{REQUIRED_SECTIONS, normalize_section_id};

/// Scans `#{1,6} <title>` headings and groups the non-heading lines that follow each one,
/// keyed by the resolved canonical section id. Unrecognized headings are ignored along with
/// their body (the write tool only cares about required sections).
pub fn extract_sections_from_markdown(text: &str) -> BTreeMap<&'static str, String> {
    let mut sections: BTreeMap<&'static str, Vec<&str>> = BTreeMap::new();
    let mut current: Option<&'static str> = None;

    for line in text.lines() {
        if let Some(title) = heading_title(line) {
            current = normalize_section_id(title);
            continue;
        }
        if let Some(id) = current {
            sections.entry(id).or_default().push(line);
        }
    }

    sections
        .into_iter()
        .map(|(id, lines)| (id, join_trimmed(&lines)))
        .filter(|(_, content)| !content.is_empty())
        .collect()
}

fn heading_title(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = trimmed[hashes..].trim();
    if rest.is_empty() { None } else { Some(rest) }
}

fn join_trimmed(lines: &[&str]) -> String {
    let joined = lines.join("\n");
    joined.trim().to_string()
}

/// Emits `## <Title>` followed by content for each required section that has non-empty
/// content, in canonical order, separated by a blank line. Sections with no content are
/// skipped entirely (the write tool only calls this once every required section is present).
pub fn assemble(sections: &BTreeMap<&'static str, String>) -> String {
    let mut blocks = Vec::new();
    for spec in REQUIRED_SECTIONS {
        if let Some(content) = sections.get(spec.id) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                blocks.push(format!("## {}\n{}", spec.title, trimmed));
            }
        }
    }
    blocks.join("\n\n")
}

/// Ordered list of required section ids absent from the markdown, using the same heading-scan
/// algorithm as `extract_sections_from_markdown` so validation matches assembly regardless of
/// the order sections were originally supplied in.
pub fn find_missing(markdown: &str) -> Vec<&'static str> {
    let present = extract_sections_from_markdown(markdown);
    REQUIRED_SECTIONS
        .iter()
        .map(|spec| spec.id)
        .filter(|id| !present.contains_key(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_then_extract_round_trips() {
        let mut sections = BTreeMap::new();
        for spec in REQUIRED_SECTIONS {
            sections.insert(spec.id, format!("Content for {}.", spec.id));
        }
        let markdown = assemble(&sections);
        let extracted = extract_sections_from_markdown(&markdown);
        assert_eq!(extracted, sections);
    }

    #[test]
    fn find_missing_lists_unsatisfied_sections_in_canonical_order() {
        let markdown = "## Summary\nAll good.\n\n## Strengths\nStrong experiments.\n";
        let missing = find_missing(markdown);
        assert_eq!(missing[0], "weaknesses");
        assert!(missing.contains(&"references"));
        assert!(!missing.contains(&"summary"));
    }

    #[test]
    fn sections_with_empty_content_are_skipped_by_assemble() {
        let mut sections = BTreeMap::new();
        sections.insert("summary", String::new());
        sections.insert("strengths", "Good point.".to_string());
        let markdown = assemble(&sections);
        assert!(!markdown.contains("## Summary"));
        assert!(markdown.contains("## Strengths"));
    }
}
