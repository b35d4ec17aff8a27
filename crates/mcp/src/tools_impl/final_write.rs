use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use review_core::ToolOutcome;
use review_core::language::analyze_report_language;
use review_core::sections::{REQUIRED_SECTIONS, normalize_section_id};

use crate::runtime::ToolRuntime;
use crate::section_assembler::{assemble, extract_sections_from_markdown, find_missing};

/// Maps the legacy flat fields onto the canonical required-section ids they correspond to.
/// This mapping is inferred from the section ids themselves, not a declared alias, since the
/// legacy fields were never section-addressed in the first place.
const LEGACY_FIELD_SECTIONS: &[(&str, &str)] = &[
    ("summary", "summary"),
    ("strengths", "strengths"),
    ("weaknesses", "weaknesses"),
    ("issues", "key_issues"),
    ("suggestions", "actionable_suggestions"),
    ("storylines", "storyline_options_writing_outlines"),
];

#[derive(Debug, Default)]
pub struct FinalWriteParams {
    pub markdown: Option<String>,
    pub summary: Option<String>,
    pub strengths: Option<String>,
    pub weaknesses: Option<String>,
    pub issues: Option<String>,
    pub suggestions: Option<String>,
    pub storylines: Option<String>,
    pub section_id: Option<String>,
    pub section_title: Option<String>,
    pub section_content: Option<Value>,
    pub source: Option<String>,
}

pub fn review_final_markdown_write(runtime: &mut ToolRuntime, params: FinalWriteParams) -> ToolOutcome {
    if !runtime.final_markdown_text.is_empty() {
        runtime.record_event("final_report_write_ignored_after_commit", []);
        return ToolOutcome::ok(json!({ "task_completed": true, "final_report_persisted": true }));
    }

    let legacy_fields: &[(&str, &Option<String>)] = &[
        ("summary", &params.summary),
        ("strengths", &params.strengths),
        ("weaknesses", &params.weaknesses),
        ("issues", &params.issues),
        ("suggestions", &params.suggestions),
        ("storylines", &params.storylines),
    ];

    let mut new_content: BTreeMap<&'static str, String> = BTreeMap::new();

    for (field_name, value) in legacy_fields {
        if let Some(text) = value {
            if let Some((_, id)) = LEGACY_FIELD_SECTIONS.iter().find(|(f, _)| f == field_name) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    new_content.insert(id, trimmed.to_string());
                }
            }
        }
    }

    if let Some(markdown) = &params.markdown {
        for (id, content) in extract_sections_from_markdown(markdown) {
            if !content.trim().is_empty() {
                new_content.insert(id, content);
            }
        }
    }

    let explicit_requested = params.section_id.is_some() || params.section_title.is_some();
    if explicit_requested {
        let token = params.section_id.as_deref().or(params.section_title.as_deref()).unwrap_or("");
        let Some(id) = normalize_section_id(token) else {
            return ToolOutcome::error("section_id_invalid", format!("could not resolve section '{token}'"))
                .with_retry_tool("review_final_markdown_write");
        };

        let content = normalize_section_content(params.section_content.as_ref());
        let content = strip_leading_heading_if_same_section(&content, id);
        if content.trim().is_empty() {
            return ToolOutcome::error("section_content_required", format!("section '{id}' content was empty"))
                .with_retry_tool("review_final_markdown_write");
        }
        new_content.insert(id, content);
    }

    if new_content.is_empty() && runtime.section_drafts.is_empty() {
        return ToolOutcome::error(
            "section_payload_required",
            "no new content was provided and no draft exists yet",
        )
        .with_retry_tool("review_final_markdown_write");
    }

    if !new_content.is_empty() {
        for (id, content) in new_content {
            runtime.section_drafts.insert(id, content);
        }
        runtime.draft_version += 1;
        if let Err(e) = runtime.persist_section_drafts() {
            return ToolOutcome::error("io_error", e);
        }
    }

    let draft_markdown = assemble(&runtime.section_drafts);
    let missing = find_missing(&draft_markdown);

    if !missing.is_empty() {
        let completed_sections: Vec<&str> = REQUIRED_SECTIONS
            .iter()
            .map(|spec| spec.id)
            .filter(|id| !missing.contains(id))
            .collect();
        let next_required_section = missing[0];
        runtime.record_event("final_report_draft_saved", [("draft_version", json!(runtime.draft_version))]);
        return ToolOutcome::partial(json!({
            "reason": "required_sections_missing",
            "completed_sections": completed_sections,
            "missing_sections": missing,
            "next_required_section": { "id": next_required_section },
            "draft_version": runtime.draft_version,
            "retry_required": true,
            "next_steps": [format!("submit section_id=\"{next_required_section}\" with section_content")],
        }));
    }

    if runtime.settings.enable_final_gates {
        if let Some(outcome) = check_commit_gates(runtime) {
            return outcome;
        }
    }

    let language_stats = analyze_report_language(&draft_markdown);
    let mut validation_failed: Option<(&'static str, String)> = None;

    if draft_markdown.trim().is_empty() {
        validation_failed = Some(("markdown_required", "assembled report is empty".to_string()));
    } else if runtime.settings.force_english_output && language_stats.chinese_chars > 0 {
        validation_failed = Some(("english_required", "final report must be written in English".to_string()));
    } else if runtime.settings.min_english_words_for_final > 0
        && language_stats.english_words < runtime.settings.min_english_words_for_final
    {
        validation_failed = Some((
            "final_report_length_not_met",
            format!(
                "report has {} English words, minimum is {}",
                language_stats.english_words, runtime.settings.min_english_words_for_final
            ),
        ));
    } else if runtime.settings.min_chinese_chars_for_final > 0
        && language_stats.chinese_chars < runtime.settings.min_chinese_chars_for_final
    {
        validation_failed = Some((
            "final_report_length_not_met",
            format!(
                "report has {} Chinese characters, minimum is {}",
                language_stats.chinese_chars, runtime.settings.min_chinese_chars_for_final
            ),
        ));
    }

    if let Some((reason, message)) = validation_failed {
        if runtime.settings.enable_final_gates {
            return ToolOutcome::error(reason, message).with_retry_tool("review_final_markdown_write");
        }
        runtime.record_event("final_report_validation_skipped", [("reason", json!(reason))]);
    }

    runtime.final_markdown_text = draft_markdown.clone();
    if let Err(e) = runtime.persist_final_markdown() {
        runtime.final_markdown_text.clear();
        return ToolOutcome::error("io_error", e);
    }

    let source = params.source.unwrap_or_else(|| "section_mode".to_string());
    let section_map: Map<String, Value> = runtime
        .section_drafts
        .iter()
        .map(|(id, content)| (id.to_string(), json!(content)))
        .collect();
    let _ = runtime.sync_job_record(|job| {
        job.final_report_ready = true;
        job.artifacts.final_markdown_path = Some("final_report.md".to_string());
        job.metadata.insert("final_report_source".to_string(), json!(source));
        job.metadata.insert("final_report_draft_version".to_string(), json!(runtime.draft_version));
        job.metadata.insert("final_report_sections".to_string(), Value::Object(section_map));
    });

    runtime.record_event("final_report_persisted", [("draft_version", json!(runtime.draft_version))]);
    ToolOutcome::ok(json!({ "task_completed": true, "final_report_persisted": true }))
}

fn check_commit_gates(runtime: &ToolRuntime) -> Option<ToolOutcome> {
    let record = runtime.load_job_record().ok()?;
    let usage = &record.usage;

    if usage.paper_search.total_calls < runtime.settings.min_paper_search_calls_for_final {
        return Some(
            ToolOutcome::error(
                "paper_search_calls_not_met",
                format!(
                    "need {} paper_search calls, have {}",
                    runtime.settings.min_paper_search_calls_for_final, usage.paper_search.total_calls
                ),
            )
            .with_retry_tool("paper_search")
            .with_next_steps(vec!["call paper_search with additional queries".to_string()]),
        );
    }
    if usage.paper_search.distinct_queries < runtime.settings.min_distinct_paper_queries_for_final {
        return Some(
            ToolOutcome::error(
                "paper_search_distinct_queries_not_met",
                format!(
                    "need {} distinct paper_search queries, have {}",
                    runtime.settings.min_distinct_paper_queries_for_final, usage.paper_search.distinct_queries
                ),
            )
            .with_retry_tool("paper_search")
            .with_next_steps(vec!["use a new, distinct query phrasing".to_string()]),
        );
    }
    if record.annotation_count < runtime.settings.min_annotations_for_final {
        return Some(
            ToolOutcome::error(
                "annotation_count_not_met",
                format!(
                    "need {} annotations, have {}",
                    runtime.settings.min_annotations_for_final, record.annotation_count
                ),
            )
            .with_retry_tool("pdf_annotate")
            .with_next_steps(vec!["continue annotating the paper".to_string()]),
        );
    }
    None
}

fn normalize_section_content(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| format!("- {}", value_to_plain_text(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => value_to_plain_text(other),
    }
}

fn value_to_plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn strip_leading_heading_if_same_section(content: &str, id: &'static str) -> String {
    let mut lines = content.lines();
    if let Some(first) = lines.clone().next() {
        let trimmed = first.trim_start();
        if trimmed.starts_with('#') {
            let heading_text = trimmed.trim_start_matches('#').trim();
            if normalize_section_id(heading_text) == Some(id) {
                lines.next();
                return lines.collect::<Vec<_>>().join("\n").trim().to_string();
            }
        }
    }
    content.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_heading_naming_the_same_section() {
        let content = "## Strengths\nGood experiments.";
        assert_eq!(strip_leading_heading_if_same_section(content, "strengths"), "Good experiments.");
    }

    #[test]
    fn keeps_leading_heading_naming_a_different_section() {
        let content = "## Weaknesses\nSome issues.";
        assert_eq!(strip_leading_heading_if_same_section(content, "strengths"), "## Weaknesses\nSome issues.");
    }

    #[test]
    fn normalize_section_content_joins_list_as_bullets() {
        let value = json!(["first point", "second point"]);
        assert_eq!(normalize_section_content(Some(&value)), "- first point\n- second point");
    }
}
