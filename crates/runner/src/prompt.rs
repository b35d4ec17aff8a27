#![forbid(unsafe_code)]

//! Builds the text handed to the agent CLI on stdin: the full task brief on the first
//! attempt, a short continuation nudge on any resume, and a hard demand on the final,
//! forced-tool-choice attempt.

use review_core::sections::REQUIRED_SECTIONS;
use review_core::{JobRecord, Settings};

pub(crate) fn sanitize_single_line(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
}

pub(crate) fn truncate_for_prompt(text: &str, max_chars: usize) -> String {
    let sanitized = sanitize_single_line(text).trim().to_string();
    if sanitized.chars().count() <= max_chars {
        return sanitized;
    }
    let mut out = String::new();
    for (i, ch) in sanitized.chars().enumerate() {
        if i >= max_chars.saturating_sub(1) {
            break;
        }
        out.push(ch);
    }
    out.push('\u{2026}');
    out
}

fn required_sections_listing() -> String {
    REQUIRED_SECTIONS
        .iter()
        .enumerate()
        .map(|(i, spec)| format!("{}. {} (`{}`)", i + 1, spec.title, spec.id))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The brief given on the first attempt: the paper's title, the tool suite available over
/// MCP, the gates that block `pdf_annotate`/`review_final_markdown_write`, and the eleven
/// sections the final report must contain.
pub(crate) fn build_initial_prompt(settings: &Settings, record: &JobRecord) -> String {
    let title = truncate_for_prompt(&record.title, 300);
    format!(
        "You are reviewing the paper \"{title}\" for a complete, rigorous peer review.\n\n\
         Use the `review` MCP tools to work through it: `pdf_search`, `pdf_read_lines`, and \
         `pdf_jump` to navigate the parsed text; `paper_search` and `read_paper` to check \
         related work; `pdf_annotate` to record specific findings tied to a page and line \
         range; `status_update` to report progress; `question_prompt` is not available in this \
         deployment.\n\n\
         `pdf_annotate` is blocked until you have called `paper_search` at least {min_search} \
         time(s). The final report cannot be committed until you have made at least \
         {min_search_final} `paper_search` calls across at least {min_distinct} distinct \
         queries and recorded at least {min_annotations} annotations.\n\n\
         Write the final report with `review_final_markdown_write`, one section at a time, \
         using `section_id` and `section_content`. The report is not committed until every one \
         of the following sections has been submitted:\n{sections}\n\n\
         Once every section has been accepted the tool reports success and your task is \
         complete. Do not stop before that point.",
        min_search = settings.min_paper_search_calls_for_pdf_annotate,
        min_search_final = settings.min_paper_search_calls_for_final,
        min_distinct = settings.min_distinct_paper_queries_for_final,
        min_annotations = settings.min_annotations_for_final,
        sections = required_sections_listing(),
    )
}

/// The nudge sent on a resumed attempt: current counters plus a demand to finish in
/// section mode rather than starting over.
pub(crate) fn build_continuation_prompt(record: &JobRecord) -> String {
    format!(
        "Continue the review of \"{title}\" from where you left off. The tool runtime has kept \
         your prior progress: {paper_search} paper_search call(s) ({distinct} distinct \
         queries), {annotations} annotation(s) recorded. Submit any remaining required sections \
         with `review_final_markdown_write` using `section_id` and `section_content` until the \
         tool reports the report is committed. Do not restart the review from scratch.",
        title = truncate_for_prompt(&record.title, 300),
        paper_search = record.usage.paper_search.total_calls,
        distinct = record.usage.paper_search.distinct_queries,
        annotations = record.annotation_count,
    )
}

/// The last-resort message sent alongside a forced `review_final_markdown_write` tool choice:
/// no more exploration, just commit whatever can be committed now.
pub(crate) fn build_forced_commit_prompt(record: &JobRecord) -> String {
    format!(
        "This is your final attempt. Call `review_final_markdown_write` now with `section_id` \
         and `section_content` for every required section still missing for \"{title}\", using \
         your best available findings. Do not call any other tool first.",
        title = truncate_for_prompt(&record.title, 300),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_core::JobId;

    #[test]
    fn truncate_for_prompt_adds_ellipsis_when_clipped() {
        let text = "a".repeat(50);
        let truncated = truncate_for_prompt(&text, 10);
        assert_eq!(truncated.chars().count(), 10);
        assert!(truncated.ends_with('\u{2026}'));
    }

    #[test]
    fn sanitize_single_line_strips_newlines() {
        assert_eq!(sanitize_single_line("a\nb\r\nc"), "a b  c");
    }

    #[test]
    fn initial_prompt_lists_every_required_section() {
        let settings = Settings::default();
        let record = JobRecord::new(JobId::new(), "A Paper".to_string(), "p.pdf".to_string(), "now");
        let prompt = build_initial_prompt(&settings, &record);
        for spec in REQUIRED_SECTIONS {
            assert!(prompt.contains(spec.id), "missing {} in prompt", spec.id);
        }
    }
}
