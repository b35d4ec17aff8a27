//! Translates a `tools/call` request's `{name, arguments}` pair into a typed call against one
//! of the nine tool handlers, and serializes the resulting `ToolOutcome` back to the flat JSON
//! shape the agent framework expects.

use review_core::ToolOutcome;
use review_core::annotation::{ObjectType, Severity};
use serde_json::Value;

use crate::runtime::ToolRuntime;
use crate::tools_impl::{self, FinalWriteParams};

pub fn dispatch(runtime: &mut ToolRuntime, tool_name: &str, arguments: &Value) -> Value {
    let outcome = match tool_name {
        "status_update" => tools_impl::status_update(
            runtime,
            str_arg(arguments, "step").unwrap_or_default(),
            opt_str_arg(arguments, "completed"),
            opt_str_arg(arguments, "blocked"),
            opt_str_arg(arguments, "todo"),
        ),
        "pdf_search" => tools_impl::pdf_search(
            runtime,
            str_arg(arguments, "query").unwrap_or_default(),
            u32_arg(arguments, "top_k").unwrap_or(8),
        ),
        "pdf_read_lines" => tools_impl::pdf_read_lines(
            runtime,
            u32_arg(arguments, "page").unwrap_or(0),
            u32_arg(arguments, "start_line").unwrap_or(1),
            u32_arg(arguments, "end_line").unwrap_or(1),
        ),
        "pdf_jump" => tools_impl::pdf_jump(runtime, u32_arg(arguments, "page").unwrap_or(0)),
        "pdf_annotate" => tools_impl::pdf_annotate(
            runtime,
            u32_arg(arguments, "page").unwrap_or(0),
            u32_arg(arguments, "start_line").unwrap_or(1),
            u32_arg(arguments, "end_line").unwrap_or(1),
            str_arg(arguments, "comment").unwrap_or_default(),
            opt_str_arg(arguments, "summary"),
            parse_object_type(opt_str_arg(arguments, "object_type")),
            parse_severity(opt_str_arg(arguments, "severity")),
        ),
        "paper_search" => tools_impl::paper_search(
            runtime,
            opt_str_arg(arguments, "query"),
            arguments.get("question_list"),
        ),
        "read_paper" => {
            let items = arguments.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
            tools_impl::read_paper(runtime, &items)
        }
        "question_prompt" => tools_impl::question_prompt(runtime, str_arg(arguments, "question").unwrap_or_default()),
        "review_final_markdown_write" => {
            let params = FinalWriteParams {
                markdown: opt_str_arg(arguments, "markdown").map(str::to_string),
                summary: opt_str_arg(arguments, "summary").map(str::to_string),
                strengths: opt_str_arg(arguments, "strengths").map(str::to_string),
                weaknesses: opt_str_arg(arguments, "weaknesses").map(str::to_string),
                issues: opt_str_arg(arguments, "issues").map(str::to_string),
                suggestions: opt_str_arg(arguments, "suggestions").map(str::to_string),
                storylines: opt_str_arg(arguments, "storylines").map(str::to_string),
                section_id: opt_str_arg(arguments, "section_id").map(str::to_string),
                section_title: opt_str_arg(arguments, "section_title").map(str::to_string),
                section_content: arguments.get("section_content").cloned(),
                source: opt_str_arg(arguments, "source").map(str::to_string),
            };
            tools_impl::review_final_markdown_write(runtime, params)
        }
        other => ToolOutcome::error("unknown_tool", format!("no such tool: {other}")),
    };

    outcome.into_value()
}

fn str_arg<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

fn opt_str_arg<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn u32_arg(arguments: &Value, key: &str) -> Option<u32> {
    arguments.get(key).and_then(Value::as_u64).map(|v| v as u32)
}

fn parse_object_type(raw: Option<&str>) -> ObjectType {
    match raw {
        Some("issue") => ObjectType::Issue,
        Some("verification") => ObjectType::Verification,
        _ => ObjectType::Suggestion,
    }
}

fn parse_severity(raw: Option<&str>) -> Option<Severity> {
    match raw {
        Some("critical") => Some(Severity::Critical),
        Some("major") => Some(Severity::Major),
        Some("minor") => Some(Severity::Minor),
        _ => None,
    }
}
