#![forbid(unsafe_code)]

pub(crate) mod claude_code;
pub(crate) mod codex;

use std::path::Path;
use std::process::Child;

use review_core::Settings;

use crate::bin_detect::resolve_optional_bin;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ExecutorKind {
    ClaudeCode,
    Codex,
}

impl ExecutorKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ExecutorKind::ClaudeCode => "claude_code",
            ExecutorKind::Codex => "codex",
        }
    }

    fn default_bin_name(self) -> &'static str {
        match self {
            ExecutorKind::ClaudeCode => "claude",
            ExecutorKind::Codex => "codex",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "claude_code" | "claude" => Some(ExecutorKind::ClaudeCode),
            "codex" => Some(ExecutorKind::Codex),
            _ => None,
        }
    }
}

/// Constrains a single agent attempt to call a specific tool, or any tool at all. Only the
/// forced-final-write retry (the last resume attempt) ever sets this to something other than
/// `None`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum ToolChoice {
    Named(String),
    Required,
}

pub(crate) struct ExecutorPlan {
    pub(crate) kind: ExecutorKind,
    pub(crate) bin: String,
}

/// Resolves which agent CLI drives the review and where its binary lives: an explicit
/// `agent_executor_kind`/`agent_executor_bin` pair wins, otherwise `PATH` is probed for
/// `claude` then `codex`, in that order.
pub(crate) fn resolve_executor_plan(settings: &Settings) -> Result<ExecutorPlan, String> {
    if let Some(kind_raw) = settings.agent_executor_kind.as_deref() {
        let kind = ExecutorKind::parse(kind_raw)
            .ok_or_else(|| format!("unrecognized agent_executor_kind '{kind_raw}'"))?;
        let bin = resolve_optional_bin(settings.agent_executor_bin.clone(), kind.default_bin_name())
            .ok_or_else(|| format!("cannot locate a '{}' executable on PATH", kind.default_bin_name()))?;
        return Ok(ExecutorPlan { kind, bin });
    }

    if let Some(bin) = settings.agent_executor_bin.clone() {
        // An explicit binary with no declared kind is assumed to speak the Claude Code CLI
        // surface: the richer of the two, and the default most deployments reach for.
        return Ok(ExecutorPlan { kind: ExecutorKind::ClaudeCode, bin });
    }

    if let Some(bin) = resolve_optional_bin(None, ExecutorKind::ClaudeCode.default_bin_name()) {
        return Ok(ExecutorPlan { kind: ExecutorKind::ClaudeCode, bin });
    }
    if let Some(bin) = resolve_optional_bin(None, ExecutorKind::Codex.default_bin_name()) {
        return Ok(ExecutorPlan { kind: ExecutorKind::Codex, bin });
    }

    Err("no agent executor found on PATH (looked for 'claude' then 'codex')".to_string())
}

/// Spawns one subprocess attempt of the resolved agent CLI, with the job's MCP tool server
/// wired in via `mcp_config_path`, `prompt` piped to stdin, and stdout/stderr captured to
/// `out_path`/`stderr_path`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_attempt(
    plan: &ExecutorPlan,
    settings: &Settings,
    job_dir: &Path,
    mcp_config_path: &Path,
    prompt: &str,
    tool_choice: Option<&ToolChoice>,
    out_path: &Path,
    stderr_path: &Path,
) -> Result<Child, String> {
    match plan.kind {
        ExecutorKind::ClaudeCode => claude_code::spawn_exec(
            &plan.bin,
            settings,
            job_dir,
            mcp_config_path,
            prompt,
            tool_choice,
            out_path,
            stderr_path,
        ),
        ExecutorKind::Codex => codex::spawn_exec(
            &plan.bin,
            settings,
            job_dir,
            mcp_config_path,
            prompt,
            tool_choice,
            out_path,
            stderr_path,
        ),
    }
}

/// Reads an attempt's captured output back into a JSON value, dispatching to the executor
/// that produced it.
pub(crate) fn read_output(plan: &ExecutorPlan, out_path: &Path) -> Result<serde_json::Value, String> {
    match plan.kind {
        ExecutorKind::ClaudeCode => claude_code::read_output(out_path),
        ExecutorKind::Codex => codex::read_output(out_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_kind_and_bin_are_honored_verbatim() {
        let mut settings = Settings::default();
        settings.agent_executor_kind = Some("codex".to_string());
        settings.agent_executor_bin = Some("/opt/bin/codex".to_string());
        let plan = resolve_executor_plan(&settings).unwrap();
        assert_eq!(plan.kind, ExecutorKind::Codex);
        assert_eq!(plan.bin, "/opt/bin/codex");
    }

    #[test]
    fn unrecognized_kind_is_rejected() {
        let mut settings = Settings::default();
        settings.agent_executor_kind = Some("not_a_real_cli".to_string());
        assert!(resolve_executor_plan(&settings).is_err());
    }
}
