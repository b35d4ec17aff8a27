#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use review_core::Settings;
use serde_json::{Value, json};

use super::ToolChoice;

pub(crate) fn spawn_exec(
    codex_bin: &str,
    settings: &Settings,
    job_dir: &Path,
    mcp_config_path: &Path,
    prompt: &str,
    tool_choice: Option<&ToolChoice>,
    out_path: &Path,
    stderr_path: &Path,
) -> Result<Child, String> {
    let stderr_file = File::create(stderr_path).map_err(|e| format!("create codex stderr capture failed: {e}"))?;

    let mut cmd = Command::new(codex_bin);
    cmd.arg("exec")
        .arg("--skip-git-repo-check")
        .arg("-c")
        .arg("approval_policy=\"never\"")
        .arg("-s")
        .arg("workspace-write")
        .arg("--mcp-config")
        .arg(mcp_config_path)
        .arg("--output-last-message")
        .arg(out_path)
        .arg("-c")
        .arg(format!("model=\"{}\"", settings.agent_model));

    if let Some(choice) = tool_choice {
        let token = match choice {
            ToolChoice::Named(name) => name.clone(),
            ToolChoice::Required => "required".to_string(),
        };
        cmd.arg("-c").arg(format!("tool_choice=\"{token}\""));
    }

    cmd.current_dir(job_dir);

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_file))
        .spawn()
        .map_err(|e| format!("failed to spawn codex exec ({codex_bin}): {e}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(prompt.as_bytes()).map_err(|e| format!("write codex stdin failed: {e}"))?;
    }

    Ok(child)
}

pub(crate) fn read_output(out_path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(out_path).map_err(|e| format!("read codex output failed: {e}"))?;
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Ok(value),
        Err(_) => Ok(json!({ "text": text.trim() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_args_pass_the_job_scoped_mcp_config() {
        let settings = Settings::default();
        let mut cmd = Command::new("codex");
        cmd.arg("exec")
            .arg("--mcp-config")
            .arg(Path::new("/tmp/job/mcp_config.json"))
            .arg("-c")
            .arg(format!("model=\"{}\"", settings.agent_model));
        let args = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect::<Vec<_>>();
        assert!(args.windows(2).any(|pair| pair[0] == "--mcp-config" && pair[1] == "/tmp/job/mcp_config.json"));
    }
}
