#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use review_core::Settings;
use serde_json::{Value, json};

use super::ToolChoice;

fn append_exec_args(cmd: &mut Command, job_dir: &Path, mcp_config_path: &Path, settings: &Settings, tool_choice: Option<&ToolChoice>) {
    cmd.arg("-p")
        .arg("--output-format")
        .arg("json")
        .arg("--no-session-persistence")
        // The runner must never block on an interactive permission prompt.
        .arg("--dangerously-skip-permissions")
        .arg("--add-dir")
        .arg(job_dir.to_string_lossy().to_string())
        // Only the one review tool server is loaded; no ambient user/global config.
        .arg("--strict-mcp-config")
        .arg("--mcp-config")
        .arg(mcp_config_path.to_string_lossy().to_string())
        .arg("--model")
        .arg(&settings.agent_model);

    if let Some(choice) = tool_choice {
        cmd.arg("--tool-choice").arg(match choice {
            ToolChoice::Named(name) => name.as_str(),
            ToolChoice::Required => "required",
        });
    }
}

pub(crate) fn spawn_exec(
    claude_bin: &str,
    settings: &Settings,
    job_dir: &Path,
    mcp_config_path: &Path,
    prompt: &str,
    tool_choice: Option<&ToolChoice>,
    out_path: &Path,
    stderr_path: &Path,
) -> Result<Child, String> {
    let stdout_file = File::create(out_path).map_err(|e| format!("create claude stdout capture failed: {e}"))?;
    let stderr_file = File::create(stderr_path).map_err(|e| format!("create claude stderr capture failed: {e}"))?;

    let mut cmd = Command::new(claude_bin);
    append_exec_args(&mut cmd, job_dir, mcp_config_path, settings, tool_choice);
    cmd.current_dir(job_dir);

    let mut child = cmd
        // `--print`/JSON output expects the prompt over stdin; argv is brittle (ARG_MAX, quoting).
        .stdin(Stdio::piped())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .spawn()
        .map_err(|e| format!("failed to spawn claude ({claude_bin}): {e}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(prompt.as_bytes()).map_err(|e| format!("write claude stdin failed: {e}"))?;
    }

    Ok(child)
}

pub(crate) fn read_output(out_path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(out_path).map_err(|e| format!("read claude output failed: {e}"))?;
    let Ok(value) = serde_json::from_str::<Value>(&text) else {
        // Non-JSON stdout is still a completed attempt; hand back the raw text rather than
        // failing the whole attempt over an output-format mismatch.
        return Ok(json!({ "text": text.trim() }));
    };

    if value.get("is_error").and_then(Value::as_bool) == Some(true) {
        let subtype = value.get("subtype").and_then(Value::as_str).unwrap_or("claude_error");
        return Err(format!("claude_code: {subtype}"));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    fn mk_tmp_dir(prefix: &str) -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        let pid = std::process::id();
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        dir.push(format!("{prefix}_{pid}_{ts}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[cfg(unix)]
    #[test]
    fn prompt_is_sent_via_stdin() {
        let tmp = mk_tmp_dir("review_runner_claude_stdin");
        let seen_path = tmp.join("seen_prompt.txt");
        let out_path = tmp.join("out.json");
        let stderr_path = tmp.join("err.txt");
        let mcp_config_path = tmp.join("mcp_config.json");
        fs::write(&mcp_config_path, "{}").unwrap();

        let shim_path = tmp.join("claude_shim.sh");
        let shim = format!(
            "#!/usr/bin/env bash\nset -euo pipefail\ncat - > \"{seen}\"\nprintf '%s\\n' '{{\"type\":\"result\"}}'\n",
            seen = seen_path.to_string_lossy()
        );
        fs::write(&shim_path, shim).unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&shim_path).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&shim_path, perms).unwrap();
        }

        let settings = Settings::default();
        let prompt = "hello from stdin";
        let mut child = spawn_exec(
            shim_path.to_string_lossy().as_ref(),
            &settings,
            &tmp,
            &mcp_config_path,
            prompt,
            None,
            &out_path,
            &stderr_path,
        )
        .expect("spawn_exec");
        let _ = child.wait();

        let mut got = String::new();
        fs::File::open(&seen_path).unwrap().read_to_string(&mut got).unwrap();
        assert_eq!(got, prompt);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn exec_args_carry_the_job_scoped_mcp_config() {
        let settings = Settings::default();
        let mut cmd = Command::new("claude");
        let mcp_config_path = Path::new("/tmp/job/mcp_config.json");
        append_exec_args(&mut cmd, Path::new("/tmp/job"), mcp_config_path, &settings, None);
        let args = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect::<Vec<_>>();

        assert!(args.iter().any(|a| a == "--strict-mcp-config"));
        assert!(
            args.windows(2).any(|pair| pair[0] == "--mcp-config" && pair[1] == "/tmp/job/mcp_config.json"),
            "expected job-scoped mcp config path in args: {args:?}"
        );
    }

    #[test]
    fn tool_choice_required_is_forwarded() {
        let settings = Settings::default();
        let mut cmd = Command::new("claude");
        append_exec_args(&mut cmd, Path::new("/tmp/job"), Path::new("/tmp/job/mcp_config.json"), &settings, Some(&ToolChoice::Required));
        let args = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect::<Vec<_>>();
        assert!(args.windows(2).any(|pair| pair[0] == "--tool-choice" && pair[1] == "required"));
    }
}
