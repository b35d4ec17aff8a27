#![forbid(unsafe_code)]

//! Writes the MCP server config the external agent CLI loads to reach a job's tool suite.
//! The agent CLI spawns `review_mcp` itself as a stdio child; the controller never talks to
//! the tool server directly, only to `job.json` on disk.

use std::path::{Path, PathBuf};

use review_core::{JobId, Settings};
use serde_json::json;

pub(crate) fn write_mcp_config(job_dir: &Path, job_id: JobId, data_dir: &Path, settings: &Settings) -> Result<PathBuf, String> {
    let config = json!({
        "mcpServers": {
            "review": {
                "command": settings.review_mcp_bin,
                "args": ["--job-id", job_id.to_string(), "--data-dir", data_dir.to_string_lossy()],
            }
        }
    });
    let path = job_dir.join("mcp_config.json");
    review_store::write_json_atomic(&path, &config).map_err(|e| e.to_string())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_config_names_the_tool_server_and_job_args() {
        let dir = std::env::temp_dir().join(format!("review_runner_mcp_config_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let settings = Settings::default();
        let job_id = JobId::new();
        let path = write_mcp_config(&dir, job_id, &dir, &settings).unwrap();
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["mcpServers"]["review"]["command"], "review_mcp");
        assert_eq!(written["mcpServers"]["review"]["args"][1], job_id.to_string());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
