#![forbid(unsafe_code)]

//! Talks to the external PDF-parse service: uploads the source PDF, polls for a terminal
//! result across every configured status endpoint, then extracts markdown and an optional
//! content list from whichever shape the terminal payload turns out to hold. Falls back to a
//! local, much coarser text extraction when the remote is unconfigured or unreachable and
//! local fallback is allowed.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use review_core::Settings;
use serde_json::{Value, json};

pub(crate) struct ParseResult {
    pub(crate) markdown: String,
    pub(crate) content_list: Option<Value>,
    pub(crate) batch_id: Option<String>,
    pub(crate) raw_result: Option<Value>,
    pub(crate) provider: &'static str,
    pub(crate) warning: Option<String>,
}

pub(crate) fn parse_pdf(path: &Path, data_id: &str, settings: &Settings) -> Result<ParseResult, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("read source pdf failed: {e}"))?;

    let Some(base_url) = settings.mineru_base_url.as_deref() else {
        return if settings.mineru_allow_local_fallback {
            local_fallback(&bytes, None)
        } else {
            Err("unconfigured".to_string())
        };
    };

    match parse_remote(base_url, &bytes, data_id, settings) {
        Ok(result) => Ok(result),
        Err(e) => {
            if settings.mineru_allow_local_fallback {
                local_fallback(&bytes, Some(e))
            } else {
                Err(e)
            }
        }
    }
}

fn http_timeout(min_seconds: u64) -> Duration {
    Duration::from_secs(min_seconds.max(20))
}

fn resolve_url(base_url: &str, path_or_url: &str) -> String {
    if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
        path_or_url.to_string()
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), path_or_url.trim_start_matches('/'))
    }
}

fn parse_remote(base_url: &str, bytes: &[u8], data_id: &str, settings: &Settings) -> Result<ParseResult, String> {
    let upload_url = resolve_url(base_url, &settings.mineru_upload_endpoint);
    let payload = json!({
        "files": [{ "name": data_id, "data_id": data_id }],
        "model_version": settings.mineru_model_version,
    });

    let mut request = ureq::post(&upload_url).timeout(http_timeout(settings.mineru_poll_timeout_seconds));
    if let Some(token) = settings.mineru_api_token.as_deref() {
        request = request.set("Authorization", &format!("Bearer {token}"));
    }
    let response: Value = request
        .send_json(payload)
        .map_err(|e| format!("parse_upload_failed: {e}"))?
        .into_json()
        .map_err(|e| format!("parse_upload_failed: invalid upload response: {e}"))?;

    if response.get("code").and_then(Value::as_i64) != Some(0) {
        return Err(format!("parse_upload_failed: upload rejected: {response}"));
    }
    let data = response.get("data").cloned().unwrap_or(Value::Null);
    let batch_id = data.get("batch_id").and_then(Value::as_str).map(str::to_string);
    let file_urls: Vec<String> = data
        .get("file_urls")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    if file_urls.is_empty() {
        return Err("parse_upload_failed: no upload URLs returned".to_string());
    }

    for file_url in &file_urls {
        match ureq::put(file_url).timeout(http_timeout(settings.mineru_poll_timeout_seconds)).send_bytes(bytes) {
            Ok(resp) if resp.status() == 200 => {}
            Ok(resp) => return Err(format!("parse_upload_failed: PUT returned status {}", resp.status())),
            Err(e) => return Err(format!("parse_upload_failed: {e}")),
        }
    }

    let status_urls = build_status_url_list(&data, batch_id.as_deref(), base_url, settings);
    poll_for_result(&status_urls, settings, batch_id)
}

fn build_status_url_list(data: &Value, batch_id: Option<&str>, base_url: &str, settings: &Settings) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |url: String| {
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    };

    for key in ["status_url", "result_url", "batch_status_url", "batch_result_url"] {
        if let Some(url) = data.get(key).and_then(Value::as_str) {
            push(url.to_string());
        }
    }

    if let Some(batch_id) = batch_id {
        for template in settings.mineru_poll_templates() {
            let path = template.replace("{batch_id}", batch_id);
            push(resolve_url(base_url, &path));
        }
    }

    urls
}

fn poll_for_result(status_urls: &[String], settings: &Settings, batch_id: Option<String>) -> Result<ParseResult, String> {
    if status_urls.is_empty() {
        return Err("parse_upload_failed: no status endpoints configured".to_string());
    }

    let deadline = Instant::now() + Duration::from_secs(settings.mineru_poll_timeout_seconds.max(30));
    let poll_interval = Duration::from_secs_f64(settings.mineru_poll_interval_seconds.max(0.8));

    loop {
        for url in status_urls {
            let payload = ureq::get(url)
                .timeout(http_timeout(20))
                .call()
                .ok()
                .and_then(|resp| resp.into_json::<Value>().ok());
            let Some(payload) = payload.filter(Value::is_object) else { continue };

            if is_terminal_failure(&payload) {
                return Err(format!("invalid_remote_payload: {payload}"));
            }
            if is_terminal_success(&payload) {
                return extract_output(&payload, batch_id);
            }
        }

        if Instant::now() >= deadline {
            return Err("parse_timeout".to_string());
        }
        std::thread::sleep(poll_interval);
    }
}

/// Looks for a state/status keyword across every location a MinerU-shaped payload might put
/// it: top level, `data`, and `data.result` — nested polling responses wrap the real status
/// under one or two extra layers depending on the endpoint.
fn find_status_keyword(payload: &Value) -> Option<String> {
    for loc in search_locations(payload) {
        for key in ["state", "status", "task_state", "batch_state"] {
            if let Some(s) = loc.get(key).and_then(Value::as_str) {
                return Some(s.to_lowercase());
            }
        }
    }
    None
}

fn is_terminal_failure(payload: &Value) -> bool {
    if let Some(state) = find_status_keyword(payload) {
        if matches!(state.as_str(), "failed" | "error" | "aborted") {
            return true;
        }
    }
    if let Some(code) = payload.get("code").and_then(Value::as_i64) {
        if code == 0 {
            return false;
        }
        let message = payload
            .get("msg")
            .or_else(|| payload.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        // A batch that has not registered yet (or whose window already expired) is not a hard
        // failure; the next poll cycle is expected to either find it or eventually time out.
        if code == -60012 && (message.contains("task not found") || message.contains("expire")) {
            return false;
        }
        if message.contains("processing") || message.contains("running") {
            return false;
        }
        return true;
    }
    false
}

fn is_terminal_success(payload: &Value) -> bool {
    if extract_markdown_value(payload).is_some() {
        return true;
    }
    if let Some(state) = find_status_keyword(payload) {
        if matches!(state.as_str(), "done" | "completed" | "success" | "succeeded" | "finished") {
            return true;
        }
    }
    if payload.get("code").and_then(Value::as_i64) == Some(0) {
        for loc in search_locations(payload) {
            if loc.get("full_zip_url").is_some() || loc.get("markdown").is_some() || loc.get("md").is_some() {
                return true;
            }
            if let Some(results) = loc.get("extract_result").and_then(Value::as_array) {
                let any_success = results.iter().any(|r| {
                    r.get("state")
                        .and_then(Value::as_str)
                        .map(|s| s.eq_ignore_ascii_case("success") || s.eq_ignore_ascii_case("done"))
                        .unwrap_or(false)
                });
                if any_success {
                    return true;
                }
            }
        }
    }
    false
}

fn search_locations(payload: &Value) -> Vec<&Value> {
    let mut locations = vec![payload];
    if let Some(data) = payload.get("data") {
        locations.push(data);
        if let Some(result) = data.get("result") {
            locations.push(result);
        }
    }
    locations
}

fn extract_markdown_value(payload: &Value) -> Option<String> {
    for loc in search_locations(payload) {
        for key in ["markdown", "md", "full_md", "full_markdown"] {
            if let Some(text) = loc.get(key).and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    return Some(text.to_string());
                }
            }
        }
    }
    None
}

fn extract_content_list_value(payload: &Value) -> Option<Value> {
    for loc in search_locations(payload) {
        for key in ["content_list", "content_list_json", "mineru_content_list"] {
            if let Some(value) = loc.get(key) {
                if !value.is_null() {
                    return Some(value.clone());
                }
            }
        }
    }
    None
}

fn find_url(payload: &Value, keys: &[&str]) -> Option<String> {
    for loc in search_locations(payload) {
        for key in keys {
            if let Some(url) = loc.get(*key).and_then(Value::as_str) {
                if !url.trim().is_empty() {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}

fn extract_output(payload: &Value, batch_id: Option<String>) -> Result<ParseResult, String> {
    let mut markdown = extract_markdown_value(payload);
    let mut content_list = extract_content_list_value(payload);
    let mut warning = None;

    if markdown.is_none() {
        if let Some(url) = find_url(payload, &["markdown_url", "md_url", "full_md_url", "full_md"]) {
            if let Ok(text) = ureq::get(&url).timeout(http_timeout(60)).call().and_then(|r| r.into_string().map_err(Into::into)) {
                if !text.trim().is_empty() {
                    markdown = Some(text);
                }
            }
        }
    }

    if content_list.is_none() {
        if let Some(url) = find_url(payload, &["content_list_url", "content_list_json_url", "content_list_json"]) {
            if let Ok(resp) = ureq::get(&url).timeout(http_timeout(60)).call() {
                if let Ok(value) = resp.into_json::<Value>() {
                    if value.is_array() {
                        content_list = Some(value);
                    }
                }
            }
        }
    }

    if markdown.is_none() || content_list.is_none() {
        if let Some(zip_url) = find_url(payload, &["full_zip_url", "zip_url", "result_zip_url", "download_url"]) {
            match download_and_extract_zip(&zip_url) {
                Ok((zip_markdown, zip_content_list)) => {
                    if markdown.is_none() {
                        markdown = zip_markdown;
                    }
                    if content_list.is_none() {
                        content_list = zip_content_list;
                    }
                }
                Err(e) => warning = Some(format!("zip extraction failed: {e}")),
            }
        }
    }

    if markdown.is_none() {
        if let Some(files) = payload.get("data").and_then(|d| d.get("files")).and_then(Value::as_array) {
            let parts: Vec<String> = files
                .iter()
                .filter_map(|file| {
                    for key in ["markdown", "md", "full_md"] {
                        if let Some(text) = file.get(key).and_then(Value::as_str) {
                            if !text.trim().is_empty() {
                                return Some(text.to_string());
                            }
                        }
                    }
                    None
                })
                .collect();
            if !parts.is_empty() {
                markdown = Some(parts.join("\n\n---\n\n"));
            }
        }
    }

    let markdown = markdown.unwrap_or_default();
    if markdown.trim().is_empty() {
        return Err("empty_markdown".to_string());
    }

    Ok(ParseResult {
        markdown,
        content_list,
        batch_id,
        raw_result: Some(payload.clone()),
        provider: "mineru",
        warning,
    })
}

fn download_and_extract_zip(url: &str) -> Result<(Option<String>, Option<Value>), String> {
    let response = ureq::get(url).timeout(http_timeout(120)).call().map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    response.into_reader().read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader).map_err(|e| e.to_string())?;

    let mut markdown_parts = Vec::new();
    let mut content_list = None;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        let name = entry.name().to_string();
        if name.ends_with(".md") {
            let mut text = String::new();
            entry.read_to_string(&mut text).map_err(|e| e.to_string())?;
            markdown_parts.push(text);
        } else if content_list.is_none() && name.ends_with("_content_list.json") {
            let mut text = String::new();
            entry.read_to_string(&mut text).map_err(|e| e.to_string())?;
            content_list = serde_json::from_str(&text).ok();
        }
    }

    let markdown = if markdown_parts.is_empty() { None } else { Some(markdown_parts.join("\n\n---\n\n")) };
    Ok((markdown, content_list))
}

/// Per-page text extraction used when the remote parser is unconfigured, or its own attempt
/// failed and local fallback is allowed. Much coarser than the remote parser: no layout,
/// tables, or figures, just page-bounded text.
fn local_fallback(bytes: &[u8], prior_error: Option<String>) -> Result<ParseResult, String> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| format!("local pdf extraction failed: {e}"))?;
    let pages: Vec<&str> = text.split('\u{c}').collect();

    let mut markdown = String::new();
    let mut content_rows = Vec::new();
    for (idx, page_text) in pages.iter().enumerate() {
        let trimmed = page_text.trim();
        if trimmed.is_empty() {
            continue;
        }
        markdown.push_str(&format!("## Page {}\n{}\n\n", idx + 1, trimmed));
        content_rows.push(json!({ "page_idx": idx, "type": "text", "text": trimmed }));
    }

    if markdown.trim().is_empty() {
        return Err("empty_markdown".to_string());
    }

    Ok(ParseResult {
        markdown,
        content_list: Some(Value::Array(content_rows)),
        batch_id: None,
        raw_result: None,
        provider: "local_fallback",
        warning: prior_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_failure_recognizes_declared_states() {
        assert!(is_terminal_failure(&json!({ "state": "failed" })));
        assert!(is_terminal_failure(&json!({ "state": "ABORTED" })));
        assert!(!is_terminal_failure(&json!({ "state": "running" })));
    }

    #[test]
    fn benign_task_not_found_code_is_not_terminal() {
        let payload = json!({ "code": -60012, "msg": "task not found" });
        assert!(!is_terminal_failure(&payload));
        assert!(!is_terminal_success(&payload));
    }

    #[test]
    fn processing_message_with_nonzero_code_is_not_terminal() {
        let payload = json!({ "code": 1, "message": "processing" });
        assert!(!is_terminal_failure(&payload));
    }

    #[test]
    fn other_nonzero_code_is_terminal_failure() {
        let payload = json!({ "code": 42, "message": "bad request" });
        assert!(is_terminal_failure(&payload));
    }

    #[test]
    fn terminal_success_detects_inline_markdown() {
        let payload = json!({ "data": { "result": { "markdown": "# Paper\ntext" } } });
        assert!(is_terminal_success(&payload));
        let extracted = extract_output(&payload, Some("b1".to_string())).unwrap();
        assert!(extracted.markdown.contains("Paper"));
    }

    #[test]
    fn resolve_url_keeps_absolute_urls_verbatim() {
        assert_eq!(resolve_url("https://example.com/api", "https://other.example/x"), "https://other.example/x");
        assert_eq!(resolve_url("https://example.com/api", "/status/1"), "https://example.com/api/status/1");
    }

    #[test]
    fn empty_markdown_after_extraction_is_an_error() {
        let payload = json!({ "state": "done" });
        assert!(extract_output(&payload, None).is_err());
    }

    #[test]
    fn nested_status_keywords_are_recognized_as_terminal() {
        assert!(is_terminal_success(&json!({ "data": { "status": "completed" } })));
        assert!(is_terminal_success(&json!({ "data": { "result": { "task_state": "done" } } })));
        assert!(is_terminal_failure(&json!({ "data": { "batch_state": "aborted" } })));
    }
}
