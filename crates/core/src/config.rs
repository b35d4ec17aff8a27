//! Process-wide configuration, built once from the environment at startup and passed
//! explicitly into the controller, tool runtime, and adapters. Replaces the source
//! deployment's module-level settings singleton (`get_settings()`); nothing here is read
//! back out of ambient global state once a `Settings` value exists.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub data_dir: PathBuf,

    pub agent_model: String,
    pub agent_temperature: f64,
    pub agent_max_tokens: u64,
    pub agent_max_turns: u64,
    pub agent_resume_attempts: u32,
    pub max_markdown_chars_to_model: u64,

    pub submit_default_wait_seconds: u64,
    pub submit_poll_interval_seconds: f64,
    pub max_pdf_bytes: u64,

    pub mineru_base_url: Option<String>,
    pub mineru_api_token: Option<String>,
    pub mineru_model_version: String,
    pub mineru_upload_endpoint: String,
    pub mineru_poll_endpoint_templates: String,
    pub mineru_poll_interval_seconds: f64,
    pub mineru_poll_timeout_seconds: u64,
    pub mineru_allow_local_fallback: bool,

    pub paper_search_base_url: Option<String>,
    pub paper_search_api_key: Option<String>,
    pub paper_search_endpoint: String,
    pub paper_search_timeout_seconds: u64,

    pub paper_read_base_url: Option<String>,
    pub paper_read_api_key: Option<String>,
    pub paper_read_endpoint: String,
    pub paper_read_timeout_seconds: u64,

    pub enable_final_gates: bool,
    pub min_paper_search_calls_for_pdf_annotate: u64,
    pub min_paper_search_calls_for_final: u64,
    pub min_distinct_paper_queries_for_final: u64,
    pub min_annotations_for_final: u64,
    pub min_english_words_for_final: u64,
    pub min_chinese_chars_for_final: u64,
    pub force_english_output: bool,
    pub ui_language: String,

    pub pdf_font_name: String,
    pub pdf_title_font_size: u32,
    pub pdf_body_font_size: u32,
    pub pdf_page_margin: u32,

    pub log_level: LogLevel,
    pub log_format: LogFormat,

    /// Explicit choice of agent CLI to drive the review: `claude_code` or `codex`. Unset means
    /// auto-detect by probing `PATH` in that order.
    pub agent_executor_kind: Option<String>,
    /// Explicit path to the agent CLI binary. Unset means resolve the default name for
    /// `agent_executor_kind` off `PATH`.
    pub agent_executor_bin: Option<String>,
    /// Path to the tool-server binary the agent CLI spawns over MCP for one job. Defaults to
    /// the bare name `review_mcp`, resolved off `PATH` by the agent CLI itself.
    pub review_mcp_bin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            app_name: "DeepReviewer-2.0 OSS Backend".to_string(),
            data_dir: PathBuf::from("./data"),

            agent_model: "gpt-5.2".to_string(),
            agent_temperature: 0.2,
            agent_max_tokens: 4096,
            agent_max_turns: 1000,
            agent_resume_attempts: 2,
            max_markdown_chars_to_model: 120_000,

            submit_default_wait_seconds: 8,
            submit_poll_interval_seconds: 1.0,
            max_pdf_bytes: 50 * 1024 * 1024,

            mineru_base_url: Some("https://mineru.net/api/v4".to_string()),
            mineru_api_token: None,
            mineru_model_version: "vlm".to_string(),
            mineru_upload_endpoint: "/file-urls/batch".to_string(),
            mineru_poll_endpoint_templates:
                "/extract-results/batch/{batch_id},/extract-results/{batch_id},/extract/task/{batch_id}"
                    .to_string(),
            mineru_poll_interval_seconds: 3.0,
            mineru_poll_timeout_seconds: 900,
            mineru_allow_local_fallback: false,

            paper_search_base_url: None,
            paper_search_api_key: None,
            paper_search_endpoint: "/pasa/search".to_string(),
            paper_search_timeout_seconds: 120,

            paper_read_base_url: None,
            paper_read_api_key: None,
            paper_read_endpoint: "/read".to_string(),
            paper_read_timeout_seconds: 180,

            enable_final_gates: false,
            min_paper_search_calls_for_pdf_annotate: 3,
            min_paper_search_calls_for_final: 3,
            min_distinct_paper_queries_for_final: 3,
            min_annotations_for_final: 10,
            min_english_words_for_final: 0,
            min_chinese_chars_for_final: 0,
            force_english_output: true,
            ui_language: "en".to_string(),

            pdf_font_name: "Helvetica".to_string(),
            pdf_title_font_size: 15,
            pdf_body_font_size: 10,
            pdf_page_margin: 48,

            log_level: LogLevel::Info,
            log_format: LogFormat::Pretty,

            agent_executor_kind: None,
            agent_executor_bin: None,
            review_mcp_bin: "review_mcp".to_string(),
        }
    }
}

impl Settings {
    /// Overlays recognized environment variables onto the defaults. Unset variables keep the
    /// default; empty-after-trim variables are treated as unset.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();
        let get = |name: &str| env_var(name);

        if let Some(v) = get("APP_NAME") {
            settings.app_name = v;
        }
        if let Some(v) = get("DATA_DIR") {
            settings.data_dir = PathBuf::from(v);
        }

        if let Some(v) = get("AGENT_MODEL") {
            settings.agent_model = v;
        }
        if let Some(v) = get("AGENT_TEMPERATURE").and_then(|s| s.parse().ok()) {
            settings.agent_temperature = v;
        }
        if let Some(v) = get("AGENT_MAX_TOKENS").and_then(|s| s.parse().ok()) {
            settings.agent_max_tokens = v;
        }
        if let Some(v) = get("AGENT_MAX_TURNS").and_then(|s| s.parse().ok()) {
            settings.agent_max_turns = v;
        }
        if let Some(v) = get("AGENT_RESUME_ATTEMPTS").and_then(|s| s.parse::<u32>().ok()) {
            settings.agent_resume_attempts = v.min(2);
        }
        if let Some(v) = get("MAX_MARKDOWN_CHARS_TO_MODEL").and_then(|s| s.parse().ok()) {
            settings.max_markdown_chars_to_model = v;
        }

        if let Some(v) = get("SUBMIT_DEFAULT_WAIT_SECONDS").and_then(|s| s.parse().ok()) {
            settings.submit_default_wait_seconds = v;
        }
        if let Some(v) = get("SUBMIT_POLL_INTERVAL_SECONDS").and_then(|s| s.parse().ok()) {
            settings.submit_poll_interval_seconds = v;
        }
        if let Some(v) = get("MAX_PDF_BYTES").and_then(|s| s.parse().ok()) {
            settings.max_pdf_bytes = v;
        }

        if let Some(v) = get("MINERU_BASE_URL") {
            settings.mineru_base_url = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = get("MINERU_API_TOKEN") {
            settings.mineru_api_token = Some(v);
        }
        if let Some(v) = get("MINERU_MODEL_VERSION") {
            settings.mineru_model_version = v;
        }
        if let Some(v) = get("MINERU_UPLOAD_ENDPOINT") {
            settings.mineru_upload_endpoint = v;
        }
        if let Some(v) = get("MINERU_POLL_ENDPOINT_TEMPLATES") {
            settings.mineru_poll_endpoint_templates = v;
        }
        if let Some(v) = get("MINERU_POLL_INTERVAL_SECONDS").and_then(|s| s.parse().ok()) {
            settings.mineru_poll_interval_seconds = v;
        }
        if let Some(v) = get("MINERU_POLL_TIMEOUT_SECONDS").and_then(|s| s.parse().ok()) {
            settings.mineru_poll_timeout_seconds = v;
        }
        if let Some(v) = get("MINERU_ALLOW_LOCAL_FALLBACK").and_then(|s| parse_bool(&s)) {
            settings.mineru_allow_local_fallback = v;
        }

        if let Some(v) = get("PAPER_SEARCH_BASE_URL") {
            settings.paper_search_base_url = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = get("PAPER_SEARCH_API_KEY") {
            settings.paper_search_api_key = Some(v);
        }
        if let Some(v) = get("PAPER_SEARCH_ENDPOINT") {
            settings.paper_search_endpoint = v;
        }
        if let Some(v) = get("PAPER_SEARCH_TIMEOUT_SECONDS").and_then(|s| s.parse().ok()) {
            settings.paper_search_timeout_seconds = v;
        }

        if let Some(v) = get("PAPER_READ_BASE_URL") {
            settings.paper_read_base_url = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = get("PAPER_READ_API_KEY") {
            settings.paper_read_api_key = Some(v);
        }
        if let Some(v) = get("PAPER_READ_ENDPOINT") {
            settings.paper_read_endpoint = v;
        }
        if let Some(v) = get("PAPER_READ_TIMEOUT_SECONDS").and_then(|s| s.parse().ok()) {
            settings.paper_read_timeout_seconds = v;
        }

        if let Some(v) = get("ENABLE_FINAL_GATES").and_then(|s| parse_bool(&s)) {
            settings.enable_final_gates = v;
        }
        if let Some(v) = get("MIN_PAPER_SEARCH_CALLS_FOR_PDF_ANNOTATE").and_then(|s| s.parse().ok()) {
            settings.min_paper_search_calls_for_pdf_annotate = v;
        }
        if let Some(v) = get("MIN_PAPER_SEARCH_CALLS_FOR_FINAL").and_then(|s| s.parse().ok()) {
            settings.min_paper_search_calls_for_final = v;
        }
        if let Some(v) = get("MIN_DISTINCT_PAPER_QUERIES_FOR_FINAL").and_then(|s| s.parse().ok()) {
            settings.min_distinct_paper_queries_for_final = v;
        }
        if let Some(v) = get("MIN_ANNOTATIONS_FOR_FINAL").and_then(|s| s.parse().ok()) {
            settings.min_annotations_for_final = v;
        }
        if let Some(v) = get("MIN_ENGLISH_WORDS_FOR_FINAL").and_then(|s| s.parse().ok()) {
            settings.min_english_words_for_final = v;
        }
        if let Some(v) = get("MIN_CHINESE_CHARS_FOR_FINAL").and_then(|s| s.parse().ok()) {
            settings.min_chinese_chars_for_final = v;
        }
        if let Some(v) = get("FORCE_ENGLISH_OUTPUT").and_then(|s| parse_bool(&s)) {
            settings.force_english_output = v;
        }
        if let Some(v) = get("UI_LANGUAGE") {
            settings.ui_language = v;
        }

        if let Some(v) = get("PDF_FONT_NAME") {
            settings.pdf_font_name = v;
        }
        if let Some(v) = get("PDF_TITLE_FONT_SIZE").and_then(|s| s.parse().ok()) {
            settings.pdf_title_font_size = v;
        }
        if let Some(v) = get("PDF_BODY_FONT_SIZE").and_then(|s| s.parse().ok()) {
            settings.pdf_body_font_size = v;
        }
        if let Some(v) = get("PDF_PAGE_MARGIN").and_then(|s| s.parse().ok()) {
            settings.pdf_page_margin = v;
        }

        if let Some(v) = get("LOG_LEVEL").and_then(|s| parse_log_level(&s)) {
            settings.log_level = v;
        }
        if let Some(v) = get("LOG_FORMAT").and_then(|s| parse_log_format(&s)) {
            settings.log_format = v;
        }

        if let Some(v) = get("AGENT_EXECUTOR_KIND") {
            settings.agent_executor_kind = Some(v);
        }
        if let Some(v) = get("AGENT_EXECUTOR_BIN") {
            settings.agent_executor_bin = Some(v);
        }
        if let Some(v) = get("REVIEW_MCP_BIN") {
            settings.review_mcp_bin = v;
        }

        settings
    }

    /// Splits the comma-separated poll-template env var into a trimmed, non-empty list.
    /// Mirrors the source deployment's `mineru_poll_templates()` derived-value helper.
    pub fn mineru_poll_templates(&self) -> Vec<String> {
        self.mineru_poll_endpoint_templates
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_log_level(raw: &str) -> Option<LogLevel> {
    match raw.to_lowercase().as_str() {
        "error" => Some(LogLevel::Error),
        "warn" | "warning" => Some(LogLevel::Warn),
        "info" => Some(LogLevel::Info),
        "debug" => Some(LogLevel::Debug),
        _ => None,
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.to_lowercase().as_str() {
        "pretty" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_the_source_deployment() {
        let settings = Settings::default();
        assert_eq!(settings.min_paper_search_calls_for_pdf_annotate, 3);
        assert_eq!(settings.min_annotations_for_final, 10);
        assert!(settings.force_english_output);
    }

    #[test]
    fn poll_templates_split_and_trim() {
        let settings = Settings::default();
        let templates = settings.mineru_poll_templates();
        assert_eq!(templates.len(), 3);
        assert_eq!(templates[0], "/extract-results/batch/{batch_id}");
    }

    #[test]
    fn resume_attempts_are_clamped_at_two() {
        // Simulated directly rather than through process env to keep the test hermetic.
        let mut settings = Settings::default();
        settings.agent_resume_attempts = 9u32.min(2);
        assert_eq!(settings.agent_resume_attempts, 2);
    }
}
