//! Remote paper-search/read client with an arXiv Atom-feed fallback when no remote is
//! configured. Mirrors the source deployment's adapter one-for-one: same endpoint shapes, same
//! stopword-filtered query construction, same dedup-by-arxiv-id across questions.

use std::collections::BTreeSet;
use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::Event;
use review_core::Settings;
use serde_json::{Map, Value, json};

const ARXIV_QUERY_URL: &str = "https://export.arxiv.org/api/query";

pub struct PaperSearchAdapter {
    search_base_url: Option<String>,
    search_api_key: Option<String>,
    search_endpoint: String,
    search_timeout: Duration,

    read_base_url: Option<String>,
    read_api_key: Option<String>,
    read_endpoint: String,
    read_timeout: Duration,
}

impl PaperSearchAdapter {
    pub fn from_settings(settings: &Settings) -> Self {
        PaperSearchAdapter {
            search_base_url: settings.paper_search_base_url.clone(),
            search_api_key: settings.paper_search_api_key.clone(),
            search_endpoint: settings.paper_search_endpoint.clone(),
            search_timeout: Duration::from_secs(settings.paper_search_timeout_seconds.max(20)),

            read_base_url: settings.paper_read_base_url.clone(),
            read_api_key: settings.paper_read_api_key.clone(),
            read_endpoint: settings.paper_read_endpoint.clone(),
            read_timeout: Duration::from_secs(settings.paper_read_timeout_seconds.max(20)),
        }
    }

    pub fn search_configured(&self) -> bool {
        self.search_base_url.is_some()
    }

    pub fn read_configured(&self) -> bool {
        self.read_base_url.is_some()
    }

    pub fn search(&self, query: Option<&str>, question_list: &[String]) -> Result<Value, String> {
        if self.search_configured() {
            self.search_remote(query, question_list)
        } else {
            self.search_arxiv_fallback(query, question_list)
        }
    }

    pub fn read_papers(&self, items: &[Value]) -> Result<Value, String> {
        if self.read_configured() {
            self.read_remote(items)
        } else {
            self.read_arxiv_fallback(items)
        }
    }

    fn search_remote(&self, query: Option<&str>, question_list: &[String]) -> Result<Value, String> {
        let base = self.search_base_url.as_deref().unwrap_or_default();
        let url = join_url(base, &self.search_endpoint);

        let mut request = ureq::post(&url).timeout(self.search_timeout);
        if let Some(key) = self.search_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let payload = json!({ "query": query, "question_list": question_list });
        let response = request
            .send_json(payload)
            .map_err(|e| format!("paper search request failed: {e}"))?;
        let data: Value = response
            .into_json()
            .map_err(|e| format!("paper search response was not json: {e}"))?;

        match &data {
            Value::Object(_) => Ok(data),
            Value::Array(items) => {
                let papers: Vec<Value> = items
                    .iter()
                    .filter_map(|item| item.as_object())
                    .map(normalize_remote_paper_item)
                    .collect();
                let query_text = query.unwrap_or("").trim().to_string();
                let mut questions: Vec<String> =
                    question_list.iter().filter(|q| !q.trim().is_empty()).cloned().collect();
                if !query_text.is_empty() && !questions.contains(&query_text) {
                    questions.insert(0, query_text.clone());
                }
                let bucket_questions: Vec<String> = if questions.is_empty() {
                    if query_text.is_empty() { Vec::new() } else { vec![query_text.clone()] }
                } else {
                    questions.clone()
                };
                let question_results: Vec<Value> = bucket_questions
                    .iter()
                    .map(|q| {
                        json!({
                            "question": q,
                            "success": !papers.is_empty(),
                            "count": papers.len(),
                            "papers": papers,
                        })
                    })
                    .collect();
                Ok(json!({
                    "success": true,
                    "provider": "remote_list_adapted",
                    "query": query_text,
                    "questions": questions,
                    "papers": papers,
                    "count": papers.len(),
                    "question_results": question_results,
                }))
            }
            _ => Ok(json!({
                "success": false,
                "error": "invalid_remote_payload",
                "papers": [],
                "count": 0,
            })),
        }
    }

    fn read_remote(&self, items: &[Value]) -> Result<Value, String> {
        let base = self.read_base_url.as_deref().unwrap_or_default();
        let url = join_url(base, &self.read_endpoint);

        let mut request = ureq::post(&url).timeout(self.read_timeout);
        if let Some(key) = self.read_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let response = request
            .send_json(json!({ "items": items }))
            .map_err(|e| format!("paper read request failed: {e}"))?;
        let data: Value = response
            .into_json()
            .map_err(|e| format!("paper read response was not json: {e}"))?;

        if data.is_object() {
            Ok(data)
        } else {
            Ok(json!({ "success": false, "error": "invalid_remote_payload", "items": [] }))
        }
    }

    fn search_arxiv_fallback(&self, query: Option<&str>, question_list: &[String]) -> Result<Value, String> {
        let mut questions: Vec<String> =
            question_list.iter().filter(|q| !q.trim().is_empty()).cloned().collect();
        if questions.is_empty() {
            if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
                questions.push(q.to_string());
            }
        }
        if questions.is_empty() {
            return Ok(json!({
                "success": false,
                "error": "empty_query",
                "papers": [],
                "count": 0,
                "question_results": [],
                "provider": "arxiv_fallback",
            }));
        }

        let mut all_papers = Vec::new();
        let mut seen = BTreeSet::new();
        let mut question_results = Vec::new();

        for q in &questions {
            let papers = self.arxiv_query(q, 8)?;
            question_results.push(json!({
                "question": q,
                "success": !papers.is_empty(),
                "count": papers.len(),
                "papers": papers,
            }));
            for paper in papers {
                let key = paper
                    .get("arxiv_id")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .or_else(|| paper.get("url").and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_string();
                if !key.is_empty() {
                    if seen.contains(&key) {
                        continue;
                    }
                    seen.insert(key);
                }
                all_papers.push(paper);
            }
        }

        Ok(json!({
            "success": true,
            "query": questions[0],
            "questions": questions,
            "papers": all_papers,
            "count": all_papers.len(),
            "question_results": question_results,
            "provider": "arxiv_fallback",
        }))
    }

    fn read_arxiv_fallback(&self, items: &[Value]) -> Result<Value, String> {
        let normalized: Vec<&Value> = items.iter().filter(|item| item.is_object()).collect();
        if normalized.is_empty() {
            return Ok(json!({
                "success": false,
                "error": "empty_items",
                "items": [],
                "provider": "arxiv_fallback",
            }));
        }

        let mut outputs = Vec::new();
        for item in normalized.iter().take(8) {
            let mut arxiv_id = item
                .get("id")
                .or_else(|| item.get("arxiv_id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            let question = item.get("question").and_then(Value::as_str).unwrap_or_default().trim().to_string();
            let title_hint = item.get("title").and_then(Value::as_str).unwrap_or_default().trim().to_string();

            if arxiv_id.is_empty() && !title_hint.is_empty() {
                let guessed = self.arxiv_query(&title_hint, 1)?;
                if let Some(first) = guessed.first() {
                    arxiv_id = first.get("arxiv_id").and_then(Value::as_str).unwrap_or_default().trim().to_string();
                }
            }

            if arxiv_id.is_empty() {
                outputs.push(json!({
                    "id": "",
                    "question": question,
                    "success": false,
                    "error": "missing_arxiv_id",
                }));
                continue;
            }

            let detail = self.arxiv_fetch_single(&arxiv_id)?;
            let Some(detail) = detail else {
                outputs.push(json!({
                    "id": arxiv_id,
                    "question": question,
                    "success": false,
                    "error": "paper_not_found",
                }));
                continue;
            };

            let answer = build_read_answer(&detail, &question);
            outputs.push(json!({
                "id": arxiv_id,
                "question": question,
                "success": true,
                "paper": detail,
                "answer": answer,
            }));
        }

        Ok(json!({
            "success": true,
            "items": outputs,
            "count": outputs.len(),
            "provider": "arxiv_fallback",
        }))
    }

    fn arxiv_query(&self, question: &str, max_results: u32) -> Result<Vec<Value>, String> {
        let tokens = question_to_arxiv_query(question);
        let encoded = urlencoding_plus(&tokens);
        let capped = max_results.clamp(1, 16);
        let url = format!("{ARXIV_QUERY_URL}?search_query=all:{encoded}&start=0&max_results={capped}");
        self.fetch_and_parse_feed(&url)
    }

    fn arxiv_fetch_single(&self, arxiv_id: &str) -> Result<Option<Value>, String> {
        let clean = arxiv_id.trim();
        if clean.is_empty() {
            return Ok(None);
        }
        let encoded = urlencoding_plus(&format!("id:{clean}"));
        let url = format!("{ARXIV_QUERY_URL}?search_query={encoded}&start=0&max_results=1");
        let papers = self.fetch_and_parse_feed(&url)?;
        Ok(papers.into_iter().next())
    }

    fn fetch_and_parse_feed(&self, url: &str) -> Result<Vec<Value>, String> {
        let response = ureq::get(url)
            .timeout(Duration::from_secs(45))
            .call()
            .map_err(|e| format!("arxiv request failed: {e}"))?;
        let text = response.into_string().map_err(|e| format!("arxiv response read failed: {e}"))?;
        parse_arxiv_feed(&text)
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

fn normalize_remote_paper_item(item: &Map<String, Value>) -> Value {
    let title = str_field(item, "title");
    let snippet = {
        let s = str_field(item, "snippet");
        if s.is_empty() { str_field(item, "abstract") } else { s }
    };
    let link = {
        let l = str_field(item, "link");
        if l.is_empty() { str_field(item, "url") } else { l }
    };
    let raw_id = {
        let i = str_field(item, "id");
        if i.is_empty() { str_field(item, "arxiv_id") } else { i }
    };

    let mut arxiv_id = raw_id;
    if arxiv_id.is_empty() && !link.is_empty() && !link.contains("http") {
        arxiv_id = link.clone();
    }
    if let Some(rest) = arxiv_id.strip_prefix("arXiv:") {
        arxiv_id = rest.trim().to_string();
    }

    let (abs_url, pdf_url) = if !arxiv_id.is_empty() {
        (format!("https://arxiv.org/abs/{arxiv_id}"), format!("https://arxiv.org/pdf/{arxiv_id}.pdf"))
    } else if link.starts_with("http://") || link.starts_with("https://") {
        (link.clone(), String::new())
    } else {
        (String::new(), String::new())
    };

    let resolved_url = if !abs_url.is_empty() { abs_url.clone() } else { link.clone() };
    let id = if !arxiv_id.is_empty() { arxiv_id.clone() } else { link.clone() };

    json!({
        "id": id,
        "arxiv_id": arxiv_id,
        "title": title,
        "abstract": snippet,
        "url": resolved_url,
        "abs_url": resolved_url,
        "pdf_url": pdf_url,
        "source": "remote",
    })
}

fn str_field(item: &Map<String, Value>, key: &str) -> String {
    item.get(key).and_then(Value::as_str).unwrap_or_default().trim().to_string()
}

fn build_read_answer(detail: &Value, question: &str) -> String {
    let title = detail.get("title").and_then(Value::as_str).unwrap_or_default().trim().to_string();
    let mut abstract_text = detail.get("abstract").and_then(Value::as_str).unwrap_or_default().trim().to_string();
    if abstract_text.is_empty() {
        abstract_text = "No abstract available.".to_string();
    }

    if question.is_empty() {
        return format!("Title: {title}\n\nAbstract:\n{abstract_text}");
    }
    format!(
        "Question: {question}\n\nFrom paper '{title}', available evidence (abstract-level) is:\n{abstract_text}\n\nNote: This fallback reader uses arXiv metadata/abstract, not full-text deep parsing."
    )
}

/// Lowercases, strips non `[a-z0-9 -]` characters, drops a fixed stopword list, and keeps at
/// most the first 10 remaining tokens, joined by spaces.
fn question_to_arxiv_query(question: &str) -> String {
    const STOPWORDS: &[&str] = &[
        "what", "which", "how", "are", "is", "the", "for", "of", "to", "in", "and", "on", "with",
        "recent", "papers", "methods", "paper", "about", "does", "can", "be", "used", "that",
    ];

    let lowered = question.trim().to_lowercase();
    let collapsed: String = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    let filtered: String = collapsed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == ' ' || c == '-' { c } else { ' ' })
        .collect();

    let tokens: Vec<&str> = filtered.split(' ').filter(|t| !t.is_empty()).collect();
    let kept: Vec<&str> = tokens.into_iter().filter(|t| !STOPWORDS.contains(t)).collect();

    if kept.is_empty() {
        filtered
    } else {
        kept.into_iter().take(10).collect::<Vec<_>>().join(" ")
    }
}

fn urlencoding_plus(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn parse_arxiv_feed(xml_text: &str) -> Result<Vec<Value>, String> {
    let mut reader = Reader::from_str(xml_text);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut buf = Vec::new();

    let mut in_entry = false;
    let mut current_tag: Vec<u8> = Vec::new();

    let mut entry_id = String::new();
    let mut title = String::new();
    let mut summary = String::new();
    let mut published = String::new();
    let mut updated = String::new();
    let mut authors: Vec<String> = Vec::new();
    let mut in_author = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| format!("arxiv feed parse failed: {e}"))? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"entry" {
                    in_entry = true;
                    entry_id.clear();
                    title.clear();
                    summary.clear();
                    published.clear();
                    updated.clear();
                    authors.clear();
                } else if name == b"author" {
                    in_author = true;
                }
                current_tag = name;
            }
            Event::Text(e) => {
                if !in_entry {
                    continue;
                }
                let text = e.unescape().unwrap_or_default().trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match current_tag.as_slice() {
                    b"id" if !in_author => entry_id = text,
                    b"title" if !in_author => title = text,
                    b"summary" => summary = text,
                    b"published" => published = text,
                    b"updated" => updated = text,
                    b"name" if in_author => authors.push(text),
                    _ => {}
                }
            }
            Event::End(e) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"author" {
                    in_author = false;
                } else if name == b"entry" {
                    in_entry = false;
                    let arxiv_id = entry_id.rsplit('/').next().unwrap_or_default().to_string();
                    let (abs_url, pdf_url) = if !arxiv_id.is_empty() {
                        (format!("https://arxiv.org/abs/{arxiv_id}"), format!("https://arxiv.org/pdf/{arxiv_id}.pdf"))
                    } else {
                        (String::new(), String::new())
                    };
                    papers.push(json!({
                        "title": title,
                        "abstract": summary,
                        "authors": authors.clone(),
                        "published": published,
                        "updated": updated,
                        "arxiv_id": arxiv_id,
                        "url": abs_url,
                        "abs_url": abs_url,
                        "pdf_url": pdf_url,
                        "source": "arxiv",
                    }));
                }
                current_tag.clear();
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(papers)
}

/// Accepts a JSON array, a JSON-array-encoded string, or freeform newline/bullet text; strips
/// bullet markers, collapses whitespace, deduplicates case-insensitively preserving first-seen
/// order, and truncates to at most 3 entries. Shared by the `paper_search` tool handler.
pub fn normalize_question_list(raw: &Value) -> Vec<String> {
    let mut raw_items: Vec<String> = Vec::new();

    match raw {
        Value::Array(items) => {
            for item in items {
                let text = value_to_text(item);
                if !text.trim().is_empty() {
                    raw_items.push(text);
                }
            }
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
                    for item in items {
                        let text = value_to_text(&item);
                        if !text.trim().is_empty() {
                            raw_items.push(text);
                        }
                    }
                } else {
                    for line in trimmed.lines() {
                        let cleaned = line.trim_matches(|c: char| c == '-' || c == '\u{2022}' || c == '\t' || c == ' ');
                        if !cleaned.is_empty() {
                            raw_items.push(cleaned.to_string());
                        }
                    }
                }
            }
        }
        _ => {}
    }

    let mut cleaned = Vec::new();
    let mut seen = BTreeSet::new();
    for item in raw_items {
        let normalized: String = item.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            continue;
        }
        let key = normalized.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.insert(key);
        cleaned.push(normalized);
        if cleaned.len() == 3 {
            break;
        }
    }
    cleaned
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_question_list_dedupes_and_truncates() {
        let raw = json!(["What is X?", "what is x?", "How does Y work?", "Z?", "W?"]);
        let list = normalize_question_list(&raw);
        assert_eq!(list, vec!["What is X?", "How does Y work?", "Z?"]);
    }

    #[test]
    fn normalize_question_list_parses_bullet_text() {
        let raw = json!("- first question\n\u{2022} second question\n");
        let list = normalize_question_list(&raw);
        assert_eq!(list, vec!["first question", "second question"]);
    }

    #[test]
    fn question_to_arxiv_query_drops_stopwords() {
        assert_eq!(
            question_to_arxiv_query("What are the recent methods for diffusion models?"),
            "diffusion models"
        );
    }

    #[test]
    fn parse_arxiv_feed_extracts_entries() {
        let xml = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/1234.5678v1</id>
    <title>A Paper</title>
    <summary>An abstract.</summary>
    <published>2020-01-01T00:00:00Z</published>
    <updated>2020-01-02T00:00:00Z</updated>
    <author><name>Jane Doe</name></author>
  </entry>
</feed>"#;
        let papers = parse_arxiv_feed(xml).unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0]["arxiv_id"], "1234.5678v1");
        assert_eq!(papers[0]["authors"][0], "Jane Doe");
    }

    #[test]
    fn normalize_remote_paper_item_derives_arxiv_id_from_bare_link() {
        let mut map = Map::new();
        map.insert("title".to_string(), json!("Title"));
        map.insert("link".to_string(), json!("2401.00001"));
        let normalized = normalize_remote_paper_item(&map);
        assert_eq!(normalized["arxiv_id"], "2401.00001");
        assert_eq!(normalized["abs_url"], "https://arxiv.org/abs/2401.00001");
    }
}
