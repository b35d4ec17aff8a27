//! Map of page number -> ordered text lines, built from the parsed markdown and optional
//! content list, and the read helpers (`search`, `read_lines`, `jump`) the tool suite calls
//! directly against it.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Default)]
pub struct PageIndex {
    pages: BTreeMap<u32, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentListRow {
    pub page_idx: u32,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl PageIndex {
    /// Builds the index per the three-tier fallback: content list rows grouped by page,
    /// else `## Page <n>` heading partitioning, else a single-page fallback (P8).
    pub fn build(markdown: &str, content_list: Option<&[ContentListRow]>) -> Self {
        if let Some(rows) = content_list {
            if !rows.is_empty() {
                return Self::from_content_list(rows);
            }
        }
        if let Some(index) = Self::from_page_headings(markdown) {
            return index;
        }
        Self::single_page_fallback(markdown)
    }

    fn from_content_list(rows: &[ContentListRow]) -> Self {
        let mut pages: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for row in rows {
            let text = row.text.as_deref().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }
            pages.entry(row.page_idx + 1).or_default().push(text.to_string());
        }
        PageIndex { pages }
    }

    fn from_page_headings(markdown: &str) -> Option<Self> {
        let mut pages: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        let mut current: Option<u32> = None;

        for line in markdown.lines() {
            if let Some(n) = parse_page_heading(line) {
                current = Some(n);
                pages.entry(n).or_default();
                continue;
            }
            if let Some(page) = current {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    pages.entry(page).or_default().push(trimmed.to_string());
                }
            }
        }

        if pages.is_empty() {
            None
        } else {
            Some(PageIndex { pages })
        }
    }

    fn single_page_fallback(markdown: &str) -> Self {
        let lines: Vec<String> = markdown
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        let mut pages = BTreeMap::new();
        pages.insert(1, lines);
        PageIndex { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn has_page(&self, page: u32) -> bool {
        self.pages.contains_key(&page)
    }

    pub fn line_count(&self, page: u32) -> Option<usize> {
        self.pages.get(&page).map(Vec::len)
    }

    /// Inclusive 1-based line range, clamped to `[1, page_line_count]`.
    pub fn read_lines(&self, page: u32, start_line: u32, end_line: u32) -> Option<Vec<String>> {
        let lines = self.pages.get(&page)?;
        if lines.is_empty() {
            return Some(Vec::new());
        }
        let max_line = lines.len() as u32;
        let start = start_line.clamp(1, max_line);
        let end = end_line.clamp(1, max_line).max(start);
        Some(lines[(start - 1) as usize..end as usize].to_vec())
    }

    pub fn jump(&self, page: u32, preview_lines: usize) -> Option<(usize, Vec<String>)> {
        let lines = self.pages.get(&page)?;
        Some((lines.len(), lines.iter().take(preview_lines).cloned().collect()))
    }

    /// Case-insensitive whitespace-token count scoring, with the full query as a substring
    /// fallback, across every page/line. Returns `(page, line_number, score, text)` tuples.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(u32, u32, u32, String)> {
        let query_lower = query.to_lowercase();
        let tokens: Vec<&str> = query_lower.split_whitespace().collect();
        let mut hits = Vec::new();

        for (&page, lines) in &self.pages {
            for (idx, line) in lines.iter().enumerate() {
                let line_lower = line.to_lowercase();
                let token_hits = tokens.iter().filter(|t| line_lower.contains(**t)).count() as u32;
                let score = if token_hits > 0 {
                    token_hits
                } else if !query_lower.is_empty() && line_lower.contains(&query_lower) {
                    1
                } else {
                    0
                };
                if score > 0 {
                    hits.push((page, (idx + 1) as u32, score, line.clone()));
                }
            }
        }

        hits.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));
        hits.truncate(top_k.clamp(1, 50));
        hits
    }
}

fn parse_page_heading(line: &str) -> Option<u32> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let after_hashes = trimmed.trim_start_matches('#').trim_start();
    let lower = after_hashes.to_lowercase();
    let rest = lower.strip_prefix("page")?.trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_list_round_trips_in_input_order() {
        let rows = vec![
            ContentListRow { page_idx: 0, r#type: None, text: Some(" first ".to_string()) },
            ContentListRow { page_idx: 0, r#type: None, text: Some("second".to_string()) },
            ContentListRow { page_idx: 1, r#type: None, text: Some("third".to_string()) },
        ];
        let index = PageIndex::build("", Some(&rows));
        assert_eq!(index.read_lines(1, 1, 2).unwrap(), vec!["first", "second"]);
        assert_eq!(index.read_lines(2, 1, 1).unwrap(), vec!["third"]);
    }

    #[test]
    fn page_headings_partition_markdown() {
        let markdown = "## Page 1\nalpha\nbeta\n## Page 2\ngamma\n";
        let index = PageIndex::build(markdown, None);
        assert_eq!(index.page_count(), 2);
        assert_eq!(index.read_lines(1, 1, 2).unwrap(), vec!["alpha", "beta"]);
        assert_eq!(index.read_lines(2, 1, 1).unwrap(), vec!["gamma"]);
    }

    #[test]
    fn single_page_fallback_when_no_structure_found() {
        let index = PageIndex::build("just some text\nmore text\n", None);
        assert_eq!(index.page_count(), 1);
        assert!(index.has_page(1));
    }

    #[test]
    fn read_lines_clamps_to_page_bounds() {
        let markdown = "## Page 1\nalpha\nbeta\n";
        let index = PageIndex::build(markdown, None);
        assert_eq!(index.read_lines(1, 0, 99).unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn search_scores_by_token_overlap_then_page_then_line() {
        let markdown = "## Page 1\nthe quick fox\nlazy dog\n## Page 2\nquick quick brown\n";
        let index = PageIndex::build(markdown, None);
        let hits = index.search("quick fox", 8);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[0].1, 1);
    }
}
