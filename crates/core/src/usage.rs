use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Replace with the latest cumulative counters reported by the agent framework.
    /// Token usage is reported as running totals, not deltas, so this is an overwrite.
    pub fn absorb_cumulative(&mut self, requests: u64, input_tokens: u64, output_tokens: u64) {
        self.requests = requests;
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.total_tokens = input_tokens + output_tokens;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub total_calls: u64,
    pub distinct_tools: u64,
    pub per_tool: BTreeMap<String, u64>,
}

impl ToolUsage {
    pub fn record_call(&mut self, tool_name: &str) {
        self.total_calls += 1;
        *self.per_tool.entry(tool_name.to_string()).or_insert(0) += 1;
        self.distinct_tools = self.per_tool.len() as u64;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperSearchUsage {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub effective_calls: u64,
    pub papers_found: u64,
    pub distinct_queries: u64,
    #[serde(rename = "query_signatures", default)]
    signatures: BTreeSet<String>,
}

impl PaperSearchUsage {
    /// Normalize a query signature the same way across every insertion site: lowercase,
    /// whitespace-collapsed. Used for deduplicated distinct-query counting (P6).
    pub fn normalize_signature(raw: &str) -> String {
        raw.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn record_signature(&mut self, raw: &str) {
        let normalized = Self::normalize_signature(raw);
        if normalized.is_empty() {
            return;
        }
        self.signatures.insert(normalized);
        self.distinct_queries = self.signatures.len() as u64;
    }

    pub fn record_call(&mut self, success: bool, paper_count: u64) {
        self.total_calls += 1;
        if success {
            self.successful_calls += 1;
            if paper_count > 0 {
                self.effective_calls += 1;
                self.papers_found += paper_count;
            }
        }
    }

    /// Restores `signatures` from the persisted snapshot on load; `distinct_queries` is
    /// recomputed rather than trusted so a hand-edited `job.json` can't desync it.
    pub fn restore_signatures(&mut self, signatures: BTreeSet<String>) {
        self.signatures = signatures;
        self.distinct_queries = self.signatures.len() as u64;
    }

    pub fn signatures(&self) -> &BTreeSet<String> {
        &self.signatures
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub token: TokenUsage,
    pub tool: ToolUsage,
    pub paper_search: PaperSearchUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_queries_matches_signature_cardinality() {
        let mut usage = PaperSearchUsage::default();
        usage.record_signature("Transformer  Attention");
        usage.record_signature("transformer attention");
        usage.record_signature("diffusion models");
        assert_eq!(usage.distinct_queries, 2);
    }

    #[test]
    fn effective_call_requires_success_and_papers() {
        let mut usage = PaperSearchUsage::default();
        usage.record_call(true, 0);
        usage.record_call(true, 3);
        usage.record_call(false, 5);
        assert_eq!(usage.total_calls, 3);
        assert_eq!(usage.successful_calls, 2);
        assert_eq!(usage.effective_calls, 1);
        assert_eq!(usage.papers_found, 3);
    }
}
