//! Job-scoped object held by the tool server process for the lifetime of one agent attempt.
//! Every tool handler borrows it, mutates its in-memory fields, persists the touched artifact
//! atomically, then syncs the on-disk job record — so a crash between any two tool calls loses
//! at most the call in flight, never prior state.

use std::collections::BTreeMap;
use std::path::PathBuf;

use review_core::annotation::AnnotationItem;
use review_core::page_index::{ContentListRow, PageIndex};
use review_core::sections::normalize_section_id;
use review_core::{JobId, JobRecord, Settings};
use review_store::{JobStore, append_event, read_json, write_json_atomic, write_text_atomic};
use serde_json::Value;

use crate::paper_search::PaperSearchAdapter;

pub struct ToolRuntime {
    pub job_id: JobId,
    pub job_dir: PathBuf,
    pub store: JobStore,
    pub settings: Settings,

    pub page_index: PageIndex,
    pub paper_search: PaperSearchAdapter,

    pub annotations: Vec<AnnotationItem>,
    pub final_markdown_text: String,
    pub section_drafts: BTreeMap<&'static str, String>,
    pub draft_version: u64,
    pub status_updates: Vec<Value>,
}

impl ToolRuntime {
    pub fn load(job_id: JobId, data_dir: PathBuf, settings: Settings) -> Result<Self, String> {
        let store = JobStore::new(data_dir);
        let job_dir = store.job_dir(job_id);

        let markdown = std::fs::read_to_string(review_store::parsed_markdown_path(&job_dir)).unwrap_or_default();
        let content_list_path = review_store::content_list_path(&job_dir);
        let content_list: Option<Vec<ContentListRow>> = if content_list_path.exists() {
            read_json(&content_list_path).ok()
        } else {
            None
        };
        let page_index = PageIndex::build(&markdown, content_list.as_deref());

        let annotations_path = review_store::annotations_path(&job_dir);
        let annotations: Vec<AnnotationItem> = if annotations_path.exists() {
            read_json::<AnnotationsFile>(&annotations_path)
                .map(|f| f.annotations)
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let final_markdown_path = review_store::final_report_markdown_path(&job_dir);
        let final_markdown_text = std::fs::read_to_string(&final_markdown_path).unwrap_or_default();

        let section_drafts_path = review_store::section_drafts_path(&job_dir);
        let (section_drafts, draft_version) = if section_drafts_path.exists() {
            match read_json::<SectionDraftsFile>(&section_drafts_path) {
                Ok(file) => {
                    let drafts = file
                        .sections
                        .into_iter()
                        .filter_map(|(id, content)| normalize_section_id(&id).map(|canonical| (canonical, content)))
                        .collect();
                    (drafts, file.draft_version)
                }
                Err(_) => (BTreeMap::new(), 0),
            }
        } else {
            (BTreeMap::new(), 0)
        };

        let paper_search = PaperSearchAdapter::from_settings(&settings);

        Ok(ToolRuntime {
            job_id,
            job_dir,
            store,
            settings,
            page_index,
            paper_search,
            annotations,
            final_markdown_text,
            section_drafts,
            draft_version,
            status_updates: Vec::new(),
        })
    }

    pub fn record_event(&self, event: &str, extra: impl IntoIterator<Item = (&'static str, Value)>) {
        let _ = append_event(&self.job_dir, event, extra);
    }

    pub fn persist_annotations(&self) -> Result<(), String> {
        let payload = AnnotationsFile { annotations: self.annotations.clone(), count: self.annotations.len() as u64 };
        write_json_atomic(&review_store::annotations_path(&self.job_dir), &payload)
            .map_err(|e| format!("failed to persist annotations: {e}"))
    }

    pub fn persist_final_markdown(&self) -> Result<(), String> {
        write_text_atomic(&review_store::final_report_markdown_path(&self.job_dir), &self.final_markdown_text)
            .map_err(|e| format!("failed to persist final markdown: {e}"))
    }

    /// Persists the in-progress section drafts so a fresh `review_mcp` process spawned for a
    /// resumed agent attempt picks up where the last attempt left off, instead of starting the
    /// section-mode report over from an empty draft.
    pub fn persist_section_drafts(&self) -> Result<(), String> {
        let payload = SectionDraftsFile {
            sections: self.section_drafts.iter().map(|(id, content)| (id.to_string(), content.clone())).collect(),
            draft_version: self.draft_version,
        };
        write_json_atomic(&review_store::section_drafts_path(&self.job_dir), &payload)
            .map_err(|e| format!("failed to persist section drafts: {e}"))
    }

    /// Recomputes `annotation_count` and the paper-search usage snapshot on the job record and
    /// rewrites it in full, matching the "every tool call syncs the job record" contract.
    pub fn sync_job_record<F>(&self, mutate: F) -> Result<JobRecord, String>
    where
        F: FnOnce(&mut JobRecord),
    {
        let annotation_count = self.annotations.len() as u64;
        self.store
            .mutate(self.job_id, |record| {
                record.annotation_count = annotation_count;
                mutate(record);
            })
            .map_err(|e| format!("failed to sync job record: {e}"))
    }

    pub fn load_job_record(&self) -> Result<JobRecord, String> {
        self.store
            .load(self.job_id)
            .map_err(|e| format!("failed to load job record: {e}"))?
            .ok_or_else(|| "job_not_found".to_string())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
struct AnnotationsFile {
    #[serde(default)]
    annotations: Vec<AnnotationItem>,
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
struct SectionDraftsFile {
    #[serde(default)]
    sections: BTreeMap<String, String>,
    #[serde(default)]
    draft_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_section_drafts_survive_a_fresh_load() {
        let data_dir = std::env::temp_dir().join(format!("review_mcp_runtime_test_{}", JobId::new()));
        let job_id = JobId::new();

        let mut runtime = ToolRuntime::load(job_id, data_dir.clone(), Settings::default()).unwrap();
        assert!(runtime.section_drafts.is_empty());

        runtime.section_drafts.insert("summary", "draft text".to_string());
        runtime.draft_version = 3;
        runtime.persist_section_drafts().unwrap();

        let reloaded = ToolRuntime::load(job_id, data_dir.clone(), Settings::default()).unwrap();
        assert_eq!(reloaded.section_drafts.get("summary"), Some(&"draft text".to_string()));
        assert_eq!(reloaded.draft_version, 3);

        let _ = std::fs::remove_dir_all(&data_dir);
    }
}
