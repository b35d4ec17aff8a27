//! Atomic persistence discipline shared by every artifact write: write to a sibling temp
//! file, then rename over the target. The temp file is unlinked on any failure path so a
//! crash between write and rename never leaves debris, and a reader never observes a
//! partially written file (P7).

use std::path::Path;

use crate::error::StoreError;

pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = sibling_tmp_path(path);
    let result = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result.map_err(StoreError::from)
}

pub fn write_text_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    write_bytes_atomic(path, content.as_bytes())
}

pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(value)?;
    write_text_atomic(path, &text)
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn sibling_tmp_path(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!("{file_name}.tmp.{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = std::env::temp_dir().join(format!("review_store_atomic_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("job.json");

        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Payload {
            value: u32,
        }

        write_json_atomic(&path, &Payload { value: 7 }).unwrap();
        let loaded: Payload = read_json(&path).unwrap();
        assert_eq!(loaded, Payload { value: 7 });

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_leftover_tmp_file_after_success() {
        let dir = std::env::temp_dir().join(format!("review_store_atomic_test_tmp_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("note.txt");
        write_text_atomic(&path, "hello").unwrap();
        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
