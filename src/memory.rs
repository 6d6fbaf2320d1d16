//! Conversation memory persisted between sessions.
//!
//! Stored in `.lint-cli/memory.json` as `{"messages": [...]}`. The system
//! message is never written; it is rebuilt from the current settings on load.

use crate::conversation::{keep_recent, Message, Role, MAX_HISTORY};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const MEMORY_FILE: &str = "memory.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryFile {
    #[serde(default)]
    messages: Vec<Message>,
}

/// Durable copy of the conversation. The only reader and writer of
/// `memory.json`.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(MEMORY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved messages. A missing or unreadable file is an empty history.
    pub async fn load(&self) -> Vec<Message> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!("Failed to read {}: {}", self.path.display(), err);
                }
                return Vec::new();
            }
        };

        let parsed: MemoryFile = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Ignoring unreadable memory file {}: {}", self.path.display(), err);
                return Vec::new();
            }
        };

        let messages = recent_non_system(parsed.messages);
        debug!("Loaded {} messages from memory", messages.len());
        messages
    }

    /// Replace the stored history with the non-system part of `messages`.
    pub async fn save(&self, messages: &[Message]) -> anyhow::Result<()> {
        let file = MemoryFile {
            messages: recent_non_system(messages.to_vec()),
        };
        let content =
            serde_json::to_string_pretty(&file).context("Failed to serialize memory")?;

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        // Whole-file replace so a crash never leaves a half-written history
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        if let Err(err) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err).with_context(|| format!("Failed to replace {}", self.path.display()));
        }

        debug!("Saved {} messages to memory", file.messages.len());
        Ok(())
    }

    /// Delete the stored history.
    pub async fn clear(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

fn recent_non_system(messages: Vec<Message>) -> Vec<Message> {
    let rest: Vec<Message> = messages
        .into_iter()
        .filter(|m| m.role != Role::System)
        .collect();
    keep_recent(rest, MAX_HISTORY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ToolCall;
    use serde_json::{json, Map};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MEMORY_FILE), "{ not json").unwrap();
        let store = MemoryStore::new(dir.path());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_non_system_messages() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new(&dir.path().join(".lint-cli"));

        let mut parameters = Map::new();
        parameters.insert("path".to_string(), json!("src"));
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "list_files".to_string(),
            parameters,
        };
        let messages = vec![
            Message::system("you are helpful"),
            Message::user("what is in src?"),
            Message::assistant_tool_calls(&[call]),
            Message::tool("call_1", "[\n  \"main.rs\"\n]"),
            Message::assistant("src has main.rs"),
        ];

        store.save(&messages).await.unwrap();
        let loaded = store.load().await;

        assert_eq!(loaded, messages[1..].to_vec());
    }

    #[tokio::test]
    async fn test_save_writes_messages_object_without_system() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store
            .save(&[Message::system("sys"), Message::user("hi")])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["messages"].as_array().unwrap().len(), 1);
        assert_eq!(value["messages"][0]["role"], "user");
        assert!(!dir.path().join("memory.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_caps_history() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        let messages: Vec<Message> = (0..120).map(|i| Message::user(format!("{}", i))).collect();

        store.save(&messages).await.unwrap();
        let loaded = store.load().await;
        assert_eq!(loaded.len(), MAX_HISTORY);
        assert_eq!(loaded[0].content.as_deref(), Some("40"));
    }

    #[tokio::test]
    async fn test_load_skips_tool_results_cut_off_from_their_call() {
        let dir = tempdir().unwrap();
        let mut messages = vec![
            Message::tool("c0", "orphan"),
            Message::tool("c1", "orphan"),
        ];
        messages.extend((0..MAX_HISTORY - 1).map(|i| Message::user(format!("{}", i))));
        let file = serde_json::json!({ "messages": messages });
        std::fs::write(dir.path().join(MEMORY_FILE), file.to_string()).unwrap();

        let loaded = MemoryStore::new(dir.path()).load().await;
        assert_eq!(loaded.len(), MAX_HISTORY - 1);
        assert_eq!(loaded[0], Message::user("0"));
    }

    #[tokio::test]
    async fn test_load_drops_system_messages_written_by_hand() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(MEMORY_FILE),
            r#"{"messages":[{"role":"system","content":"old"},{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        let loaded = MemoryStore::new(dir.path()).load().await;
        assert_eq!(loaded, vec![Message::user("hi")]);
    }

    #[tokio::test]
    async fn test_clear_removes_file_and_tolerates_missing() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.save(&[Message::user("hi")]).await.unwrap();
        assert!(store.path().exists());

        store.clear().await.unwrap();
        assert!(!store.path().exists());
        store.clear().await.unwrap();
    }
}
