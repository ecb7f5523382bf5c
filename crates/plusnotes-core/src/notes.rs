//! Notes store

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Note {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            modified_at: now,
            is_favorite: false,
            category: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.content.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
            || self.category.to_lowercase().contains(needle)
    }
}

pub trait NoteStore {
    fn load(&self) -> Vec<Note>;
    fn save(&self, notes: &[Note]) -> Result<()>;
}

/// Notes kept as a pretty-printed JSON array
pub struct JsonNoteStore {
    path: PathBuf,
}

impl JsonNoteStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NoteStore for JsonNoteStore {
    /// Missing or unreadable files load as an empty list
    fn load(&self) -> Vec<Note> {
        if !self.path.exists() {
            return Vec::new();
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(notes) => notes,
            Err(e) => {
                warn!("Failed to load notes from {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn save(&self, notes: &[Note]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(notes).map_err(std::io::Error::other)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Case-insensitive search over title, content, tags and category.
///
/// A blank term returns every note.
pub fn search_notes<'a>(notes: &'a [Note], term: &str) -> Vec<&'a Note> {
    let term = term.trim();
    if term.is_empty() {
        return notes.iter().collect();
    }

    let needle = term.to_lowercase();
    notes.iter().filter(|n| n.matches(&needle)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_notes() -> Vec<Note> {
        vec![
            Note::new("Groceries", "milk, eggs").with_category("Shopping"),
            Note::new("Standup", "Discuss the release").with_tags(["work", "Weekly"]),
            Note::new("Ideas", "A plugin for diagrams"),
        ]
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let store = JsonNoteStore::new(temp.path().join("notes.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.json");
        fs::write(&path, "[{").unwrap();

        assert!(JsonNoteStore::new(path).load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = JsonNoteStore::new(temp.path().join("data/notes.json"));
        let notes = create_test_notes();

        store.save(&notes).unwrap();
        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("\"createdAt\""));
        assert!(content.contains("\"isFavorite\""));

        assert_eq!(store.load(), notes);
    }

    #[test]
    fn test_search_fields() {
        let notes = create_test_notes();

        let titles = |term: &str| -> Vec<String> {
            search_notes(&notes, term)
                .into_iter()
                .map(|n| n.title.clone())
                .collect()
        };

        assert_eq!(titles("shop"), vec!["Groceries"]);
        assert_eq!(titles("WEEKLY"), vec!["Standup"]);
        assert_eq!(titles("plugin"), vec!["Ideas"]);
        assert_eq!(titles("ideas"), vec!["Ideas"]);
        assert!(titles("nothing-like-this").is_empty());
        assert_eq!(titles("  ").len(), 3);
    }
}
