//! Note templates
//!
//! Ships a fixed set of templates and keeps user templates as one JSON file
//! per template in the templates directory.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PlusNotesError, Result};
use crate::extension::{Extension, ExtensionMetadata};

pub const TEMPLATES_ID: &str = "templates";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTemplate {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_built_in: bool,
}

impl NoteTemplate {
    fn built_in(id: &str, name: &str, description: &str, category: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            content: content.to_string(),
            is_built_in: true,
        }
    }

    /// Content with `{{date}}` and `{{time}}` filled in for the current time
    pub fn render(&self) -> String {
        apply_variables(&self.content, Local::now().naive_local())
    }
}

/// Replace the date/time placeholders; unknown placeholders are left alone
pub fn apply_variables(content: &str, now: NaiveDateTime) -> String {
    content
        .replace("{{date}}", &now.format("%Y-%m-%d").to_string())
        .replace("{{time}}", &now.format("%H:%M").to_string())
}

fn built_in_templates() -> Vec<NoteTemplate> {
    vec![
        NoteTemplate::built_in(
            "meeting",
            "Meeting minutes",
            "Agenda, discussion and action items",
            "Work",
            "# Meeting minutes\n\n**Date:** {{date}}\n**Time:** {{time}}\n**Location:** \n**Attendees:** \n\n## Agenda\n\n1. \n2. \n3. \n\n## Discussion\n\n### 1. \n\n### 2. \n\n## Action items\n\n- [ ] Action - Owner: , Due: \n- [ ] Action - Owner: , Due: \n\n## Next meeting\n\n**Date:** \n**Time:** \n",
        ),
        NoteTemplate::built_in(
            "project",
            "Project plan",
            "Goals, deliverables, schedule and risks",
            "Work",
            "# Project plan: {{projectName}}\n\n## Overview\n\n\n\n## Goals\n\n- \n- \n\n## Deliverables\n\n- \n- \n\n## Schedule\n\n| Milestone | Start | End | Owner |\n|-----------|-------|-----|-------|\n|           |       |     |       |\n\n## Risks\n\n| Risk | Impact | Likelihood | Mitigation |\n|------|--------|------------|------------|\n|      |        |            |            |\n",
        ),
        NoteTemplate::built_in(
            "journal",
            "Daily journal",
            "Mood, gratitude and goals for the day",
            "Personal",
            "# Journal - {{date}}\n\n## How I feel today\n\n\n\n## Three things I am grateful for\n\n1. \n2. \n3. \n\n## What I got done\n\n- \n- \n\n## What I learned\n\n\n\n## Goals for tomorrow\n\n- \n- \n",
        ),
        NoteTemplate::built_in(
            "recipe",
            "Recipe",
            "Ingredients and steps",
            "Personal",
            "# Recipe: {{recipeName}}\n\n## Ingredients\n\n- \n- \n- \n\n## Steps\n\n1. \n2. \n3. \n\n## Notes\n\n\n\n## Source\n\n",
        ),
        NoteTemplate::built_in(
            "lecture",
            "Lecture notes",
            "Key points, summary and questions",
            "Education",
            "# Lecture notes: {{subject}}\n\n**Date:** {{date}}\n**Lecturer:** \n**Course:** \n\n## Key points\n\n- \n- \n\n## Summary\n\n\n\n## Questions\n\n- \n\n## Assignments\n\n- [ ] \n",
        ),
    ]
}

/// Templates Extension - built-in and user note templates
pub struct TemplatesExtension {
    dir: PathBuf,
    built_in: Vec<NoteTemplate>,
    custom: Vec<NoteTemplate>,
}

impl TemplatesExtension {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            built_in: built_in_templates(),
            custom: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Built-in templates followed by user templates
    pub fn all(&self) -> Vec<&NoteTemplate> {
        self.built_in.iter().chain(self.custom.iter()).collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<&NoteTemplate> {
        self.all()
            .into_iter()
            .filter(|t| t.category.eq_ignore_ascii_case(category))
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&NoteTemplate> {
        self.all().into_iter().find(|t| t.id == id)
    }

    /// Load user templates from disk; unreadable files are skipped
    pub fn load_custom(&mut self) -> Result<()> {
        self.custom.clear();
        if !self.dir.is_dir() {
            return Ok(());
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();

        for path in files {
            let parsed = fs::read_to_string(&path)
                .map_err(PlusNotesError::from)
                .and_then(|content| {
                    serde_json::from_str::<NoteTemplate>(&content).map_err(|e| {
                        PlusNotesError::Json {
                            path: path.clone(),
                            message: e.to_string(),
                        }
                    })
                });
            match parsed {
                Ok(mut template) => {
                    template.is_built_in = false;
                    self.custom.push(template);
                }
                Err(e) => warn!("Skipping template {}: {}", path.display(), e),
            }
        }

        debug!("Loaded {} custom templates", self.custom.len());
        Ok(())
    }

    fn save_template(&self, template: &NoteTemplate) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", template.id));
        let content =
            serde_json::to_string_pretty(template).map_err(|e| PlusNotesError::Json {
                path: path.clone(),
                message: e.to_string(),
            })?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Add or replace a user template; returns its id
    pub fn add_custom(&mut self, mut template: NoteTemplate) -> Result<String> {
        if template.id.trim().is_empty() {
            template.id = uuid::Uuid::new_v4().to_string();
        }
        template.is_built_in = false;

        self.save_template(&template)?;
        let id = template.id.clone();
        self.custom.retain(|t| t.id != id);
        self.custom.push(template);
        Ok(id)
    }

    /// Remove a user template; built-ins cannot be removed
    pub fn remove_custom(&mut self, id: &str) -> Result<bool> {
        let Some(index) = self.custom.iter().position(|t| t.id == id) else {
            return Ok(false);
        };
        self.custom.remove(index);

        let path = self.dir.join(format!("{}.json", id));
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(true)
    }
}

#[async_trait]
impl Extension for TemplatesExtension {
    fn metadata(&self) -> ExtensionMetadata {
        ExtensionMetadata::new(TEMPLATES_ID, "Note Templates")
            .with_description("Predefined templates for common kinds of notes")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_author("PlusNotes")
    }

    async fn initialize(&mut self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)?;
        self.load_custom()?;
        info!("Templates ready: {} available", self.all().len());
        Ok(())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        for template in &self.custom {
            self.save_template(template)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn create_test_extension() -> (TemplatesExtension, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let extension = TemplatesExtension::new(temp_dir.path().join("Templates"));
        (extension, temp_dir)
    }

    #[test]
    fn test_apply_variables() {
        let now = NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();

        let rendered = apply_variables("{{date}} at {{time}} for {{subject}}", now);
        assert_eq!(rendered, "2025-03-09 at 14:05 for {{subject}}");
    }

    #[test]
    fn test_built_ins_by_category() {
        let (extension, _temp) = create_test_extension();

        assert_eq!(extension.all().len(), 5);
        let work: Vec<_> = extension.by_category("work").iter().map(|t| t.id.clone()).collect();
        assert_eq!(work, vec!["meeting", "project"]);
        assert!(extension.find("journal").unwrap().is_built_in);
    }

    #[tokio::test]
    async fn test_custom_templates_persist() {
        let (mut extension, temp) = create_test_extension();
        extension.initialize().await.unwrap();

        let id = extension
            .add_custom(NoteTemplate {
                id: String::new(),
                name: "Standup".to_string(),
                description: String::new(),
                category: "Work".to_string(),
                content: "Yesterday / Today / Blockers".to_string(),
                is_built_in: true,
            })
            .unwrap();

        let mut reloaded = TemplatesExtension::new(temp.path().join("Templates"));
        reloaded.initialize().await.unwrap();

        let standup = reloaded.find(&id).unwrap();
        assert!(!standup.is_built_in);
        assert_eq!(reloaded.by_category("Work").len(), 3);

        assert!(reloaded.remove_custom(&id).unwrap());
        assert!(!reloaded.remove_custom("meeting").unwrap());
        assert!(!temp.path().join("Templates").join(format!("{}.json", id)).exists());
    }

    #[tokio::test]
    async fn test_corrupt_template_skipped() {
        let (mut extension, _temp) = create_test_extension();
        fs::create_dir_all(extension.dir()).unwrap();
        fs::write(extension.dir().join("broken.json"), "{").unwrap();

        extension.initialize().await.unwrap();
        assert_eq!(extension.all().len(), 5);
    }
}
