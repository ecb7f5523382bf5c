//! Keyword-based note organizer

use async_trait::async_trait;
use tracing::info;

use crate::extension::{Extension, ExtensionMetadata};

pub const ORGANIZER_ID: &str = "auto-organizer";

const MAX_TITLE_CHARS: usize = 50;
const DEFAULT_TITLE: &str = "New Note";

fn default_categories() -> Vec<(String, Vec<String>)> {
    let table: [(&str, &[&str]); 5] = [
        (
            "Work",
            &[
                "project", "meeting", "deadline", "client", "task", "goal", "planning",
                "report", "presentation", "colleague", "office", "company", "professional",
            ],
        ),
        (
            "Personal",
            &[
                "family", "friend", "leisure", "vacation", "home", "health", "sport",
                "hobby", "weekend", "personal", "private", "life", "relationship",
            ],
        ),
        (
            "Studies",
            &[
                "course", "exam", "homework", "study", "university", "school", "training",
                "professor", "teacher", "student", "learning", "research", "degree",
            ],
        ),
        (
            "Ideas",
            &[
                "idea", "concept", "creativity", "innovation", "inspiration", "brainstorming",
                "reflection", "thought", "suggestion", "proposal", "invention", "creation",
                "development",
            ],
        ),
        (
            "Shopping",
            &[
                "purchase", "shopping", "store", "price", "product", "item", "shop",
                "order", "delivery", "payment", "invoice", "discount", "sale",
            ],
        ),
    ];

    table
        .iter()
        .map(|(name, words)| {
            (
                name.to_string(),
                words.iter().map(|w| w.to_string()).collect(),
            )
        })
        .collect()
}

/// Auto Organizer Extension - suggests categories and titles for notes
pub struct AutoOrganizerExtension {
    categories: Vec<(String, Vec<String>)>,
}

impl Default for AutoOrganizerExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoOrganizerExtension {
    pub fn new() -> Self {
        Self {
            categories: default_categories(),
        }
    }

    pub fn categories(&self) -> Vec<&str> {
        self.categories.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Add or replace a category
    pub fn add_category(&mut self, name: &str, keywords: Vec<String>) -> anyhow::Result<()> {
        if name.trim().is_empty() || keywords.is_empty() {
            anyhow::bail!("a category needs a name and at least one keyword");
        }

        let keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        match self.categories.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = keywords,
            None => self.categories.push((name.to_string(), keywords)),
        }
        Ok(())
    }

    pub fn remove_category(&mut self, name: &str) -> bool {
        let before = self.categories.len();
        self.categories.retain(|(n, _)| n != name);
        self.categories.len() != before
    }

    /// Score every category by whole-word keyword hits.
    ///
    /// Hits are divided by the category's keyword count and rounded to two
    /// decimals. Only categories with hits are returned, best first.
    pub fn analyze(&self, content: &str) -> Vec<(String, f64)> {
        let lowered = content.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut scores: Vec<(String, f64)> = self
            .categories
            .iter()
            .filter_map(|(name, keywords)| {
                let hits = keywords
                    .iter()
                    .map(|k| words.iter().filter(|w| **w == k.as_str()).count())
                    .sum::<usize>();
                if hits == 0 {
                    return None;
                }
                let score = hits as f64 / keywords.len() as f64;
                Some((name.clone(), (score * 100.0).round() / 100.0))
            })
            .collect();

        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        scores
    }

    /// Best-scoring category, if any keyword matched
    pub fn suggest_category(&self, content: &str) -> Option<String> {
        self.analyze(content).into_iter().next().map(|(name, _)| name)
    }

    /// First non-empty line, shortened to 50 characters
    pub fn suggest_title(&self, content: &str) -> String {
        let Some(line) = content.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return DEFAULT_TITLE.to_string();
        };

        if line.chars().count() > MAX_TITLE_CHARS {
            let cut: String = line.chars().take(MAX_TITLE_CHARS - 3).collect();
            format!("{}...", cut)
        } else {
            line.to_string()
        }
    }
}

#[async_trait]
impl Extension for AutoOrganizerExtension {
    fn metadata(&self) -> ExtensionMetadata {
        ExtensionMetadata::new(ORGANIZER_ID, "Auto Organizer")
            .with_description("Suggests categories and titles from note content")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_author("PlusNotes")
    }

    async fn initialize(&mut self) -> anyhow::Result<()> {
        if self.categories.is_empty() {
            self.categories = default_categories();
        }
        info!("Auto organizer ready with {} categories", self.categories.len());
        Ok(())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_scores_and_orders() {
        let organizer = AutoOrganizerExtension::new();
        let scores = organizer.analyze(
            "Project meeting with the client: deadline moved. Weekend with family.",
        );

        // 4 work hits / 13 keywords, 2 personal hits / 13 keywords
        assert_eq!(
            scores,
            vec![("Work".to_string(), 0.31), ("Personal".to_string(), 0.15)]
        );
    }

    #[test]
    fn test_analyze_whole_words_only() {
        let organizer = AutoOrganizerExtension::new();

        assert!(organizer.analyze("projection shopkeeper").is_empty());
        assert!(organizer.analyze("").is_empty());
        assert_eq!(organizer.suggest_category("SHOPPING list").as_deref(), Some("Shopping"));
    }

    #[test]
    fn test_suggest_title() {
        let organizer = AutoOrganizerExtension::new();

        assert_eq!(organizer.suggest_title("\n   \n  Groceries  \nmilk"), "Groceries");
        assert_eq!(organizer.suggest_title("   "), "New Note");

        let long = "a".repeat(60);
        let title = organizer.suggest_title(&long);
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));

        let exact = "b".repeat(50);
        assert_eq!(organizer.suggest_title(&exact), exact);
    }

    #[test]
    fn test_custom_categories() {
        let mut organizer = AutoOrganizerExtension::new();

        organizer
            .add_category("Garden", vec!["Tomato".to_string(), "seeds".to_string()])
            .unwrap();
        assert_eq!(organizer.suggest_category("tomato seeds").as_deref(), Some("Garden"));

        assert!(organizer.add_category("", vec!["x".to_string()]).is_err());
        assert!(organizer.add_category("Empty", Vec::new()).is_err());

        assert!(organizer.remove_category("Garden"));
        assert!(!organizer.remove_category("Garden"));
        assert_eq!(organizer.categories().len(), 5);
    }
}
