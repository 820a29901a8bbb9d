use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::Vocabulary;
use crate::task::Task;

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-z0-9_-]+\b").expect("regex"))
}

/// Lowercase tokens longer than two characters that are not stopwords.
///
/// Order is preserved and duplicates are kept.
pub fn extract_keywords(text: &str, vocabulary: &Vocabulary) -> Vec<String> {
    let lowered = text.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|token| token.chars().count() > 2)
        .filter(|token| !vocabulary.is_stopword(token))
        .map(|token| token.to_string())
        .collect()
}

/// Keywords of every known task, keyed by task id. Built once per engine.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    order: Vec<String>,
    by_task: HashMap<String, Vec<String>>,
}

impl KeywordIndex {
    pub fn build(tasks: &[Task], vocabulary: &Vocabulary) -> Self {
        let mut index = KeywordIndex::default();
        for task in tasks {
            let text = format!("{} {}", task.title, task.description_text());
            let keywords = extract_keywords(&text, vocabulary);
            if index.by_task.insert(task.id.clone(), keywords).is_none() {
                index.order.push(task.id.clone());
            }
        }
        index
    }

    pub fn get(&self, task_id: &str) -> &[String] {
        self.by_task
            .get(task_id)
            .map(|keywords| keywords.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.order
            .iter()
            .map(move |id| (id.as_str(), self.get(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_keywords_drops_stopwords_and_short_tokens() {
        let vocab = Vocabulary::default();
        let keywords = extract_keywords(
            "Fix the auth validation thing after context refactor",
            &vocab,
        );
        assert_eq!(
            keywords,
            vec!["fix", "auth", "validation", "thing", "context", "refactor"]
        );
    }

    #[test]
    fn extract_keywords_keeps_duplicates_and_hyphens() {
        let vocab = Vocabulary::default();
        let keywords = extract_keywords("login login re-run db_sync ok", &vocab);
        assert_eq!(keywords, vec!["login", "login", "re-run", "db_sync"]);
    }

    #[test]
    fn extract_keywords_uses_injected_stopwords() {
        let vocab = Vocabulary::new(&["login"], Vec::new());
        let keywords = extract_keywords("the login page", &vocab);
        assert_eq!(keywords, vec!["the", "page"]);
    }

    #[test]
    fn keyword_index_covers_title_and_description() {
        let vocab = Vocabulary::default();
        let mut task = Task::new("TASK-001", "Login form");
        task.description = Some("Render email field".to_string());
        let index = KeywordIndex::build(&[task], &vocab);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("TASK-001"), ["login", "form", "render", "email", "field"]);
        assert!(index.get("TASK-404").is_empty());
    }
}
