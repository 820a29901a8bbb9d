use std::collections::HashSet;

use serde::Serialize;

use crate::config::AnalyzerConfig;
use crate::keywords::KeywordIndex;
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TaskMatch<'a> {
    pub task: &'a Task,
    pub score: f64,
}

/// Jaccard similarity of two keyword sets; 0.0 when the union is empty.
pub fn jaccard(left: &HashSet<&str>, right: &HashSet<&str>) -> f64 {
    let union = left.union(right).count();
    if union == 0 {
        return 0.0;
    }
    let shared = left.intersection(right).count();
    shared as f64 / union as f64
}

/// Ranks known tasks against a keyword query.
#[derive(Debug)]
pub struct TaskMatcher<'a> {
    tasks: &'a [Task],
    index: &'a KeywordIndex,
    config: &'a AnalyzerConfig,
}

impl<'a> TaskMatcher<'a> {
    pub fn new(tasks: &'a [Task], index: &'a KeywordIndex, config: &'a AnalyzerConfig) -> Self {
        Self {
            tasks,
            index,
            config,
        }
    }

    pub fn find_matches(&self, keywords: &[String]) -> Vec<TaskMatch<'a>> {
        let query: HashSet<&str> = keywords.iter().map(String::as_str).collect();
        let mut scored = Vec::new();

        for task in self.tasks {
            if task.status == TaskStatus::Deleted {
                continue;
            }
            let task_keywords: HashSet<&str> =
                self.index.get(&task.id).iter().map(String::as_str).collect();
            let mut score = jaccard(&query, &task_keywords);
            if phrase_in_task(keywords, task) {
                score = (score * self.config.similarity_boost_multiplier).min(1.0);
            }
            if score > self.config.similarity_threshold {
                scored.push(TaskMatch { task, score });
            }
        }

        // Vec::sort_by is stable, so equal scores keep task order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(self.config.top_n_matches);
        scored
    }
}

fn phrase_in_task(keywords: &[String], task: &Task) -> bool {
    let phrase = keywords.join(" ").to_lowercase();
    task.title.to_lowercase().contains(&phrase)
        || task.description_text().to_lowercase().contains(&phrase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Vocabulary;

    fn set<'a>(words: &[&'a str]) -> HashSet<&'a str> {
        words.iter().copied().collect()
    }

    fn task(id: &str, title: &str, description: &str) -> Task {
        let mut task = Task::new(id, title);
        if !description.is_empty() {
            task.description = Some(description.to_string());
        }
        task
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn jaccard_is_symmetric_and_zero_for_empty() {
        let a = set(&["auth", "login", "form"]);
        let b = set(&["login", "form", "email", "field"]);
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
        assert!((jaccard(&a, &b) - 2.0 / 5.0).abs() < 1e-9);
        assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
        assert_eq!(jaccard(&a, &set(&[])), 0.0);
    }

    #[test]
    fn find_matches_ranks_and_filters() {
        let vocab = Vocabulary::default();
        let config = AnalyzerConfig::default();
        let tasks = vec![
            task("TASK-001", "Payment export", ""),
            task("TASK-002", "Login form validation", ""),
            task("TASK-003", "Login page styling", ""),
        ];
        let index = KeywordIndex::build(&tasks, &vocab);
        let matcher = TaskMatcher::new(&tasks, &index, &config);

        let matches = matcher.find_matches(&keywords(&["login", "validation"]));
        let ids: Vec<&str> = matches.iter().map(|m| m.task.id.as_str()).collect();
        assert_eq!(ids, vec!["TASK-002", "TASK-003"]);
        assert!(matches[0].score > matches[1].score);
    }

    #[test]
    fn phrase_boost_never_lowers_score() {
        let vocab = Vocabulary::default();
        let config = AnalyzerConfig::default();
        let tasks = vec![
            task("TASK-001", "Session token", "rotate session token daily"),
            task("TASK-002", "Session token", "daily token session rotate"),
        ];
        let index = KeywordIndex::build(&tasks, &vocab);
        let matcher = TaskMatcher::new(&tasks, &index, &config);

        let matches = matcher.find_matches(&keywords(&["rotate", "session"]));
        assert_eq!(matches[0].task.id, "TASK-001");
        assert!(matches[0].score >= matches[1].score);
        assert!(matches[0].score <= 1.0);
    }

    #[test]
    fn deleted_tasks_are_skipped() {
        let vocab = Vocabulary::default();
        let config = AnalyzerConfig::default();
        let mut gone = task("TASK-001", "Login form", "");
        gone.status = TaskStatus::Deleted;
        let tasks = vec![gone];
        let index = KeywordIndex::build(&tasks, &vocab);
        let matcher = TaskMatcher::new(&tasks, &index, &config);
        assert!(matcher.find_matches(&keywords(&["login", "form"])).is_empty());
    }

    #[test]
    fn ties_keep_encounter_order_and_top_n() {
        let vocab = Vocabulary::default();
        let config = AnalyzerConfig {
            top_n_matches: 2,
            ..AnalyzerConfig::default()
        };
        let tasks = vec![
            task("TASK-001", "Cache layer", ""),
            task("TASK-002", "Cache layer", ""),
            task("TASK-003", "Cache layer", ""),
        ];
        let index = KeywordIndex::build(&tasks, &vocab);
        let matcher = TaskMatcher::new(&tasks, &index, &config);
        let matches = matcher.find_matches(&keywords(&["cache", "layer"]));
        let ids: Vec<&str> = matches.iter().map(|m| m.task.id.as_str()).collect();
        assert_eq!(ids, vec!["TASK-001", "TASK-002"]);
    }
}
