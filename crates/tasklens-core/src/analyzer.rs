//! Task metadata inference.
//!
//! [`TaskAnalyzer`] turns one free-form task description into structured
//! metadata (dependencies, epic, priority, category, confidence, reasoning,
//! related tasks) using the existing task collection as context. It runs ten
//! phases in order; each phase only reads the outputs of earlier ones:
//!
//! 1. explicit `TASK-NNN` and `#NNN` references
//! 2. hint markers and relational phrases
//! 3. keyword extraction
//! 4. semantic matching against the keyword index
//! 5. epic detection
//! 6. priority inference
//! 7. category detection
//! 8. dependency inference
//! 9. confidence scoring
//! 10. reasoning
//!
//! The analyzer never writes to the collection. Unknown or completed task ids
//! are filtered out of the result rather than reported as errors.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AnalyzerConfig, ConfigError, Vocabulary};
use crate::hints::{extract_issue_references, extract_task_references, parse_hints, Hints, Temporal};
use crate::keywords::{extract_keywords, KeywordIndex};
use crate::matcher::{TaskMatch, TaskMatcher};
use crate::task::{Category, Priority, Task, TaskStatus};

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Task at position {index} has no id")]
    MissingId { index: usize },
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Confidence {
    pub epic: f64,
    pub depends_on: f64,
    pub priority: f64,
    pub category: f64,
    /// Mean of the four aspect scores above.
    pub overall: f64,
}

impl Confidence {
    fn new(epic: f64, depends_on: f64, priority: f64, category: f64) -> Self {
        Self {
            epic,
            depends_on,
            priority,
            category,
            overall: (epic + depends_on + priority + category) / 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub depends_on: Vec<String>,
    pub epic: Option<String>,
    pub priority: Priority,
    pub category: Category,
    pub confidence: Confidence,
    pub reasoning: Vec<String>,
    pub related: Vec<String>,
    pub explicit_issues: Vec<String>,
}

/// Outcome of phase 8, kept so the reasoning phase can explain it.
#[derive(Debug, Default)]
struct DependencyInference {
    depends_on: Vec<String>,
    /// Best semantic match added through the "depends on" fallback.
    semantic: Option<(String, f64)>,
    /// Semantic candidate withheld because the task is flagged urgent.
    suppressed: Option<String>,
    dropped_completed: Vec<String>,
    dropped_unknown: Vec<String>,
}

#[derive(Debug)]
struct EpicDecision {
    epic: Option<String>,
    score: f64,
    explicit: bool,
}

fn after_span_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)after\s+([A-Z0-9\-,\s]+?)(?:\s+(?:we|then|next|complete|finish)|$)")
            .expect("regex")
    })
}

fn depends_span_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)depends\s+on\s+([^.]*?)(?:\.|$)").expect("regex"))
}

#[derive(Debug)]
pub struct TaskAnalyzer {
    tasks: Vec<Task>,
    by_id: HashMap<String, usize>,
    epics: Vec<String>,
    index: KeywordIndex,
    config: AnalyzerConfig,
    vocabulary: Vocabulary,
}

impl TaskAnalyzer {
    pub fn new(tasks: Vec<Task>, epics: Option<Vec<String>>) -> Result<Self, AnalyzerError> {
        Self::with_config(tasks, epics, AnalyzerConfig::default(), Vocabulary::default())
    }

    /// Build an analyzer with explicit thresholds and word lists.
    ///
    /// When `epics` is `None` or empty, the distinct epics of `tasks` are used
    /// in first-seen order.
    pub fn with_config(
        tasks: Vec<Task>,
        epics: Option<Vec<String>>,
        config: AnalyzerConfig,
        vocabulary: Vocabulary,
    ) -> Result<Self, AnalyzerError> {
        config.validate()?;

        let mut by_id = HashMap::new();
        for (index, task) in tasks.iter().enumerate() {
            if task.id.trim().is_empty() {
                return Err(AnalyzerError::MissingId { index });
            }
            if by_id.insert(task.id.clone(), index).is_some() {
                warn!(task_id = %task.id, "duplicate task id; later record wins");
            }
        }

        let epics = match epics.filter(|list| !list.is_empty()) {
            Some(list) => list,
            None => {
                let mut seen = HashSet::new();
                tasks
                    .iter()
                    .filter_map(|task| task.epic.clone())
                    .filter(|epic| seen.insert(epic.clone()))
                    .collect()
            }
        };

        let index = KeywordIndex::build(&tasks, &vocabulary);
        debug!(
            tasks = tasks.len(),
            epics = epics.len(),
            "built keyword index"
        );

        Ok(Self {
            tasks,
            by_id,
            epics,
            index,
            config,
            vocabulary,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn epics(&self) -> &[String] {
        &self.epics
    }

    pub fn keyword_index(&self) -> &KeywordIndex {
        &self.index
    }

    pub fn analyze(&self, description: &str) -> Analysis {
        let explicit_tasks = extract_task_references(description);
        let explicit_issues = extract_issue_references(description);
        let hints = parse_hints(description);
        let keywords = extract_keywords(description, &self.vocabulary);
        let matches = TaskMatcher::new(&self.tasks, &self.index, &self.config).find_matches(&keywords);
        debug!(
            explicit = explicit_tasks.len(),
            keywords = keywords.len(),
            matches = matches.len(),
            "collected signals"
        );

        let epic = self.detect_epic(description, &keywords, &matches);
        debug!(epic = ?epic.epic, score = epic.score, "epic detection");
        let (priority, critical_match) = self.infer_priority(&hints, &matches);
        let (category, category_word) = self.detect_category(&keywords);
        let deps = self.infer_dependencies(description, &explicit_tasks, &hints, &matches);
        debug!(depends_on = ?deps.depends_on, "dependency inference");

        let confidence = self.score_confidence(&deps.depends_on, &epic, &hints, &explicit_tasks);
        let related = self.infer_related(&matches, &deps.depends_on);
        let reasoning = self.reasoning(
            &explicit_tasks,
            &hints,
            &matches,
            &epic,
            &deps,
            &priority,
            critical_match,
            &category,
            category_word.as_deref(),
        );

        Analysis {
            depends_on: deps.depends_on,
            epic: epic.epic,
            priority,
            category,
            confidence,
            reasoning,
            related,
            explicit_issues,
        }
    }

    /// Analyze several descriptions against the same keyword index.
    pub fn analyze_batch<S: AsRef<str>>(&self, descriptions: &[S]) -> Vec<Analysis> {
        descriptions
            .iter()
            .map(|description| self.analyze(description.as_ref()))
            .collect()
    }

    fn detect_epic(&self, description: &str, keywords: &[String], matches: &[TaskMatch<'_>]) -> EpicDecision {
        // Candidates in insertion order; the first one with the top score wins.
        let mut candidates: Vec<(String, f64, bool)> = Vec::new();
        fn bump(candidates: &mut Vec<(String, f64, bool)>, epic: &str, amount: f64) {
            match candidates.iter_mut().find(|(name, _, _)| name == epic) {
                Some(entry) => entry.1 += amount,
                None => candidates.push((epic.to_string(), amount, false)),
            }
        }

        let lowered = description.to_lowercase();
        for epic in &self.epics {
            if lowered.contains(&epic.to_lowercase()) {
                candidates.push((epic.clone(), self.config.explicit_epic_confidence, true));
            }
        }

        for m in matches.iter().take(self.config.epic_match_window) {
            if let Some(epic) = m.task.epic.as_deref() {
                bump(&mut candidates, epic, m.score * self.config.task_match_epic_boost);
            }
        }

        for keyword in keywords {
            for epic in &self.epics {
                if epic.to_lowercase().contains(keyword.as_str()) {
                    bump(&mut candidates, epic, self.config.keyword_epic_boost);
                }
            }
        }

        let mut best: Option<&(String, f64, bool)> = None;
        for candidate in &candidates {
            if best.map(|b| candidate.1 > b.1).unwrap_or(true) {
                best = Some(candidate);
            }
        }
        match best {
            Some((name, score, explicit)) => EpicDecision {
                epic: Some(name.clone()),
                score: score.min(1.0),
                explicit: *explicit,
            },
            None => EpicDecision {
                epic: None,
                score: self.config.confidence_epic_not_found,
                explicit: false,
            },
        }
    }

    fn infer_priority<'m>(&self, hints: &Hints, matches: &[TaskMatch<'m>]) -> (Priority, Option<&'m Task>) {
        if hints.blocker {
            return (Priority::Critical, None);
        }
        if hints.urgent {
            return (Priority::High, None);
        }
        let critical = matches.iter().find(|m| {
            m.task.priority == Priority::Critical
                && m.score > self.config.critical_task_priority_threshold
        });
        match critical {
            Some(m) => (Priority::High, Some(m.task)),
            None => (Priority::Medium, None),
        }
    }

    fn detect_category(&self, keywords: &[String]) -> (Category, Option<String>) {
        let present: HashSet<&str> = keywords.iter().map(String::as_str).collect();
        for (category, words) in &self.vocabulary.categories {
            if let Some(word) = words.iter().find(|word| present.contains(word.as_str())) {
                return (category.clone(), Some(word.clone()));
            }
        }
        (Category::Chore, None)
    }

    fn infer_dependencies(
        &self,
        description: &str,
        explicit_tasks: &[String],
        hints: &Hints,
        matches: &[TaskMatch<'_>],
    ) -> DependencyInference {
        let mut inference = DependencyInference::default();
        let mut candidates: Vec<String> = Vec::new();

        if hints.temporal == Some(Temporal::After) {
            if let Some(span) = after_span_regex().captures(description).and_then(|cap| cap.get(1)) {
                candidates.extend(extract_task_references(span.as_str()));
            }
        }

        candidates.extend(explicit_tasks.iter().cloned());

        if hints.depends_on_phrase {
            if let Some(span) = depends_span_regex().captures(description).and_then(|cap| cap.get(1)) {
                let explicit = extract_task_references(span.as_str());
                if !explicit.is_empty() {
                    candidates.extend(explicit);
                } else if let Some(best) = matches
                    .iter()
                    .find(|m| m.score > self.config.high_confidence_match_threshold)
                {
                    if hints.is_flagged() {
                        inference.suppressed = Some(best.task.id.clone());
                    } else {
                        candidates.push(best.task.id.clone());
                        inference.semantic = Some((best.task.id.clone(), best.score));
                    }
                }
            }
        }

        let unique: BTreeSet<String> = candidates.into_iter().collect();
        for id in unique {
            match self.task(&id) {
                None => inference.dropped_unknown.push(id),
                Some(task) if task.status == TaskStatus::Completed => {
                    inference.dropped_completed.push(id)
                }
                Some(_) => inference.depends_on.push(id),
            }
        }
        if let Some((id, _)) = &inference.semantic {
            if !inference.depends_on.contains(id) {
                inference.semantic = None;
            }
        }
        inference
    }

    fn score_confidence(
        &self,
        depends_on: &[String],
        epic: &EpicDecision,
        hints: &Hints,
        explicit_tasks: &[String],
    ) -> Confidence {
        let c = &self.config;
        let depends = if depends_on.is_empty() {
            c.confidence_no_dependencies
        } else if depends_on.iter().any(|dep| explicit_tasks.contains(dep)) {
            c.confidence_explicit_task_ref
        } else if hints.depends_on_phrase {
            c.confidence_explicit_phrase
        } else if hints.temporal.is_some() {
            c.confidence_temporal_hint
        } else {
            c.confidence_semantic_dependency
        };
        let epic_score = if epic.epic.is_none() {
            c.confidence_epic_not_found
        } else if hints.part_of_phrase {
            c.explicit_epic_confidence
        } else {
            c.confidence_epic_semantic
        };
        let priority = if hints.is_flagged() {
            c.confidence_explicit_priority
        } else {
            c.confidence_default_priority
        };
        Confidence::new(epic_score, depends, priority, c.confidence_category)
    }

    fn infer_related(&self, matches: &[TaskMatch<'_>], depends_on: &[String]) -> Vec<String> {
        matches
            .iter()
            .take(self.config.related_match_window)
            .filter(|m| m.score > self.config.related_match_threshold)
            .map(|m| m.task.id.clone())
            .filter(|id| !depends_on.contains(id))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn reasoning(
        &self,
        explicit_tasks: &[String],
        hints: &Hints,
        matches: &[TaskMatch<'_>],
        epic: &EpicDecision,
        deps: &DependencyInference,
        priority: &Priority,
        critical_match: Option<&Task>,
        category: &Category,
        category_word: Option<&str>,
    ) -> Vec<String> {
        let mut reasons = Vec::new();

        if deps.depends_on.is_empty() {
            if deps.dropped_completed.is_empty() {
                reasons.push("No dependencies detected".to_string());
            } else {
                reasons.push(format!(
                    "No dependencies added: {} already completed",
                    deps.dropped_completed.join(", ")
                ));
            }
        } else {
            let explicit: Vec<&str> = deps
                .depends_on
                .iter()
                .filter(|dep| explicit_tasks.contains(dep))
                .map(String::as_str)
                .collect();
            if !explicit.is_empty() {
                reasons.push(format!(
                    "Detected explicit task reference(s): {}",
                    explicit.join(", ")
                ));
            }
            if let Some(temporal) = hints.temporal {
                reasons.push(format!("Found temporal relationship: '{}'", temporal.as_str()));
            }
            if hints.depends_on_phrase {
                reasons.push("Found explicit 'depends on' phrase".to_string());
            }
            if let Some((id, score)) = &deps.semantic {
                reasons.push(format!(
                    "Inferred dependency on {} from a closely matching task (score {:.2})",
                    id, score
                ));
            }
            if !deps.dropped_completed.is_empty() {
                reasons.push(format!(
                    "Skipped completed dependency: {}",
                    deps.dropped_completed.join(", ")
                ));
            }
        }
        if !deps.dropped_unknown.is_empty() {
            reasons.push(format!(
                "Ignored unknown task reference(s): {}",
                deps.dropped_unknown.join(", ")
            ));
        }
        if let Some(id) = &deps.suppressed {
            reasons.push(format!(
                "Did not infer dependency on {}: flagged tasks are expected to unblock work",
                id
            ));
        }

        match &epic.epic {
            Some(name) if epic.explicit => {
                reasons.push(format!("Matched epic from explicit mention: {}", name))
            }
            Some(name) => reasons.push(format!("Inferred epic from similar tasks: {}", name)),
            None => reasons.push("Could not determine epic (will auto-assign)".to_string()),
        }

        if hints.blocker {
            reasons.push(format!(
                "Priority elevated to '{}' due to [BLOCKER] marker",
                priority
            ));
        } else if hints.urgent {
            reasons.push(format!("Priority set to '{}' due to [URGENT] marker", priority));
        } else if let Some(task) = critical_match {
            reasons.push(format!(
                "Priority raised to '{}': closely matches critical task {}",
                priority, task.id
            ));
        }

        match category_word {
            Some(word) => reasons.push(format!(
                "Category inferred as '{}' from keyword '{}'",
                category, word
            )),
            None => reasons.push(format!(
                "Category defaulted to '{}' (no category keywords found)",
                category
            )),
        }

        if let Some(top) = matches.first() {
            reasons.push(format!(
                "Related task: {} ({})",
                top.task.id,
                truncate_title(&top.task.title, 50)
            ));
        }

        reasons
    }

    fn task(&self, id: &str) -> Option<&Task> {
        self.by_id.get(id).and_then(|idx| self.tasks.get(*idx))
    }
}

fn truncate_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        return title.to_string();
    }
    let cut: String = title.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, title: &str, status: TaskStatus) -> Task {
        let mut task = Task::new(id, title);
        task.status = status;
        task
    }

    #[test]
    fn missing_id_fails_fast() {
        let tasks = vec![task("TASK-001", "One", TaskStatus::Pending), Task::default()];
        let err = TaskAnalyzer::new(tasks, None).unwrap_err();
        assert!(matches!(err, AnalyzerError::MissingId { index: 1 }));
    }

    #[test]
    fn invalid_config_fails_fast() {
        let config = AnalyzerConfig {
            top_n_matches: 0,
            ..AnalyzerConfig::default()
        };
        let err = TaskAnalyzer::with_config(Vec::new(), None, config, Vocabulary::default())
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidConfig(_)));
    }

    #[test]
    fn epics_default_to_first_seen_order() {
        let mut a = task("TASK-001", "One", TaskStatus::Pending);
        a.epic = Some("Billing".to_string());
        let mut b = task("TASK-002", "Two", TaskStatus::Pending);
        b.epic = Some("Auth".to_string());
        let mut c = task("TASK-003", "Three", TaskStatus::Pending);
        c.epic = Some("Billing".to_string());
        let analyzer = TaskAnalyzer::new(vec![a, b, c], None).expect("analyzer");
        assert_eq!(analyzer.epics(), ["Billing", "Auth"]);
    }

    #[test]
    fn epic_ties_go_to_first_candidate() {
        let analyzer = TaskAnalyzer::new(
            Vec::new(),
            Some(vec!["Search Index".to_string(), "Search UI".to_string()]),
        )
        .expect("analyzer");
        let result = analyzer.analyze("tune search relevance");
        assert_eq!(result.epic.as_deref(), Some("Search Index"));
    }

    #[test]
    fn truncate_title_marks_cut() {
        assert_eq!(truncate_title("short", 50), "short");
        let long = "x".repeat(60);
        assert_eq!(truncate_title(&long, 50), format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn category_follows_vocabulary_precedence() {
        let analyzer = TaskAnalyzer::new(Vec::new(), None).expect("analyzer");
        assert_eq!(analyzer.analyze("add docs for the fix").category, Category::Bug);
        assert_eq!(analyzer.analyze("add export button").category, Category::Feature);
        assert_eq!(analyzer.analyze("update readme").category, Category::Docs);
        assert_eq!(analyzer.analyze("bump versions").category, Category::Chore);
    }

    #[test]
    fn injected_vocabulary_changes_category() {
        let vocabulary = Vocabulary::new(
            &["the"],
            vec![(Category::Research, vec!["spike".to_string()])],
        );
        let analyzer =
            TaskAnalyzer::with_config(Vec::new(), None, AnalyzerConfig::default(), vocabulary)
                .expect("analyzer");
        let result = analyzer.analyze("spike on the fix");
        assert_eq!(result.category, Category::Research);
    }
}
