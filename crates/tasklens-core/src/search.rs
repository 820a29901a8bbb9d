use std::path::Path;

use serde::Serialize;

use crate::store::{load_store, StoreError};
use crate::task::{parse_tasks, Priority, Task, TaskStatus};

const TITLE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SearchHit<'a> {
    pub task: &'a Task,
    pub score: u32,
}

/// Score every task against a free-text query, best first.
///
/// Title hits dominate, description hits add a little, and priority nudges
/// ties. Tasks that score zero are dropped; a blank query matches nothing.
pub fn rank_by_relevance<'a>(tasks: &'a [Task], query: &str) -> Vec<SearchHit<'a>> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    let words: Vec<&str> = query.split_whitespace().collect();

    let mut hits: Vec<SearchHit<'a>> = tasks
        .iter()
        .map(|task| SearchHit {
            task,
            score: score_task(task, &query, &words),
        })
        .filter(|hit| hit.score > 0)
        .collect();
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits
}

fn score_task(task: &Task, query: &str, words: &[&str]) -> u32 {
    let mut score = 0;

    let title = task.title.to_lowercase();
    if title.contains(query) {
        score += 100;
    } else {
        let matching = words.iter().filter(|word| title.contains(**word)).count();
        if matching == words.len() {
            score += 80;
        } else if matching * 2 > words.len() {
            score += 60;
        } else if matching > 0 {
            score += 40;
        }
    }

    let description = task.description_text().to_lowercase();
    if description.contains(query) {
        score += 20;
    } else if words.iter().any(|word| description.contains(*word)) {
        score += 10;
    }

    score += match task.priority {
        Priority::Critical | Priority::High => 5,
        Priority::Medium => 2,
        _ => 0,
    };
    score
}

/// Rank tasks, optionally dropping completed work, and keep at most `limit`
/// hits (`0` keeps everything).
pub fn search_tasks<'a>(
    tasks: &'a [Task],
    query: &str,
    limit: usize,
    include_completed: bool,
) -> Vec<SearchHit<'a>> {
    let hits = rank_by_relevance(tasks, query)
        .into_iter()
        .filter(|hit| include_completed || hit.task.status != TaskStatus::Completed);
    if limit > 0 {
        hits.take(limit).collect()
    } else {
        hits.collect()
    }
}

/// Option label for the hit at `idx`: `A` through `Z`, then `AA`, `AB`, ...
pub fn option_label(idx: usize) -> String {
    let mut letters = Vec::new();
    let mut n = idx;
    loop {
        letters.push(char::from(b'A' + (n % 26) as u8));
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn status_marker(status: &TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "[DONE]",
        TaskStatus::Pending | TaskStatus::InProgress | TaskStatus::Blocked => "[ACTIVE]",
        _ => "[NEW]",
    }
}

fn priority_marker(priority: &Priority) -> &'static str {
    match priority {
        Priority::Critical | Priority::High => "[!]",
        Priority::Medium => "[*]",
        _ => "-",
    }
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() > TITLE_WIDTH {
        let head: String = title.chars().take(TITLE_WIDTH - 3).collect();
        format!("{}...", head)
    } else {
        title.to_string()
    }
}

pub fn format_task_row(task: &Task, option: &str) -> String {
    format!(
        "| {} | {} | {} | {} |",
        option,
        status_marker(&task.status),
        priority_marker(&task.priority),
        truncate_title(&task.title)
    )
}

/// Markdown table of hits with option letters, or a short notice when empty.
pub fn format_task_table(hits: &[SearchHit<'_>], show_scores: bool) -> String {
    if hits.is_empty() {
        return "No matching tasks found.".to_string();
    }
    let mut lines = vec![
        String::new(),
        "| Option | Status | Priority | Task Description |".to_string(),
        "|--------|--------|----------|------------------|".to_string(),
    ];
    for (idx, hit) in hits.iter().enumerate() {
        lines.push(format_task_row(hit.task, &option_label(idx)));
    }
    if show_scores {
        let scores: Vec<String> = hits
            .iter()
            .enumerate()
            .map(|(idx, hit)| format!("{}={}", option_label(idx), hit.score))
            .collect();
        lines.push(String::new());
        lines.push(format!("(Relevance scores: {})", scores.join(", ")));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileValidation {
    pub valid: bool,
    pub error: String,
}

/// Check that a store exists, is a readable text file, and parses.
pub fn validate_tasks_file(path: &Path) -> FileValidation {
    if path.exists() && !path.is_file() {
        return FileValidation {
            valid: false,
            error: format!("Not a file: {}", path.display()),
        };
    }
    match load_store(path).map(|content| parse_tasks(&content)) {
        Ok(_) => FileValidation {
            valid: true,
            error: String::new(),
        },
        Err(err @ (StoreError::NotFound(_) | StoreError::Empty(_))) => FileValidation {
            valid: false,
            error: err.to_string(),
        },
        Err(err) => FileValidation {
            valid: false,
            error: format!("Error reading tasks file: {}", err),
        },
    }
}
