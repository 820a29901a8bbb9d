use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskParseError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Blocked,
    Completed,
    Deleted,
    /// Any other spelling, kept verbatim so a rewrite does not lose it.
    Other(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "pending" => TaskStatus::Pending,
            "in-progress" | "in_progress" => TaskStatus::InProgress,
            "blocked" => TaskStatus::Blocked,
            "completed" => TaskStatus::Completed,
            "deleted" => TaskStatus::Deleted,
            _ => TaskStatus::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
            TaskStatus::Deleted => "deleted",
            TaskStatus::Other(value) => value.as_str(),
        }
    }

    /// Pending or in progress: work that is waiting on its blockers.
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
    Other(String),
}

impl Priority {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "medium" => Priority::Medium,
            "low" => Priority::Low,
            "high" => Priority::High,
            "critical" => Priority::Critical,
            _ => Priority::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
            Priority::Other(value) => value.as_str(),
        }
    }

    /// Numeric order used for inversion checks; unknown priorities rank 0.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Critical => 4,
            Priority::Other(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Category {
    Feature,
    Bug,
    Refactor,
    Docs,
    Research,
    #[default]
    Chore,
    Other(String),
}

impl Category {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "chore" => Category::Chore,
            "feature" => Category::Feature,
            "bug" => Category::Bug,
            "refactor" => Category::Refactor,
            "docs" => Category::Docs,
            "research" => Category::Research,
            _ => Category::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Feature => "feature",
            Category::Bug => "bug",
            Category::Refactor => "refactor",
            Category::Docs => "docs",
            Category::Research => "research",
            Category::Chore => "chore",
            Category::Other(value) => value.as_str(),
        }
    }
}

macro_rules! wire_string {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.serialize_str(self.as_str())
                }
            }
        )*
    };
}

wire_string!(TaskStatus, Priority, Category);

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub category: Category,
    pub epic: Option<String>,
    pub depends_on: Vec<String>,
    pub related: Vec<String>,
    pub origin: Option<String>,
    pub created: Option<String>,
    pub description: Option<String>,
    /// Raw block text between this header and the next one.
    #[serde(skip)]
    pub block: String,
}

impl Task {
    pub fn new(id: &str, title: &str) -> Self {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            ..Task::default()
        }
    }

    pub fn id_num(&self) -> i32 {
        self.id
            .rsplit('-')
            .next()
            .and_then(|digits| digits.parse::<i32>().ok())
            .unwrap_or(999_999)
    }

    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^##[ \t]+\[(TASK-\d{3})\][ \t]+(.+?)[ \t]*\r?$").expect("regex")
    })
}

fn field_boundary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)\*\*|\n[ \t]*\r?\n|^---").expect("regex"))
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w-]+").expect("regex"))
}

/// A header match: task id, title, and byte range of the header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHeader {
    pub id: String,
    pub title: String,
    pub start: usize,
    pub end: usize,
}

pub fn find_task_headers(content: &str) -> Vec<TaskHeader> {
    header_regex()
        .captures_iter(content)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            Some(TaskHeader {
                id: cap.get(1)?.as_str().to_string(),
                title: cap.get(2)?.as_str().trim().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Split a store document into `(task_id, raw_block)` pairs in document order.
///
/// The block is the text strictly after a header line and before the next
/// header (or end of text). Input without headers yields an empty list.
pub fn parse_task_blocks(content: &str) -> Vec<(String, String)> {
    let headers = find_task_headers(content);
    let mut blocks = Vec::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        let end = headers
            .get(idx + 1)
            .map(|next| next.start)
            .unwrap_or(content.len());
        blocks.push((header.id.clone(), content[header.end..end].to_string()));
    }
    blocks
}

/// Byte-level entry point: anything that is not UTF-8 text is rejected.
pub fn parse_task_bytes(bytes: &[u8]) -> Result<Vec<(String, String)>, TaskParseError> {
    let content = std::str::from_utf8(bytes)
        .map_err(|err| TaskParseError::InvalidInput(format!("expected UTF-8 text: {}", err)))?;
    Ok(parse_task_blocks(content))
}

fn label_value<'a>(block: &'a str, field_name: &str) -> Option<&'a str> {
    let label = format!("**{}**:", field_name);
    let idx = block.find(&label)?;
    Some(&block[idx + label.len()..])
}

/// Single-token field such as `Status` or `Priority`.
pub fn extract_field(block: &str, field_name: &str) -> Option<String> {
    let rest = label_value(block, field_name)?;
    let rest = rest.trim_start_matches([' ', '\t']);
    token_regex()
        .find(rest)
        .map(|m| m.as_str().to_string())
}

/// Free-text field. The value runs until the next blank line, the next bold
/// label, or a `---` separator line.
pub fn extract_text_field(block: &str, field_name: &str) -> Option<String> {
    let rest = label_value(block, field_name)?.trim_start();
    let end = field_boundary_regex()
        .find(rest)
        .map(|m| m.start())
        .unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a comma-separated id list; absent or `(none)` is empty.
pub fn parse_id_list(value: Option<&str>) -> Vec<String> {
    let Some(value) = value.map(str::trim) else {
        return Vec::new();
    };
    if value.is_empty() || value.eq_ignore_ascii_case("(none)") {
        return Vec::new();
    }
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn parse_depends_on(block: &str) -> Vec<String> {
    parse_id_list(extract_text_field(block, "Depends On").as_deref())
}

pub fn parse_task(task_id: &str, title: &str, block: &str) -> Task {
    Task {
        id: task_id.to_string(),
        title: title.to_string(),
        status: extract_field(block, "Status")
            .map(|s| TaskStatus::parse(&s))
            .unwrap_or_default(),
        priority: extract_field(block, "Priority")
            .map(|s| Priority::parse(&s))
            .unwrap_or_default(),
        category: extract_field(block, "Category")
            .map(|s| Category::parse(&s))
            .unwrap_or_default(),
        epic: extract_text_field(block, "Epic"),
        depends_on: parse_depends_on(block),
        related: parse_id_list(extract_text_field(block, "Related").as_deref()),
        origin: extract_text_field(block, "Origin"),
        created: extract_text_field(block, "Created"),
        description: extract_text_field(block, "Description"),
        block: block.to_string(),
    }
}

/// Parse every task record of a store document, in document order.
pub fn parse_tasks(content: &str) -> Vec<Task> {
    let headers = find_task_headers(content);
    let mut tasks = Vec::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        let end = headers
            .get(idx + 1)
            .map(|next| next.start)
            .unwrap_or(content.len());
        tasks.push(parse_task(
            &header.id,
            &header.title,
            &content[header.end..end],
        ));
    }
    tasks
}
