use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::task::{find_task_headers, parse_tasks, Task};

pub const DEFAULT_PREAMBLE: &str = "# Active Tasks";
const KNOWN_FIELDS: [&str; 9] = [
    "Status",
    "Priority",
    "Category",
    "Epic",
    "Depends On",
    "Related",
    "Origin",
    "Created",
    "Description",
];
const PRESERVED: &str = "(preserved)";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Tasks file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Tasks file {path} is not valid UTF-8 text")]
    InvalidInput { path: PathBuf },
    #[error("Tasks file is empty: {0}")]
    Empty(PathBuf),
    #[error("Malformed task header on line {line}: {text}")]
    MalformedHeader { line: usize, text: String },
}

fn loose_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^##\s*\[\s*TASK").expect("regex"))
}

fn field_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\*\*([^*]+)\*\*:").expect("regex"))
}

/// Read a task store. Missing, unreadable, non-text, blank, or
/// malformed-header files are errors.
pub fn load_store(path: &Path) -> Result<String, StoreError> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8(bytes).map_err(|_| StoreError::InvalidInput {
        path: path.to_path_buf(),
    })?;
    if content.trim().is_empty() {
        return Err(StoreError::Empty(path.to_path_buf()));
    }
    check_headers(&content)?;
    debug!(path = %path.display(), bytes = content.len(), "loaded task store");
    Ok(content)
}

pub fn load_tasks_from_file(path: &Path) -> Result<Vec<Task>, StoreError> {
    let content = load_store(path)?;
    Ok(parse_tasks(&content))
}

/// Reject lines that look like task headers but do not follow
/// `## [TASK-NNN] <title>`.
pub fn check_headers(content: &str) -> Result<(), StoreError> {
    let valid_starts: Vec<usize> = find_task_headers(content)
        .iter()
        .map(|header| header.start)
        .collect();
    let mut offset = 0;
    for (idx, line) in content.split('\n').enumerate() {
        if loose_header_regex().is_match(line) && !valid_starts.contains(&offset) {
            return Err(StoreError::MalformedHeader {
                line: idx + 1,
                text: line.trim_end().to_string(),
            });
        }
        offset += line.len() + 1;
    }
    Ok(())
}

pub fn write_store(path: &Path, content: &str) -> Result<(), StoreError> {
    fs::write(path, content).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "rewrote task store");
    Ok(())
}

/// Text before the first task header, or `None` when there is none.
pub fn preamble(content: &str) -> Option<String> {
    let end = find_task_headers(content)
        .first()
        .map(|header| header.start)
        .unwrap_or(content.len());
    let text = content[..end].trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// The section of one task: its header line through the end of its block,
/// stopping before the `---` separator.
pub fn extract_task_section(content: &str, task_id: &str) -> Option<String> {
    let headers = find_task_headers(content);
    let idx = headers.iter().position(|header| header.id == task_id)?;
    let start = headers[idx].start;
    let end = headers
        .get(idx + 1)
        .map(|next| next.start)
        .unwrap_or(content.len());
    let section = &content[start..end];

    let mut cut = section.len();
    let mut offset = 0;
    for line in section.split('\n') {
        if offset > 0 && is_dash_line(line) {
            cut = offset;
            break;
        }
        offset += line.len() + 1;
    }
    Some(section[..cut].trim_end().to_string())
}

fn is_dash_line(line: &str) -> bool {
    let stripped = line.trim();
    !stripped.is_empty() && stripped.chars().all(|c| c == '-') && stripped.len() >= 3
}

fn field_label(line: &str) -> Option<&str> {
    field_label_regex()
        .captures(line)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
}

/// A labelled line of a raw block, with its continuation lines.
#[derive(Debug)]
struct ScannedField {
    label: String,
    lines: Vec<String>,
}

/// What a raw block contains beyond the values the parser resolves.
#[derive(Debug, Default)]
struct BlockScan {
    fields: Vec<ScannedField>,
    description: Option<String>,
    trailing: Vec<String>,
}

impl BlockScan {
    fn has_label(&self, label: &str) -> bool {
        self.fields.iter().any(|field| field.label == label)
    }
}

fn scan_block(block: &str) -> BlockScan {
    let lines: Vec<&str> = block.lines().collect();
    let mut scan = BlockScan::default();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() || is_dash_line(line) {
            if line.trim().is_empty() && !scan.trailing.is_empty() {
                scan.trailing.push(String::new());
            }
            i += 1;
            continue;
        }
        let Some(label) = field_label(line) else {
            scan.trailing.push(line.trim_end().to_string());
            i += 1;
            continue;
        };

        let start = i;
        i += 1;
        if label == "Description" {
            while i < lines.len() && !is_dash_line(lines[i]) && field_label(lines[i]).is_none() {
                i += 1;
            }
            let first = line.split_once(':').map(|(_, rest)| rest).unwrap_or("");
            let mut text = first.trim().to_string();
            for next in &lines[start + 1..i] {
                text.push('\n');
                text.push_str(next.trim_end());
            }
            let text = text.trim().to_string();
            if !text.is_empty() && scan.description.is_none() {
                scan.description = Some(text);
            }
        } else {
            while i < lines.len()
                && !lines[i].trim().is_empty()
                && !is_dash_line(lines[i])
                && field_label(lines[i]).is_none()
            {
                i += 1;
            }
        }
        scan.fields.push(ScannedField {
            label: label.to_string(),
            lines: lines[start..i].iter().map(|l| l.trim_end().to_string()).collect(),
        });
    }
    while scan.trailing.last().map(|l| l.is_empty()).unwrap_or(false) {
        scan.trailing.pop();
    }
    scan
}

fn id_list(ids: &[String]) -> String {
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}

/// The rendered line for a known field other than Description, or `None`
/// when the field should be left out.
fn known_field_line(task: &Task, scan: &BlockScan, label: &str) -> Option<String> {
    let in_block = scan.has_label(label);
    let text = |value: Option<&str>| match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => Some(value.to_string()),
        None => in_block.then(|| PRESERVED.to_string()),
    };
    let value = match label {
        "Status" => Some(task.status.to_string()),
        "Priority" => Some(task.priority.to_string()),
        "Category" => Some(task.category.to_string()),
        "Depends On" => Some(id_list(&task.depends_on)),
        "Related" => (in_block || !task.related.is_empty()).then(|| id_list(&task.related)),
        "Epic" => text(task.epic.as_deref()),
        "Origin" => text(task.origin.as_deref()),
        "Created" => text(task.created.as_deref()),
        _ => None,
    }?;
    Some(format!("**{}**: {}", label, value))
}

fn push_description(lines: &mut Vec<String>, task: &Task, scan: &BlockScan) {
    let description = scan
        .description
        .clone()
        .or_else(|| task.description.clone())
        .or_else(|| scan.has_label("Description").then(|| PRESERVED.to_string()));
    if let Some(description) = description {
        lines.push(String::new());
        lines.push("**Description**:".to_string());
        lines.push(description);
    }
}

/// Render one task record.
///
/// Labelled lines keep the order and presence they had in the original block.
/// Status, priority, and dependencies are substituted from the record. Other
/// known fields come from the record when it resolved a value and otherwise
/// from the block; a field the block names but neither source can resolve is
/// written as `(preserved)`. Known fields the block lacks are added before the
/// description when the record needs them. Unknown fields and free content
/// are carried through verbatim.
pub fn render_task(task: &Task) -> String {
    let scan = scan_block(&task.block);
    let mut lines = vec![format!("## [{}] {}", task.id, task.title)];
    let missing: Vec<&str> = KNOWN_FIELDS
        .iter()
        .copied()
        .filter(|label| *label != "Description" && !scan.has_label(label))
        .collect();

    let mut emitted: Vec<&str> = Vec::new();
    let mut missing_added = false;
    for field in &scan.fields {
        let label = field.label.as_str();
        if !KNOWN_FIELDS.contains(&label) {
            lines.extend(field.lines.iter().cloned());
            continue;
        }
        if emitted.contains(&label) {
            continue;
        }
        emitted.push(label);
        if label == "Description" {
            lines.extend(missing.iter().filter_map(|l| known_field_line(task, &scan, l)));
            missing_added = true;
            push_description(&mut lines, task, &scan);
        } else if let Some(line) = known_field_line(task, &scan, label) {
            lines.push(line);
        }
    }
    if !missing_added {
        lines.extend(missing.iter().filter_map(|l| known_field_line(task, &scan, l)));
    }
    if !emitted.contains(&"Description") {
        push_description(&mut lines, task, &scan);
    }

    if !scan.trailing.is_empty() {
        lines.push(String::new());
        lines.extend(scan.trailing.iter().cloned());
    }
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(String::new());
    lines.join("\n")
}

/// Render a whole store document: the preamble followed by every task in order.
pub fn render_store(preamble: Option<&str>, tasks: &[Task]) -> String {
    let mut out = String::new();
    out.push_str(preamble.unwrap_or(DEFAULT_PREAMBLE).trim_end());
    out.push_str("\n\n");
    let blocks: Vec<String> = tasks.iter().map(render_task).collect();
    out.push_str(&blocks.join("\n"));
    out
}
