use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::store::{preamble, render_store};
use crate::task::{parse_tasks, Task, TaskStatus};

#[derive(Debug, Copy, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    OrphanedDependency,
    CircularDependency,
    StatusConflict,
    PriorityInversion,
    EmptyEpic,
}

#[derive(Debug, Copy, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    pub task_id: Option<String>,
    pub description: String,
    pub related_tasks: Vec<String>,
    pub auto_fixable: bool,
    pub suggested_fix: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct SanitizeReport {
    pub total_tasks: usize,
    pub total_issues: usize,
    pub issues: Vec<ValidationIssue>,
    pub critical_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
}

impl SanitizeReport {
    fn from_issues(total_tasks: usize, issues: Vec<ValidationIssue>) -> Self {
        let count = |severity: Severity| issues.iter().filter(|i| i.severity == severity).count();
        SanitizeReport {
            total_tasks,
            total_issues: issues.len(),
            critical_count: count(Severity::Critical),
            warning_count: count(Severity::Warning),
            info_count: count(Severity::Info),
            issues,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DependencyFixChange {
    pub task_id: String,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct DependencyFixReport {
    pub detected: usize,
    pub fixed: usize,
    pub changes: Vec<DependencyFixChange>,
}

/// Validates the dependency graph of a task store and repairs what it safely can.
#[derive(Debug, Clone)]
pub struct DependencySanitizer {
    tasks: Vec<Task>,
    preamble: Option<String>,
    declared_epics: Vec<String>,
    issues: Vec<ValidationIssue>,
}

impl DependencySanitizer {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            preamble: None,
            declared_epics: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// Parse a store document, keeping its preamble for the rewrite.
    pub fn from_content(content: &str) -> Self {
        let mut sanitizer = Self::new(parse_tasks(content));
        sanitizer.preamble = preamble(content);
        sanitizer
    }

    /// Epics known to exist even when no task carries them.
    pub fn with_declared_epics(mut self, epics: Vec<String>) -> Self {
        self.declared_epics = epics;
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Run every check and return the report. Issues are kept for
    /// [`DependencySanitizer::fix_auto_fixable`].
    pub fn sanitize(&mut self) -> SanitizeReport {
        let graph = DependencyGraph::build(&self.tasks);
        let mut issues = Vec::new();
        issues.extend(self.orphaned_dependencies(&graph));
        issues.extend(self.circular_dependencies(&graph));
        issues.extend(self.status_conflicts(&graph));
        issues.extend(self.priority_inversions(&graph));
        issues.extend(self.empty_epics());

        let report = SanitizeReport::from_issues(self.tasks.len(), issues);
        info!(
            tasks = report.total_tasks,
            issues = report.total_issues,
            critical = report.critical_count,
            warnings = report.warning_count,
            "dependency sanitization finished"
        );
        self.issues = report.issues.clone();
        report
    }

    /// Remove every dependency flagged by an auto-fixable issue from the last
    /// [`DependencySanitizer::sanitize`] run.
    pub fn fix_auto_fixable(&mut self) -> DependencyFixReport {
        let mut report = DependencyFixReport::default();
        let mut removed_by_task: Vec<(String, Vec<String>)> = Vec::new();

        for issue in self.issues.iter().filter(|issue| issue.auto_fixable) {
            if issue.kind != IssueKind::OrphanedDependency {
                continue;
            }
            let (Some(task_id), Some(dep_id)) = (issue.task_id.as_ref(), issue.related_tasks.first())
            else {
                continue;
            };
            report.detected += 1;

            let mut removed = false;
            for task in self.tasks.iter_mut().filter(|task| &task.id == task_id) {
                let before = task.depends_on.len();
                task.depends_on.retain(|dep| dep != dep_id);
                removed |= task.depends_on.len() != before;
            }
            if !removed {
                continue;
            }
            report.fixed += 1;
            debug!(task = %task_id, dependency = %dep_id, "removed orphaned dependency");
            match removed_by_task.iter_mut().find(|(id, _)| id == task_id) {
                Some((_, deps)) => deps.push(dep_id.clone()),
                None => removed_by_task.push((task_id.clone(), vec![dep_id.clone()])),
            }
        }

        report.changes = removed_by_task
            .into_iter()
            .map(|(task_id, removed)| DependencyFixChange { task_id, removed })
            .collect();
        info!(fixed = report.fixed, "applied automatic dependency fixes");
        report
    }

    /// The store document rebuilt from the current task records.
    pub fn render_store(&self) -> String {
        render_store(self.preamble.as_deref(), &self.tasks)
    }

    fn orphaned_dependencies(&self, graph: &DependencyGraph) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for task in &self.tasks {
            for dep in &task.depends_on {
                if graph.contains(dep) {
                    continue;
                }
                issues.push(ValidationIssue {
                    kind: IssueKind::OrphanedDependency,
                    severity: Severity::Critical,
                    task_id: Some(task.id.clone()),
                    description: format!("{} depends on {} (deleted/non-existent)", task.id, dep),
                    related_tasks: vec![dep.clone()],
                    auto_fixable: true,
                    suggested_fix: format!("Remove {} from {}'s Depends On", dep, task.id),
                });
            }
        }
        issues
    }

    fn circular_dependencies(&self, graph: &DependencyGraph) -> Vec<ValidationIssue> {
        graph
            .cycles(&self.tasks)
            .into_iter()
            .map(|cycle| ValidationIssue {
                kind: IssueKind::CircularDependency,
                severity: Severity::Critical,
                task_id: cycle.first().cloned(),
                description: format!("Circular dependency detected: {}", cycle.join(" → ")),
                related_tasks: cycle,
                auto_fixable: false,
                suggested_fix: "Manual review - choose which relationship to remove".to_string(),
            })
            .collect()
    }

    fn status_conflicts(&self, graph: &DependencyGraph) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for task in &self.tasks {
            if task.status != TaskStatus::Completed {
                continue;
            }
            for other in graph.dependents(&self.tasks, &task.id) {
                if !other.status.is_open() {
                    continue;
                }
                issues.push(ValidationIssue {
                    kind: IssueKind::StatusConflict,
                    severity: Severity::Warning,
                    task_id: Some(other.id.clone()),
                    description: format!(
                        "{} ({}) blocked by {} (completed)",
                        other.id, other.status, task.id
                    ),
                    related_tasks: vec![task.id.clone()],
                    auto_fixable: false,
                    suggested_fix: "Consider if this dependency is still needed".to_string(),
                });
            }
        }
        issues
    }

    fn priority_inversions(&self, graph: &DependencyGraph) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for task in &self.tasks {
            for other in graph.dependents(&self.tasks, &task.id) {
                if task.priority.rank() >= other.priority.rank() {
                    continue;
                }
                issues.push(ValidationIssue {
                    kind: IssueKind::PriorityInversion,
                    severity: Severity::Warning,
                    task_id: Some(other.id.clone()),
                    description: format!(
                        "{} (priority: {}) blocked by {} (priority: {})",
                        other.id, other.priority, task.id, task.priority
                    ),
                    related_tasks: vec![task.id.clone()],
                    auto_fixable: false,
                    suggested_fix: "Consider re-prioritizing tasks".to_string(),
                });
            }
        }
        issues
    }

    fn empty_epics(&self) -> Vec<ValidationIssue> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for task in &self.tasks {
            let Some(epic) = task.epic.as_deref() else {
                continue;
            };
            match counts.iter_mut().find(|(name, _)| *name == epic) {
                Some((_, count)) => *count += 1,
                None => counts.push((epic, 1)),
            }
        }
        for epic in &self.declared_epics {
            if !counts.iter().any(|(name, _)| *name == epic.as_str()) {
                counts.push((epic.as_str(), 0));
            }
        }

        counts
            .into_iter()
            .filter(|(_, count)| *count == 0)
            .map(|(epic, _)| ValidationIssue {
                kind: IssueKind::EmptyEpic,
                severity: Severity::Info,
                task_id: None,
                description: format!("Epic '{}' has no tasks", epic),
                related_tasks: Vec::new(),
                auto_fixable: false,
                suggested_fix: "Delete empty epic or add tasks".to_string(),
            })
            .collect()
    }
}

/// Task-id lookups plus the reverse "who depends on me" index, built once per run.
#[derive(Debug, Default)]
struct DependencyGraph {
    position: HashMap<String, usize>,
    dependents: HashMap<String, Vec<usize>>,
}

impl DependencyGraph {
    fn build(tasks: &[Task]) -> Self {
        let mut graph = DependencyGraph::default();
        for (idx, task) in tasks.iter().enumerate() {
            graph.position.entry(task.id.clone()).or_insert(idx);
        }
        for (idx, task) in tasks.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in &task.depends_on {
                if !seen.insert(dep.as_str()) {
                    continue;
                }
                graph.dependents.entry(dep.clone()).or_default().push(idx);
            }
        }
        graph
    }

    fn get<'t>(&self, tasks: &'t [Task], id: &str) -> Option<&'t Task> {
        self.position.get(id).map(|idx| &tasks[*idx])
    }

    /// Any record carries this id, whatever its status.
    fn contains(&self, id: &str) -> bool {
        self.position.contains_key(id)
    }

    fn dependents<'t>(&'t self, tasks: &'t [Task], id: &str) -> impl Iterator<Item = &'t Task> + 't {
        self.dependents
            .get(id)
            .into_iter()
            .flatten()
            .map(move |idx| &tasks[*idx])
    }

    /// Every back edge found by a depth-first walk in task order, reported as
    /// the closed path `[a, b, ..., a]`.
    fn cycles(&self, tasks: &[Task]) -> Vec<Vec<String>> {
        let mut walk = CycleWalk {
            graph: self,
            tasks,
            visited: HashSet::new(),
            stack: Vec::new(),
            cycles: Vec::new(),
        };
        for task in tasks {
            if !walk.visited.contains(task.id.as_str()) {
                walk.visit(&task.id);
            }
        }
        walk.cycles
    }
}

struct CycleWalk<'g> {
    graph: &'g DependencyGraph,
    tasks: &'g [Task],
    visited: HashSet<&'g str>,
    stack: Vec<&'g str>,
    cycles: Vec<Vec<String>>,
}

impl<'g> CycleWalk<'g> {
    fn visit(&mut self, node: &'g str) {
        self.visited.insert(node);
        self.stack.push(node);

        let neighbors: &'g [String] = self
            .graph
            .get(self.tasks, node)
            .map(|task| task.depends_on.as_slice())
            .unwrap_or(&[]);
        for neighbor in neighbors {
            let neighbor = neighbor.as_str();
            if let Some(idx) = self.stack.iter().position(|entry| *entry == neighbor) {
                let mut cycle: Vec<String> =
                    self.stack[idx..].iter().map(|id| id.to_string()).collect();
                cycle.push(neighbor.to_string());
                self.cycles.push(cycle);
            } else if !self.visited.contains(neighbor) {
                self.visit(neighbor);
            }
        }

        self.stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;

    fn task(id: &str, depends_on: &[&str]) -> Task {
        let mut task = Task::new(id, &format!("Task {}", id));
        task.depends_on = depends_on.iter().map(|d| d.to_string()).collect();
        task
    }

    fn kinds(report: &SanitizeReport) -> Vec<IssueKind> {
        report.issues.iter().map(|issue| issue.kind).collect()
    }

    #[test]
    fn clean_graph_has_no_issues() {
        let mut sanitizer = DependencySanitizer::new(vec![
            task("TASK-001", &[]),
            task("TASK-002", &["TASK-001"]),
            task("TASK-003", &["TASK-001", "TASK-002"]),
        ]);
        let report = sanitizer.sanitize();
        assert_eq!(report.total_tasks, 3);
        assert_eq!(report.total_issues, 0);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn three_task_cycle_is_reported_once_in_order() {
        let mut sanitizer = DependencySanitizer::new(vec![
            task("TASK-001", &["TASK-002"]),
            task("TASK-002", &["TASK-003"]),
            task("TASK-003", &["TASK-001"]),
        ]);
        let report = sanitizer.sanitize();
        assert_eq!(kinds(&report), vec![IssueKind::CircularDependency]);
        let issue = &report.issues[0];
        assert_eq!(
            issue.related_tasks,
            vec!["TASK-001", "TASK-002", "TASK-003", "TASK-001"]
        );
        assert_eq!(issue.task_id.as_deref(), Some("TASK-001"));
        assert_eq!(
            issue.description,
            "Circular dependency detected: TASK-001 → TASK-002 → TASK-003 → TASK-001"
        );
        assert_eq!(report.critical_count, 1);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut sanitizer = DependencySanitizer::new(vec![task("TASK-001", &["TASK-001"])]);
        let report = sanitizer.sanitize();
        assert_eq!(report.issues[0].related_tasks, vec!["TASK-001", "TASK-001"]);
    }

    #[test]
    fn missing_targets_are_fixable_orphans() {
        let mut sanitizer = DependencySanitizer::new(vec![
            task("TASK-001", &["TASK-098", "TASK-099"]),
            task("TASK-002", &[]),
        ]);
        let report = sanitizer.sanitize();
        assert_eq!(
            kinds(&report),
            vec![IssueKind::OrphanedDependency, IssueKind::OrphanedDependency]
        );
        assert!(report.issues.iter().all(|issue| issue.auto_fixable));
        assert_eq!(
            report.issues[1].description,
            "TASK-001 depends on TASK-099 (deleted/non-existent)"
        );

        let fixes = sanitizer.fix_auto_fixable();
        assert_eq!(fixes.fixed, 2);
        assert_eq!(
            fixes.changes,
            vec![DependencyFixChange {
                task_id: "TASK-001".to_string(),
                removed: vec!["TASK-098".to_string(), "TASK-099".to_string()],
            }]
        );
        assert!(sanitizer.tasks()[0].depends_on.is_empty());
        assert_eq!(sanitizer.sanitize().total_issues, 0);
    }

    #[test]
    fn dependency_on_deleted_task_is_kept() {
        let mut deleted = task("TASK-002", &[]);
        deleted.status = TaskStatus::Deleted;
        let mut sanitizer =
            DependencySanitizer::new(vec![task("TASK-001", &["TASK-002"]), deleted]);
        let report = sanitizer.sanitize();
        assert!(!kinds(&report).contains(&IssueKind::OrphanedDependency));

        let fixes = sanitizer.fix_auto_fixable();
        assert_eq!(fixes.fixed, 0);
        assert_eq!(sanitizer.tasks()[0].depends_on, vec!["TASK-002"]);
    }

    #[test]
    fn disjoint_cycles_are_each_reported_once() {
        let mut sanitizer = DependencySanitizer::new(vec![
            task("TASK-001", &["TASK-002"]),
            task("TASK-002", &["TASK-001", "TASK-006"]),
            task("TASK-003", &["TASK-004"]),
            task("TASK-004", &["TASK-006", "TASK-003"]),
            task("TASK-005", &["TASK-001", "TASK-003"]),
            task("TASK-006", &["TASK-007"]),
            task("TASK-007", &[]),
        ]);
        let report = sanitizer.sanitize();
        assert_eq!(
            kinds(&report),
            vec![IssueKind::CircularDependency, IssueKind::CircularDependency]
        );
        assert_eq!(
            report.issues[0].related_tasks,
            vec!["TASK-001", "TASK-002", "TASK-001"]
        );
        assert_eq!(
            report.issues[1].related_tasks,
            vec!["TASK-003", "TASK-004", "TASK-003"]
        );
        assert_eq!(report.critical_count, 2);
    }

    #[test]
    fn completed_blocker_of_open_task_is_a_status_conflict() {
        let mut done = task("TASK-001", &[]);
        done.status = TaskStatus::Completed;
        let mut blocked = task("TASK-003", &["TASK-001"]);
        blocked.status = TaskStatus::Blocked;
        let mut sanitizer =
            DependencySanitizer::new(vec![done, task("TASK-002", &["TASK-001"]), blocked]);
        let report = sanitizer.sanitize();
        assert_eq!(kinds(&report), vec![IssueKind::StatusConflict]);
        assert_eq!(
            report.issues[0].description,
            "TASK-002 (pending) blocked by TASK-001 (completed)"
        );
        assert_eq!(report.warning_count, 1);
    }

    #[test]
    fn low_priority_blocker_is_an_inversion() {
        let mut blocker = task("TASK-001", &[]);
        blocker.priority = Priority::Low;
        let mut dependent = task("TASK-002", &["TASK-001"]);
        dependent.priority = Priority::Critical;
        let mut sanitizer = DependencySanitizer::new(vec![blocker, dependent]);
        let report = sanitizer.sanitize();
        assert_eq!(kinds(&report), vec![IssueKind::PriorityInversion]);
        assert_eq!(
            report.issues[0].description,
            "TASK-002 (priority: critical) blocked by TASK-001 (priority: low)"
        );
    }

    #[test]
    fn declared_epic_without_tasks_is_info() {
        let mut member = task("TASK-001", &[]);
        member.epic = Some("Auth".to_string());
        let mut sanitizer = DependencySanitizer::new(vec![member])
            .with_declared_epics(vec!["Auth".to_string(), "Billing".to_string()]);
        let report = sanitizer.sanitize();
        assert_eq!(kinds(&report), vec![IssueKind::EmptyEpic]);
        assert_eq!(report.issues[0].description, "Epic 'Billing' has no tasks");
        assert_eq!(report.issues[0].task_id, None);
        assert_eq!(report.info_count, 1);
    }

    #[test]
    fn issues_serialize_with_wire_names() {
        let mut sanitizer = DependencySanitizer::new(vec![task("TASK-001", &["TASK-404"])]);
        let report = sanitizer.sanitize();
        let value = serde_json::to_value(&report.issues[0]).expect("json");
        assert_eq!(value["type"], "orphaned_dependency");
        assert_eq!(value["severity"], "critical");
        assert_eq!(value["related_tasks"][0], "TASK-404");
    }
}
