use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporal {
    After,
    Before,
    Sequential,
}

impl Temporal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Temporal::After => "after",
            Temporal::Before => "before",
            Temporal::Sequential => "sequential",
        }
    }
}

/// Structured signals found in a free-text task description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Hints {
    pub blocker: bool,
    pub urgent: bool,
    pub followup: bool,
    pub temporal: Option<Temporal>,
    pub depends_on_phrase: bool,
    pub blocks_phrase: bool,
    pub unblocks_phrase: bool,
    pub related_to_phrase: bool,
    pub similar_to_phrase: bool,
    pub part_of_phrase: bool,
}

impl Hints {
    /// `[BLOCKER]` or `[URGENT]` was present.
    pub fn is_flagged(&self) -> bool {
        self.blocker || self.urgent
    }
}

struct HintPatterns {
    blocker: Regex,
    urgent: Regex,
    followup: Regex,
    after: Regex,
    before: Regex,
    then: Regex,
    depends_on: Regex,
    blocks: Regex,
    unblocks: Regex,
    related_to: Regex,
    similar_to: Regex,
    part_of: Regex,
    task_ref: Regex,
    issue_ref: Regex,
}

fn patterns() -> &'static HintPatterns {
    static PATTERNS: OnceLock<HintPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("regex");
        HintPatterns {
            blocker: re(r"(?i)\[BLOCKER\]"),
            urgent: re(r"(?i)\[URGENT\]"),
            followup: re(r"(?i)\[FOLLOW.?UP\]"),
            after: re(r"(?i)\bafter\s+(?:TASK-\d+|we|the|this|fixing|completing)"),
            before: re(r"(?i)\bbefore\s+(?:TASK-\d+|we|the|this|starting)"),
            then: re(r"(?i)\bthen\s+"),
            depends_on: re(r"(?i)depends\s+on"),
            blocks: re(r"(?i)blocks?\s+"),
            unblocks: re(r"(?i)unblocks?\s+"),
            related_to: re(r"(?i)related\s+to"),
            similar_to: re(r"(?i)similar\s+to"),
            part_of: re(r"(?i)part\s+of"),
            task_ref: re(r"TASK-(\d+)"),
            issue_ref: re(r"#(\d+)"),
        }
    })
}

pub fn parse_hints(text: &str) -> Hints {
    let p = patterns();
    let temporal = if p.after.is_match(text) {
        Some(Temporal::After)
    } else if p.before.is_match(text) {
        Some(Temporal::Before)
    } else if p.then.is_match(text) {
        Some(Temporal::Sequential)
    } else {
        None
    };
    Hints {
        blocker: p.blocker.is_match(text),
        urgent: p.urgent.is_match(text),
        followup: p.followup.is_match(text),
        temporal,
        depends_on_phrase: p.depends_on.is_match(text),
        blocks_phrase: p.blocks.is_match(text),
        unblocks_phrase: p.unblocks.is_match(text),
        related_to_phrase: p.related_to.is_match(text),
        similar_to_phrase: p.similar_to.is_match(text),
        part_of_phrase: p.part_of.is_match(text),
    }
}

/// Every `TASK-<digits>` reference, in order of appearance.
pub fn extract_task_references(text: &str) -> Vec<String> {
    patterns()
        .task_ref
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|digits| format!("TASK-{}", digits.as_str()))
        .collect()
}

/// Every `#<digits>` issue-tracker reference, passed through uninterpreted.
pub fn extract_issue_references(text: &str) -> Vec<String> {
    patterns()
        .issue_ref
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|digits| format!("#{}", digits.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_case_insensitive() {
        let hints = parse_hints("[blocker] auth is down [Follow-Up]");
        assert!(hints.blocker);
        assert!(!hints.urgent);
        assert!(hints.followup);
        assert!(hints.is_flagged());
    }

    #[test]
    fn temporal_prefers_after_over_then() {
        let hints = parse_hints("after TASK-015 ships, then update docs");
        assert_eq!(hints.temporal, Some(Temporal::After));

        let hints = parse_hints("before starting the migration");
        assert_eq!(hints.temporal, Some(Temporal::Before));

        let hints = parse_hints("write schema then seed data");
        assert_eq!(hints.temporal, Some(Temporal::Sequential));

        assert_eq!(parse_hints("after lunch").temporal, None);
    }

    #[test]
    fn relational_phrases() {
        let hints = parse_hints("Depends on the API; related to TASK-002, part of Billing");
        assert!(hints.depends_on_phrase);
        assert!(hints.related_to_phrase);
        assert!(hints.part_of_phrase);
        assert!(!hints.similar_to_phrase);

        let hints = parse_hints("this unblocks the release");
        assert!(hints.unblocks_phrase);
        assert!(hints.blocks_phrase);
    }

    #[test]
    fn references_are_extracted_in_order() {
        assert_eq!(
            extract_task_references("after TASK-015 and TASK-2, see #42 and #7"),
            vec!["TASK-015", "TASK-2"]
        );
        assert_eq!(
            extract_issue_references("after TASK-015 and TASK-2, see #42 and #7"),
            vec!["#42", "#7"]
        );
    }
}
