use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::task::Category;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Thresholds and scores used by the matcher and the inference engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Multiplier applied when the query phrase appears verbatim in a task.
    pub similarity_boost_multiplier: f64,
    /// Matches scoring at or below this are dropped.
    pub similarity_threshold: f64,
    pub top_n_matches: usize,

    pub explicit_epic_confidence: f64,
    pub task_match_epic_boost: f64,
    pub keyword_epic_boost: f64,
    /// Number of top matches consulted for epic inference.
    pub epic_match_window: usize,

    pub critical_task_priority_threshold: f64,
    pub high_confidence_match_threshold: f64,

    pub related_match_threshold: f64,
    pub related_match_window: usize,

    pub confidence_no_dependencies: f64,
    pub confidence_explicit_task_ref: f64,
    pub confidence_explicit_phrase: f64,
    pub confidence_temporal_hint: f64,
    pub confidence_semantic_dependency: f64,
    pub confidence_epic_not_found: f64,
    pub confidence_epic_semantic: f64,
    pub confidence_explicit_priority: f64,
    pub confidence_default_priority: f64,
    pub confidence_category: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            similarity_boost_multiplier: 1.3,
            similarity_threshold: 0.2,
            top_n_matches: 5,
            explicit_epic_confidence: 0.95,
            task_match_epic_boost: 0.6,
            keyword_epic_boost: 0.4,
            epic_match_window: 3,
            critical_task_priority_threshold: 0.7,
            high_confidence_match_threshold: 0.75,
            related_match_threshold: 0.5,
            related_match_window: 3,
            confidence_no_dependencies: 1.0,
            confidence_explicit_task_ref: 0.95,
            confidence_explicit_phrase: 0.95,
            confidence_temporal_hint: 0.90,
            confidence_semantic_dependency: 0.75,
            confidence_epic_not_found: 0.5,
            confidence_epic_semantic: 0.80,
            confidence_explicit_priority: 0.99,
            confidence_default_priority: 0.60,
            confidence_category: 0.65,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit_values = [
            ("similarity_threshold", self.similarity_threshold),
            ("explicit_epic_confidence", self.explicit_epic_confidence),
            ("task_match_epic_boost", self.task_match_epic_boost),
            ("keyword_epic_boost", self.keyword_epic_boost),
            (
                "critical_task_priority_threshold",
                self.critical_task_priority_threshold,
            ),
            (
                "high_confidence_match_threshold",
                self.high_confidence_match_threshold,
            ),
            ("related_match_threshold", self.related_match_threshold),
            ("confidence_no_dependencies", self.confidence_no_dependencies),
            (
                "confidence_explicit_task_ref",
                self.confidence_explicit_task_ref,
            ),
            ("confidence_explicit_phrase", self.confidence_explicit_phrase),
            ("confidence_temporal_hint", self.confidence_temporal_hint),
            (
                "confidence_semantic_dependency",
                self.confidence_semantic_dependency,
            ),
            ("confidence_epic_not_found", self.confidence_epic_not_found),
            ("confidence_epic_semantic", self.confidence_epic_semantic),
            (
                "confidence_explicit_priority",
                self.confidence_explicit_priority,
            ),
            (
                "confidence_default_priority",
                self.confidence_default_priority,
            ),
            ("confidence_category", self.confidence_category),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }
        if self.similarity_boost_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "similarity_boost_multiplier must be >= 1.0, got {}",
                self.similarity_boost_multiplier
            )));
        }
        if self.top_n_matches == 0 {
            return Err(ConfigError::Invalid(
                "top_n_matches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub const DEFAULT_STOPWORDS: [&str; 87] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "we", "this", "that", "is", "be", "have", "do", "should", "could", "would",
    "need", "after", "before", "then", "during", "when", "where", "what", "which", "who", "how",
    "it", "its", "was", "were", "been", "being", "am", "are", "has", "had", "having", "does",
    "did", "doing", "will", "shall", "can", "may", "might", "must", "not", "no", "as", "if", "so",
    "too", "also", "only", "just", "very", "get", "got", "make", "made", "more", "most", "some",
    "such", "these", "those", "all", "each", "every", "both", "either", "neither", "any", "many",
    "much", "few",
];

pub const DEFAULT_BUG_WORDS: [&str; 7] =
    ["fix", "bug", "issue", "error", "broken", "crash", "failure"];
pub const DEFAULT_FEATURE_WORDS: [&str; 6] =
    ["add", "implement", "new", "support", "enable", "feature"];
pub const DEFAULT_REFACTOR_WORDS: [&str; 6] = [
    "refactor",
    "refine",
    "improve",
    "clean",
    "optimize",
    "reorganize",
];
pub const DEFAULT_DOCS_WORDS: [&str; 5] = ["docs", "document", "guide", "readme", "documentation"];
pub const DEFAULT_RESEARCH_WORDS: [&str; 6] = [
    "research",
    "evaluate",
    "analyze",
    "test",
    "explore",
    "investigate",
];

/// Word lists consulted by keyword extraction and category detection.
///
/// Category vocabularies are tested in order; the first one with a hit wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    pub stopwords: HashSet<String>,
    pub categories: Vec<(Category, Vec<String>)>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            categories: vec![
                (Category::Bug, to_strings(&DEFAULT_BUG_WORDS)),
                (Category::Feature, to_strings(&DEFAULT_FEATURE_WORDS)),
                (Category::Refactor, to_strings(&DEFAULT_REFACTOR_WORDS)),
                (Category::Docs, to_strings(&DEFAULT_DOCS_WORDS)),
                (Category::Research, to_strings(&DEFAULT_RESEARCH_WORDS)),
            ],
        }
    }
}

impl Vocabulary {
    pub fn new(stopwords: &[&str], categories: Vec<(Category, Vec<String>)>) -> Self {
        Self {
            stopwords: stopwords.iter().map(|s| s.to_lowercase()).collect(),
            categories,
        }
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    fn apply(mut self, overrides: &VocabularyConfig) -> Self {
        if let Some(stopwords) = &overrides.stopwords {
            self.stopwords = stopwords.iter().map(|s| s.trim().to_lowercase()).collect();
        }
        if let Some(extra) = &overrides.extra_stopwords {
            self.stopwords
                .extend(extra.iter().map(|s| s.trim().to_lowercase()));
        }
        let replacements = [
            (Category::Bug, &overrides.bug),
            (Category::Feature, &overrides.feature),
            (Category::Refactor, &overrides.refactor),
            (Category::Docs, &overrides.docs),
            (Category::Research, &overrides.research),
        ];
        for (category, words) in replacements {
            let Some(words) = words else {
                continue;
            };
            let words: Vec<String> = words.iter().map(|w| w.trim().to_lowercase()).collect();
            if let Some(entry) = self.categories.iter_mut().find(|(c, _)| *c == category) {
                entry.1 = words;
            }
        }
        self
    }
}

/// `[vocabulary]` table of the config file. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabularyConfig {
    pub stopwords: Option<Vec<String>>,
    pub extra_stopwords: Option<Vec<String>>,
    pub bug: Option<Vec<String>>,
    pub feature: Option<Vec<String>>,
    pub refactor: Option<Vec<String>>,
    pub docs: Option<Vec<String>>,
    pub research: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasklensConfig {
    /// Default task store used when a command is given no `--file`.
    pub tasks_file: Option<String>,
    pub analyzer: Option<AnalyzerConfig>,
    pub vocabulary: Option<VocabularyConfig>,
    /// Directory of the file this config was read from.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl TasklensConfig {
    pub fn analyzer_config(&self) -> Result<AnalyzerConfig, ConfigError> {
        let config = self.analyzer.clone().unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn vocabulary(&self) -> Vocabulary {
        match &self.vocabulary {
            Some(overrides) => Vocabulary::default().apply(overrides),
            None => Vocabulary::default(),
        }
    }

    pub fn tasks_file_path(&self) -> Option<PathBuf> {
        self.tasks_file
            .as_deref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(expand_home)
            .map(|path| match &self.base_dir {
                Some(base) if path.is_relative() => base.join(path),
                _ => path,
            })
    }
}

pub fn config_filename_candidates() -> [&'static str; 2] {
    [".tasklens.toml", ".tasklensrc"]
}

/// A non-blank path from the environment.
fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn resolve_user_home_dir() -> Option<PathBuf> {
    env_path("HOME").or_else(|| env_path("USERPROFILE"))
}

/// `TASKLENS_HOME`, or `~/.tasklens`.
pub fn resolve_tasklens_home_dir() -> Option<PathBuf> {
    env_path("TASKLENS_HOME").or_else(|| resolve_user_home_dir().map(|home| home.join(".tasklens")))
}

pub fn global_config_path() -> Option<PathBuf> {
    resolve_tasklens_home_dir().map(|home| home.join("config.toml"))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = resolve_user_home_dir() {
            return home;
        }
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = resolve_user_home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Nearest directory at or above `start` holding a project config file.
pub fn find_config_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|dir| {
            config_filename_candidates()
                .iter()
                .any(|name| dir.join(name).is_file())
        })
        .map(Path::to_path_buf)
}

pub fn read_config_file(path: &Path) -> Result<TasklensConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    let mut config = toml::from_str::<TasklensConfig>(&text)?;
    config.base_dir = path.parent().map(Path::to_path_buf);
    Ok(config)
}

pub fn load_config(repo_root: &Path) -> Result<Option<TasklensConfig>, ConfigError> {
    for name in config_filename_candidates() {
        let path = repo_root.join(name);
        if path.is_file() {
            debug!(path = %path.display(), "loading project config");
            return read_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

pub fn load_global_config() -> Result<Option<TasklensConfig>, ConfigError> {
    let Some(path) = global_config_path() else {
        return Ok(None);
    };
    if !path.is_file() {
        return Ok(None);
    }
    debug!(path = %path.display(), "loading global config");
    read_config_file(&path).map(Some)
}

/// Resolve configuration: explicit file, then project file found from `start`,
/// then the global file, then defaults.
pub fn resolve_config(
    explicit: Option<&Path>,
    start: &Path,
) -> Result<(TasklensConfig, &'static str), ConfigError> {
    if let Some(path) = explicit {
        return Ok((read_config_file(path)?, "explicit"));
    }
    if let Some(root) = find_config_root(start) {
        if let Some(config) = load_config(&root)? {
            return Ok((config, "project"));
        }
    }
    if let Some(config) = load_global_config()? {
        return Ok((config, "global"));
    }
    Ok((TasklensConfig::default(), "default"))
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}
