//! Core of tasklens: parses markdown task stores, infers metadata for new
//! task descriptions, and keeps the dependency graph of a store healthy.

pub mod analyzer;
pub mod config;
pub mod hints;
pub mod keywords;
pub mod matcher;
pub mod sanitize;
pub mod search;
pub mod store;
pub mod task;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::version;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
