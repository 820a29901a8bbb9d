/// Crate version with build metadata, e.g. `0.2.0+git.42.1a2b3c4`.
/// Builds outside a git checkout report `+git.0.nogit`.
pub const FULL: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+git.",
    env!("TASKLENS_GIT_COUNT"),
    ".",
    env!("TASKLENS_GIT_SHA"),
    env!("TASKLENS_GIT_DIRTY")
);
