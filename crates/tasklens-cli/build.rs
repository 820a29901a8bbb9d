use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    Some(text.trim().to_string())
}

fn emit(key: &str, value: &str) {
    println!("cargo:rustc-env=TASKLENS_GIT_{}={}", key, value);
}

fn main() {
    // Git metadata lives at the repository root, not next to this manifest.
    match git(&["rev-parse", "--absolute-git-dir"]) {
        Some(git_dir) => {
            println!("cargo:rerun-if-changed={}/HEAD", git_dir);
            println!("cargo:rerun-if-changed={}/index", git_dir);
        }
        None => println!("cargo:rerun-if-changed=build.rs"),
    }

    let sha = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "nogit".to_string());
    let count = git(&["rev-list", "--count", "HEAD"]).unwrap_or_else(|| "0".to_string());
    let dirty = match git(&["status", "--porcelain", "--untracked-files=no"]) {
        Some(status) if !status.is_empty() => ".dirty",
        _ => "",
    };

    emit("SHA", &sha);
    emit("COUNT", &count);
    emit("DIRTY", dirty);
}
