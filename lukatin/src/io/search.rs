//! Read-only workspace queries: `LS`, `Glob` and `Grep`.
//!
//! Each returns a JSON array of strings or an `Error: ...` line. Directory
//! walks skip hidden directories and `node_modules`. `Glob` and `Grep`
//! report paths relative to the search root, newest first.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::bytes::Regex;
use thiserror::Error;
use tokio::fs;
use tokio::task::JoinError;
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::core::listing::looks_binary;
use crate::core::pattern::{GlobPattern, PatternError};

#[derive(Debug, Error)]
enum SearchError {
    #[error("Error: {0}")]
    Invalid(String),
    #[error("Error: path does not exist: {}", .0.display())]
    Missing(PathBuf),
    #[error("Error: {0}")]
    Pattern(#[from] PatternError),
    #[error("Error: invalid regex {pattern:?}: {source}")]
    Regex {
        pattern: String,
        source: regex::Error,
    },
    #[error("Error reading directory {}: {source}", path.display())]
    ReadDir { path: PathBuf, source: io::Error },
    #[error("Error: search did not complete: {0}")]
    Join(#[from] JoinError),
    #[error("Error: encode results: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Entries of the directory at absolute `path`; directories end in `/`.
///
/// Names matching any of the `ignore` globs are left out.
#[instrument(skip_all, fields(path = %path))]
pub async fn list_directory(path: &str, ignore: &[String]) -> String {
    try_list_directory(path, ignore)
        .await
        .unwrap_or_else(|err| err.to_string())
}

/// Files under `path` (default: the working directory) matching `pattern`.
#[instrument(skip_all, fields(pattern = %pattern))]
pub async fn glob_files(pattern: &str, path: Option<&str>) -> String {
    try_glob_files(pattern, path)
        .await
        .unwrap_or_else(|err| err.to_string())
}

/// Files under `path` whose contents match the regex `pattern`, optionally
/// restricted to names matching the `include` glob.
#[instrument(skip_all, fields(pattern = %pattern))]
pub async fn grep_files(pattern: &str, include: Option<&str>, path: Option<&str>) -> String {
    try_grep_files(pattern, include, path)
        .await
        .unwrap_or_else(|err| err.to_string())
}

async fn try_list_directory(path: &str, ignore: &[String]) -> Result<String, SearchError> {
    let dir = PathBuf::from(path);
    if !dir.is_absolute() {
        return Err(SearchError::Invalid(format!(
            "path must be absolute, got: {path:?}"
        )));
    }
    let ignore = ignore
        .iter()
        .filter(|pattern| !pattern.trim().is_empty())
        .map(|pattern| GlobPattern::new(pattern))
        .collect::<Result<Vec<_>, _>>()?;

    let read_dir_error = |source: io::Error| {
        if source.kind() == io::ErrorKind::NotFound {
            SearchError::Missing(dir.clone())
        } else {
            SearchError::ReadDir {
                path: dir.clone(),
                source,
            }
        }
    };
    let mut entries = fs::read_dir(&dir).await.map_err(read_dir_error)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_error)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if ignore.iter().any(|pattern| pattern.matches(&name)) {
            continue;
        }
        let is_dir = entry.file_type().await.is_ok_and(|kind| kind.is_dir());
        names.push(if is_dir { format!("{name}/") } else { name });
    }
    names.sort();
    debug!(entries = names.len(), "directory listed");
    Ok(serde_json::to_string(&names)?)
}

async fn try_glob_files(pattern: &str, path: Option<&str>) -> Result<String, SearchError> {
    if pattern.trim().is_empty() {
        return Ok("[]".to_string());
    }
    let pattern = GlobPattern::new(pattern)?;
    let root = search_root(path)?;

    let matches = tokio::task::spawn_blocking(move || {
        let found = walk_files(&root)
            .filter_map(|entry| {
                let rel = relative_path(&root, entry.path());
                pattern.matches(&rel).then(|| (rel, modified(&entry)))
            })
            .collect();
        newest_first(found)
    })
    .await?;
    debug!(matches = matches.len(), "glob finished");
    Ok(serde_json::to_string(&matches)?)
}

async fn try_grep_files(
    pattern: &str,
    include: Option<&str>,
    path: Option<&str>,
) -> Result<String, SearchError> {
    if pattern.trim().is_empty() {
        return Ok("[]".to_string());
    }
    let regex = Regex::new(pattern).map_err(|source| SearchError::Regex {
        pattern: pattern.to_string(),
        source,
    })?;
    let include = include
        .filter(|include| !include.trim().is_empty())
        .map(GlobPattern::new)
        .transpose()?;
    let root = search_root(path)?;

    let matches = tokio::task::spawn_blocking(move || {
        let included = |rel: &str| include.as_ref().is_none_or(|glob| glob.matches(rel));
        if root.is_file() {
            let name = root.to_string_lossy().into_owned();
            let hit = included(&name) && contents_match(&root, &regex);
            return if hit { vec![name] } else { Vec::new() };
        }
        let found = walk_files(&root)
            .filter_map(|entry| {
                let rel = relative_path(&root, entry.path());
                (included(&rel) && contents_match(entry.path(), &regex))
                    .then(|| (rel, modified(&entry)))
            })
            .collect();
        newest_first(found)
    })
    .await?;
    debug!(matches = matches.len(), "grep finished");
    Ok(serde_json::to_string(&matches)?)
}

fn search_root(path: Option<&str>) -> Result<PathBuf, SearchError> {
    let root = match path.map(str::trim) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from("."),
    };
    if !root.exists() {
        return Err(SearchError::Missing(root));
    }
    Ok(root)
}

/// Regular files under `root`; unreadable entries are skipped.
fn walk_files(root: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules"
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

fn modified(entry: &DirEntry) -> Option<SystemTime> {
    entry.metadata().ok()?.modified().ok()
}

fn newest_first(mut found: Vec<(String, Option<SystemTime>)>) -> Vec<String> {
    found.sort_by(|(a_path, a_time), (b_path, b_time)| {
        b_time.cmp(a_time).then_with(|| a_path.cmp(b_path))
    });
    found.into_iter().map(|(path, _)| path).collect()
}

/// Binary files never match.
fn contents_match(path: &Path, regex: &Regex) -> bool {
    match std::fs::read(path) {
        Ok(bytes) => !looks_binary(&bytes) && regex.is_match(&bytes),
        Err(e) => {
            debug!(path = %path.display(), err = %e, "skipping unreadable file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn parse(result: &str) -> Vec<String> {
        serde_json::from_str(result).unwrap_or_else(|_| panic!("not a JSON list: {result}"))
    }

    fn workspace() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        std::fs::create_dir_all(root.join("src/io")).expect("mkdir");
        std::fs::create_dir_all(root.join(".git")).expect("mkdir");
        std::fs::create_dir_all(root.join("node_modules/dep")).expect("mkdir");
        std::fs::write(root.join("src/lib.rs"), "pub mod io;\n").expect("write");
        std::fs::write(root.join("src/io/shell.rs"), "fn spawn_shell() {}\n").expect("write");
        std::fs::write(root.join("README.md"), "spawn notes\n").expect("write");
        std::fs::write(root.join(".git/config.rs"), "fn spawn_shell() {}\n").expect("write");
        std::fs::write(root.join("node_modules/dep/index.rs"), "spawn\n").expect("write");
        std::fs::write(root.join("blob.bin"), b"spawn\0\x01").expect("write");
        temp
    }

    fn root_arg(temp: &tempfile::TempDir) -> String {
        temp.path().to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn list_marks_directories_and_applies_ignore() {
        let temp = workspace();
        let listed = parse(&list_directory(&root_arg(&temp), &[]).await);
        assert_eq!(
            listed,
            vec![".git/", "README.md", "blob.bin", "node_modules/", "src/"]
        );

        let ignore = vec!["*.md".to_string(), "node_*".to_string()];
        let listed = parse(&list_directory(&root_arg(&temp), &ignore).await);
        assert_eq!(listed, vec![".git/", "blob.bin", "src/"]);
    }

    #[tokio::test]
    async fn list_requires_existing_absolute_path() {
        let relative = list_directory("relative/dir", &[]).await;
        assert!(relative.starts_with("Error: path must be absolute"), "{relative}");
        let temp = workspace();
        let missing = temp.path().join("nope");
        let result = list_directory(&missing.to_string_lossy(), &[]).await;
        assert!(result.starts_with("Error: path does not exist"), "{result}");
    }

    #[tokio::test]
    async fn glob_skips_hidden_and_vendored_directories() {
        let temp = workspace();
        let found = parse(&glob_files("*.rs", Some(&root_arg(&temp))).await);
        let mut sorted = found.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["src/io/shell.rs", "src/lib.rs"]);

        let nested = parse(&glob_files("src/**/*.rs", Some(&root_arg(&temp))).await);
        assert_eq!(nested.len(), 2);
        assert_eq!(glob_files("", None).await, "[]");
    }

    #[tokio::test]
    async fn glob_orders_newest_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("old.txt"), "a").expect("write");
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(temp.path().join("new.txt"), "b").expect("write");

        let found = parse(&glob_files("*.txt", Some(&root_arg(&temp))).await);
        assert_eq!(found, vec!["new.txt", "old.txt"]);
    }

    #[tokio::test]
    async fn grep_matches_contents_and_filters_by_include() {
        let temp = workspace();
        let mut found = parse(&grep_files(r"spawn_\w+", None, Some(&root_arg(&temp))).await);
        found.sort();
        assert_eq!(found, vec!["src/io/shell.rs"]);

        let mut any = parse(&grep_files("spawn", None, Some(&root_arg(&temp))).await);
        any.sort();
        assert_eq!(any, vec!["README.md", "src/io/shell.rs"]);

        let only_md =
            parse(&grep_files("spawn", Some("*.{md,txt}"), Some(&root_arg(&temp))).await);
        assert_eq!(only_md, vec!["README.md"]);
    }

    #[tokio::test]
    async fn grep_accepts_a_single_file() {
        let temp = workspace();
        let file = temp.path().join("src/lib.rs");
        let file_arg = file.to_string_lossy().into_owned();
        let hit = parse(&grep_files("pub mod", None, Some(&file_arg)).await);
        assert_eq!(hit, vec![file_arg.clone()]);
        assert!(parse(&grep_files("absent", None, Some(&file_arg)).await).is_empty());
    }

    #[tokio::test]
    async fn grep_reports_invalid_regex() {
        let result = grep_files("(unclosed", None, None).await;
        assert!(result.starts_with("Error: invalid regex \"(unclosed\""), "{result}");
    }
}
