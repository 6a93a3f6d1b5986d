//! Glob pattern utilities
//!
//! This module expands command-line style glob patterns into existing paths

use anyhow::Result;
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Check if a string contains glob pattern characters
pub fn is_glob_pattern(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?') || pattern.contains('[')
}

/// Longest leading run of literal path components, where the walk starts.
fn literal_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    // stop at the first component carrying a wildcard
    for component in Path::new(pattern).components() {
        match component {
            Component::Normal(part) if is_glob_pattern(&part.to_string_lossy()) => break,
            other => base.push(other.as_os_str()),
        }
    }
    if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    }
}

fn matches(matcher: &GlobMatcher, path: &Path) -> bool {
    matcher.is_match(path) || path.strip_prefix(".").is_ok_and(|rel| matcher.is_match(rel))
}

/// Expand a single glob pattern to matching files and directories
///
/// Literal patterns come back unchanged when the path exists. Results are
/// sorted by path.
pub fn expand_glob_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    if !is_glob_pattern(pattern) {
        let path = PathBuf::from(pattern);
        return Ok(if path.exists() { vec![path] } else { Vec::new() });
    }

    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();
    let base = literal_base(pattern);

    let mut matching_paths: Vec<PathBuf> = WalkDir::new(&base)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| matches(&matcher, path))
        .collect();

    matching_paths.sort();
    Ok(matching_paths)
}

/// Expand a list of patterns (literal paths or globs), keeping pattern order
pub fn expand_file_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut valid_paths = Vec::new();
    for pattern in patterns {
        valid_paths.extend(expand_glob_pattern(pattern)?);
    }
    Ok(valid_paths)
}
