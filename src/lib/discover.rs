//! Env-file discovery.
//!
//! Walks a project tree looking for files whose name starts with
//! `.env`, honoring exclude patterns and a root-level `.gitignore`.
//! Unreadable directories are logged and skipped; nothing here is
//! fatal.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Never descended into, regardless of exclude patterns.
const IGNORED_DIRECTORIES: [&str; 3] = [".git", "node_modules", "dist"];

const GITIGNORE_FILENAME: &str = ".gitignore";

/// A compiled exclude pattern. Patterns without glob metacharacters or
/// separators match any single path segment; everything else is
/// glob-matched against the root-relative path.
enum ExcludeRule {
  Segment(String),
  Glob(glob::Pattern),
}

impl ExcludeRule {
  fn compile(pattern: &str) -> Option<Self> {
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() {
      return None;
    }

    let has_glob_meta = trimmed.contains(['*', '?', '[']);
    if !has_glob_meta && !trimmed.contains('/') {
      return Some(ExcludeRule::Segment(trimmed.to_string()));
    }

    match glob::Pattern::new(trimmed) {
      Ok(glob) => Some(ExcludeRule::Glob(glob)),
      Err(error) => {
        debug!(pattern, %error, "skipping unparsable exclude pattern");
        None
      }
    }
  }

  fn matches(&self, rel_path: &Path) -> bool {
    match self {
      ExcludeRule::Segment(segment) => rel_path
        .components()
        .any(|component| component.as_os_str() == segment.as_str()),
      // `*` must not match across path separators; "*.log" excludes
      // "x.log" but not "sub/x.log".
      ExcludeRule::Glob(glob) => glob.matches_path_with(
        rel_path,
        glob::MatchOptions {
          require_literal_separator: true,
          ..glob::MatchOptions::new()
        },
      ),
    }
  }
}

fn is_excluded(rel_path: &Path, rules: &[ExcludeRule]) -> bool {
  rules.iter().any(|rule| rule.matches(rel_path))
}

/// Reads exclude patterns from a `.gitignore`: trimmed, non-empty,
/// non-comment lines. A literal `.env` line is dropped since env files
/// are exactly what the walk is looking for.
fn parse_gitignore(path: &Path) -> Vec<String> {
  let Ok(content) = std::fs::read_to_string(path) else {
    return Vec::new();
  };

  content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#') && *line != ".env")
    .map(str::to_string)
    .collect()
}

/// True when `name` is an env file the walk should report.
///
/// Everything starting with `.env` qualifies; with `include_suffixes`
/// off, suffixed variants (a `.` at byte index 4 or later, so
/// `.env.local` but not `.envrc`) are filtered out. The bare `.env` is
/// always kept.
fn qualifies(name: &str, include_suffixes: bool) -> bool {
  if !name.starts_with(".env") {
    return false;
  }
  if include_suffixes || name == ".env" {
    return true;
  }
  !name.get(4..).is_some_and(|rest| rest.contains('.'))
}

/// Finds env files under `root`.
///
/// When `root/.gitignore` exists its patterns replace
/// `exclude_patterns` entirely for this walk. Subdirectories are only
/// entered when `recursive` is set. Order follows filesystem
/// enumeration; no sorting is applied.
pub fn find_env_files(
  root: impl AsRef<Path>,
  exclude_patterns: &[String],
  recursive: bool,
  include_suffixes: bool,
) -> Vec<PathBuf> {
  let root = root.as_ref();

  let gitignore_path = root.join(GITIGNORE_FILENAME);
  let patterns = if gitignore_path.exists() {
    debug!(?gitignore_path, "using .gitignore patterns for this walk");
    parse_gitignore(&gitignore_path)
  } else {
    exclude_patterns.to_vec()
  };

  let rules: Vec<ExcludeRule> = patterns
    .iter()
    .filter_map(|pattern| ExcludeRule::compile(pattern))
    .collect();

  let max_depth = if recursive { usize::MAX } else { 1 };
  let mut found = Vec::new();

  let walker = WalkDir::new(root)
    .max_depth(max_depth)
    .into_iter()
    .filter_entry(|entry| {
      if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
      }
      let name = entry.file_name().to_string_lossy();
      if IGNORED_DIRECTORIES.contains(&name.as_ref()) {
        return false;
      }
      let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
      !is_excluded(rel, &rules)
    });

  for entry in walker {
    let entry = match entry {
      Ok(entry) => entry,
      Err(error) => {
        warn!("Permission denied or error reading: {}", error);
        continue;
      }
    };

    if !entry.file_type().is_file() {
      continue;
    }

    let name = entry.file_name().to_string_lossy();
    if !qualifies(&name, include_suffixes) {
      continue;
    }

    let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
    if is_excluded(rel, &rules) {
      continue;
    }

    found.push(entry.into_path());
  }

  debug!(count = found.len(), "discovery finished");
  found
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "A=1\n").unwrap();
  }

  fn names(found: &[PathBuf], root: &Path) -> Vec<String> {
    let mut out: Vec<String> = found
      .iter()
      .map(|path| {
        path
          .strip_prefix(root)
          .unwrap()
          .to_string_lossy()
          .replace('\\', "/")
      })
      .collect();
    out.sort();
    out
  }

  #[test]
  fn test_finds_env_files_recursively() {
    let dir = TempDir::new().unwrap();
    touch(&dir.path().join(".env"));
    touch(&dir.path().join("apps/web/.env"));
    touch(&dir.path().join("apps/web/README.md"));

    let found = find_env_files(dir.path(), &[], true, false);
    assert_eq!(names(&found, dir.path()), vec![".env", "apps/web/.env"]);
  }

  #[test]
  fn test_never_enters_always_ignored_directories() {
    let dir = TempDir::new().unwrap();
    touch(&dir.path().join(".git/.env"));
    touch(&dir.path().join("node_modules/pkg/.env"));
    touch(&dir.path().join("dist/.env"));
    touch(&dir.path().join(".env"));

    // Even with no exclude patterns at all.
    let found = find_env_files(dir.path(), &[], true, true);
    assert_eq!(names(&found, dir.path()), vec![".env"]);
  }

  #[test]
  fn test_non_recursive_stays_at_root() {
    let dir = TempDir::new().unwrap();
    touch(&dir.path().join(".env"));
    touch(&dir.path().join("sub/.env"));

    let found = find_env_files(dir.path(), &[], false, false);
    assert_eq!(names(&found, dir.path()), vec![".env"]);
  }

  #[test]
  fn test_suffix_filtering() {
    let dir = TempDir::new().unwrap();
    touch(&dir.path().join(".env"));
    touch(&dir.path().join(".env.local"));
    touch(&dir.path().join(".env.production"));
    touch(&dir.path().join(".envrc"));

    let without = find_env_files(dir.path(), &[], true, false);
    assert_eq!(names(&without, dir.path()), vec![".env", ".envrc"]);

    let with = find_env_files(dir.path(), &[], true, true);
    assert_eq!(
      names(&with, dir.path()),
      vec![".env", ".env.local", ".env.production", ".envrc"]
    );
  }

  #[test]
  fn test_segment_pattern_excludes_directory() {
    let dir = TempDir::new().unwrap();
    touch(&dir.path().join(".env"));
    touch(&dir.path().join("vendor/lib/.env"));

    let found = find_env_files(dir.path(), &["vendor".to_string()], true, false);
    assert_eq!(names(&found, dir.path()), vec![".env"]);
  }

  #[test]
  fn test_glob_pattern_excludes_matching_paths() {
    let dir = TempDir::new().unwrap();
    touch(&dir.path().join(".env"));
    touch(&dir.path().join("apps/legacy/.env"));
    touch(&dir.path().join("apps/web/.env"));

    let found = find_env_files(dir.path(), &["apps/legacy*".to_string()], true, false);
    assert_eq!(names(&found, dir.path()), vec![".env", "apps/web/.env"]);
  }

  #[test]
  fn test_glob_star_stays_within_one_segment() {
    let dir = TempDir::new().unwrap();
    touch(&dir.path().join(".env"));
    touch(&dir.path().join("sub/.env"));

    // "*.env" only excludes the root-level file; the star does not
    // reach across the separator into sub/.
    let found = find_env_files(dir.path(), &["*.env".to_string()], true, false);
    assert_eq!(names(&found, dir.path()), vec!["sub/.env"]);
  }

  #[cfg(unix)]
  #[test]
  fn test_symlink_cycle_does_not_abort_the_walk() {
    let dir = TempDir::new().unwrap();
    touch(&dir.path().join(".env"));
    touch(&dir.path().join("sub/.env"));
    std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();
    std::os::unix::fs::symlink("no-such-target", dir.path().join("dangling")).unwrap();

    let found = find_env_files(dir.path(), &[], true, false);
    assert_eq!(names(&found, dir.path()), vec![".env", "sub/.env"]);
  }

  #[test]
  fn test_gitignore_replaces_exclude_patterns() {
    let dir = TempDir::new().unwrap();
    touch(&dir.path().join(".env"));
    touch(&dir.path().join("secret/.env"));
    touch(&dir.path().join("vendor/.env"));
    fs::write(
      dir.path().join(".gitignore"),
      "# ignored dirs\nsecret\n.env\n\n",
    )
    .unwrap();

    // "vendor" comes from the caller but the .gitignore takes over, so
    // only "secret" is excluded; the literal ".env" line is dropped.
    let found = find_env_files(dir.path(), &["vendor".to_string()], true, false);
    assert_eq!(names(&found, dir.path()), vec![".env", "vendor/.env"]);
  }

  #[test]
  fn test_qualifies() {
    assert!(qualifies(".env", false));
    assert!(qualifies(".env", true));
    assert!(qualifies(".envrc", false));
    assert!(!qualifies(".env.local", false));
    assert!(qualifies(".env.local", true));
    assert!(!qualifies("config.env", false));
    assert!(!qualifies("README.md", true));
  }
}
