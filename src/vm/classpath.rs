//! Classpath wildcard expansion
//!
//! Patterns may carry `*` wildcards in any path segment, not just the
//! file name. Expansion walks a worklist instead of recursing, so depth
//! is bounded by the segment count. Emitted order follows directory
//! enumeration order, which is OS-defined.

use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Expand one classpath pattern against `base` (used to resolve
/// relative patterns). Entries that do not resolve to an existing path
/// are dropped with a warning.
pub fn expand_entry(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let start = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        base.join(pattern)
    };

    let mut out = Vec::new();
    let mut work = VecDeque::from([start]);
    while let Some(candidate) = work.pop_front() {
        let Some((dir, segment, remainder)) = split_at_wildcard(&candidate) else {
            if candidate.exists() {
                out.push(candidate);
            } else {
                log::warn!("Classpath entry not found: {}", candidate.display());
            }
            continue;
        };
        let Some(matcher) = segment_matcher(&segment) else {
            continue;
        };
        let scan_dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir.clone()
        };
        let Ok(entries) = std::fs::read_dir(&scan_dir) else {
            log::warn!("Classpath directory not found: {}", scan_dir.display());
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !matcher.is_match(&name.to_string_lossy()) {
                continue;
            }
            let matched = dir.join(&name);
            if remainder.as_os_str().is_empty() {
                // Re-queued so the non-wildcard branch re-checks it.
                work.push_back(matched);
            } else if matched.is_dir() {
                work.push_back(matched.join(&remainder));
            }
            // A file with a trailing remainder cannot be descended into.
        }
    }
    out
}

/// Split a path at its first wildcard segment: the directory before it,
/// the wildcard segment itself, and the remainder after it.
fn split_at_wildcard(path: &Path) -> Option<(PathBuf, String, PathBuf)> {
    let mut prefix = PathBuf::new();
    let mut components = path.components();
    while let Some(component) = components.next() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains('*') {
            return Some((prefix, text.into_owned(), components.as_path().to_path_buf()));
        }
        prefix.push(component);
    }
    None
}

/// Anchored, case-insensitive matcher for one wildcard segment.
fn segment_matcher(segment: &str) -> Option<Regex> {
    let escaped = regex::escape(segment).replace("\\*", ".*");
    match Regex::new(&format!("(?i)^{escaped}$")) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("Invalid classpath segment '{}': {}", segment, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    fn names(entries: Vec<PathBuf>) -> BTreeSet<String> {
        entries
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_filename_wildcard_matches_set() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        std::fs::create_dir_all(lib.join("sub")).unwrap();
        touch(&lib.join("a.jar"));
        touch(&lib.join("b.jar"));
        touch(&lib.join("notes.txt"));
        touch(&lib.join("sub").join("c.jar"));

        let entries = expand_entry(dir.path(), "lib/*.jar");
        assert_eq!(names(entries), BTreeSet::from(["a.jar".into(), "b.jar".into()]));
    }

    #[test]
    fn test_wildcard_directory_segment() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("lib-1.2").join("sub");
        std::fs::create_dir_all(&sub).unwrap();
        touch(&sub.join("c.jar"));

        let entries = expand_entry(dir.path(), "lib-*/sub/c.jar");
        assert_eq!(entries, vec![sub.join("c.jar")]);
    }

    #[test]
    fn test_file_match_with_remainder_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        std::fs::create_dir_all(&lib).unwrap();
        touch(&lib.join("a.jar"));

        let entries = expand_entry(dir.path(), "lib/*.jar/inner");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_plain_entry_emitted_when_present() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("app.jar"));

        let entries = expand_entry(dir.path(), "app.jar");
        assert_eq!(entries, vec![dir.path().join("app.jar")]);
        assert!(expand_entry(dir.path(), "missing.jar").is_empty());
    }

    #[test]
    fn test_multiple_wildcard_segments() {
        let dir = tempfile::tempdir().unwrap();
        for module in ["core", "extra"] {
            let target = dir.path().join(module).join("target");
            std::fs::create_dir_all(&target).unwrap();
            touch(&target.join(format!("{module}.jar")));
        }

        let entries = expand_entry(dir.path(), "*/target/*.jar");
        assert_eq!(
            names(entries),
            BTreeSet::from(["core.jar".into(), "extra.jar".into()])
        );
    }
}
