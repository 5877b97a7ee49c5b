//! Layer file discovery
//!
//! Patterns are shell globs (`*`, `?`, `[...]` with `!` negation) matched
//! case-insensitively against file names, never against directories.

use regex::{Regex, RegexBuilder};
use std::io;
use std::path::{Path, PathBuf};
use stencilforge_core::{Error, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Translate a shell glob into an anchored regular expression
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // A class needs at least one member before the closing bracket
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str("\\[");
                } else {
                    let mut body = String::new();
                    let mut k = i + 1;
                    if chars[k] == '!' {
                        body.push('^');
                        k += 1;
                    }
                    for &c in &chars[k..j] {
                        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
                            body.push('\\');
                        }
                        body.push(c);
                    }
                    out.push('[');
                    out.push_str(&body);
                    out.push(']');
                    i = j;
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    out
}

/// Compile a glob into a case-insensitive matcher
pub fn compile_glob(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(&glob_to_regex(pattern))
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::invalid_config("patterns", format!("invalid glob {pattern:?}: {e}")))
}

/// Every file under `dir` whose name matches one of `patterns`
///
/// The walk is recursive; results are sorted and free of duplicates.
pub fn find_files(dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("input directory not found: {}", dir.display()),
        )));
    }
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let matchers = patterns.iter().map(|p| compile_glob(p)).collect::<Result<Vec<_>>>()?;

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if matchers.iter().any(|m| m.is_match(&name)) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files.dedup();
    debug!("{} file(s) matched {:?} in {}", files.len(), patterns, dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn glob_matches(pattern: &str, name: &str) -> bool {
        compile_glob(pattern).unwrap().is_match(name)
    }

    #[test]
    fn test_glob_matching() {
        assert!(glob_matches("*.gtp", "board.GTP"));
        assert!(glob_matches("*paste*top*", "Board-PasteTop.gbr"));
        assert!(!glob_matches("*.gtp", "board.gtp.bak"));
        assert!(glob_matches("board.g?o", "board.gko"));
        assert!(glob_matches("*.gm[0-9]", "board.gm1"));
        assert!(!glob_matches("*.gm[!1]", "board.gm1"));
        assert!(glob_matches("a+b(1).gko", "A+B(1).GKO"));
        assert!(glob_matches("[x", "[x"));
    }

    #[test]
    fn test_find_files_recursive_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("z.gtp"), "").unwrap();
        fs::write(dir.path().join("sub").join("a.GTP"), "").unwrap();
        fs::write(dir.path().join("board.gko"), "").unwrap();
        fs::create_dir_all(dir.path().join("dir.gtp")).unwrap();

        let patterns = vec!["*.gtp".to_string(), "*.GTP".to_string()];
        let found = find_files(dir.path(), &patterns).unwrap();
        assert_eq!(found, vec![dir.path().join("sub").join("a.GTP"), dir.path().join("z.gtp")]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let err = find_files(&dir.path().join("nope"), &["*".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
