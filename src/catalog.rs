//! File discovery for one data source.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::config::SourceSpec;

// ---------------------------------------------------------------------------
// Glob translation
// ---------------------------------------------------------------------------

/// Translate a shell glob into a regex body (unanchored).
///
/// `**/` matches zero or more directories, `*` and `?` stay within one path
/// component, `[...]` classes are kept (`[!...]` negates).
fn glob_body(pattern: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(len) if len > 0 => {
                    let class: String = chars[i + 1..i + 1 + len].iter().collect();
                    let class = match class.strip_prefix('!') {
                        Some(rest) => format!("^{rest}"),
                        None => class,
                    };
                    out.push('[');
                    out.push_str(&class.replace('\\', "\\\\"));
                    out.push(']');
                    i += len + 2;
                    continue;
                }
                _ => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out
}

fn has_wildcards(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Inclusion glob plus exclusion rules of one source.
#[derive(Debug, Clone)]
pub struct FileMatcher {
    include: Regex,
    exclude_substrings: Vec<String>,
    exclude_globs: Vec<Regex>,
}

impl FileMatcher {
    pub fn new(pattern: &str, excludes: &[String]) -> Result<Self, regex::Error> {
        // The pattern may match at any depth below the base directory.
        let include = Regex::new(&format!("^(?:.*/)?{}$", glob_body(pattern)))?;
        let mut exclude_substrings = Vec::new();
        let mut exclude_globs = Vec::new();
        for exclude in excludes {
            if has_wildcards(exclude) {
                exclude_globs.push(Regex::new(&glob_body(exclude))?);
            } else {
                exclude_substrings.push(exclude.clone());
            }
        }
        Ok(Self {
            include,
            exclude_substrings,
            exclude_globs,
        })
    }

    /// `relative` uses `/` separators; exclusions look at the full path.
    pub fn matches(&self, relative: &str, full: &str) -> bool {
        self.include.is_match(relative)
            && !self.exclude_substrings.iter().any(|s| full.contains(s.as_str()))
            && !self.exclude_globs.iter().any(|re| re.is_match(full))
    }
}

fn relative_slash_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// All files below the source directory matching its pattern and none of its
/// exclusions, sorted and de-duplicated. A missing directory yields nothing.
pub fn discover(source: &SourceSpec) -> BTreeSet<PathBuf> {
    let base = &source.directory;
    if !base.is_dir() {
        warn!("source directory {} not found", base.display());
        return BTreeSet::new();
    }

    let matcher = match FileMatcher::new(&source.pattern, &source.exclude) {
        Ok(m) => m,
        Err(e) => {
            warn!("invalid file pattern '{}': {e}", source.pattern);
            return BTreeSet::new();
        }
    };

    let files: BTreeSet<PathBuf> = WalkDir::new(base)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let path = entry.path();
            relative_slash_path(base, path)
                .is_some_and(|rel| matcher.matches(&rel, &path.to_string_lossy()))
        })
        .map(|entry| entry.into_path())
        .collect();

    debug!(
        "{} files match {} under {}",
        files.len(),
        source.pattern,
        base.display()
    );
    files
}
