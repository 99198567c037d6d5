//! Include/exclude gate for artifact deployment.
//!
//! Patterns are Ant-style globs matched against the repository-relative
//! artifact path: `?` is one character, `*` stays within a path segment and
//! `**` crosses segments. An artifact is skipped only when an exclude
//! pattern matches and no include pattern does.

use crate::error::{BuildInfoError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeExcludePatterns {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl IncludeExcludePatterns {
    /// Build from raw lists whose entries may themselves be comma-separated,
    /// as in `"*.pom, lib/**"`.
    pub fn from_lists(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: split_patterns(include),
            exclude: split_patterns(exclude),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

fn split_patterns(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Compiled form of [`IncludeExcludePatterns`].
#[derive(Debug, Clone)]
pub struct ArtifactFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl ArtifactFilter {
    pub fn compile(patterns: &IncludeExcludePatterns) -> Result<Self> {
        Ok(Self {
            include: compile_all(&patterns.include)?,
            exclude: compile_all(&patterns.exclude)?,
        })
    }

    /// A filter that never skips anything.
    pub fn permissive() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn should_skip(&self, artifact_path: &str) -> bool {
        let path = artifact_path.trim_start_matches('/');
        if !self.exclude.iter().any(|re| re.is_match(path)) {
            return false;
        }
        !self.include.iter().any(|re| re.is_match(path))
    }
}

/// One-shot form of [`ArtifactFilter::should_skip`].
pub fn should_skip(artifact_path: &str, patterns: &IncludeExcludePatterns) -> Result<bool> {
    Ok(ArtifactFilter::compile(patterns)?.should_skip(artifact_path))
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            let source = glob_to_regex(p.trim_start_matches('/'));
            Regex::new(&source).map_err(|e| BuildInfoError::Pattern {
                pattern: p.clone(),
                source: e,
            })
        })
        .collect()
}

fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let segment_start = i == 0 || chars[i - 1] == '/';
                if segment_start && chars.get(i + 2) == Some(&'/') {
                    // `**/` may also match zero directories
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }
    out.push('$');
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
