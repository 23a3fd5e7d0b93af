//! branch path grammar and wildcard patterns
//!
//! a branch is a `/`-separated path of segments made of `[-a-zA-Z0-9.,!+=_@^%]`.
//! patterns may additionally contain `*` (matched against existing refs) or
//! `**` (matched against the configuration tree and driver listings).

use regex::Regex;

use crate::error::{Error, Result};

/// how a pattern is expanded into branches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternKind {
    /// no wildcard: the pattern is the branch
    Literal,
    /// `*` without `**`: glob over existing refs
    SingleStar,
    /// `**`: logical listing through configuration and drivers
    DoubleStar,
}

impl PatternKind {
    pub fn of(pattern: &str) -> Self {
        if pattern.contains("**") {
            PatternKind::DoubleStar
        } else if pattern.contains('*') {
            PatternKind::SingleStar
        } else {
            PatternKind::Literal
        }
    }
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-.,!+=_@^%".contains(c)
}

/// validate a concrete branch name
pub fn validate_branch(name: &str) -> Result<()> {
    check_path(name, false)
}

/// validate a branch pattern and classify it
pub fn validate_pattern(pattern: &str) -> Result<PatternKind> {
    check_path(pattern, true)?;
    Ok(PatternKind::of(pattern))
}

fn check_path(name: &str, allow_wildcard: bool) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidBranch("empty branch name".to_string()));
    }

    if name.ends_with('/') {
        return Err(Error::InvalidBranch(format!(
            "branch cannot end with '/': {}",
            name
        )));
    }

    for segment in name.split('/') {
        if segment.is_empty() {
            return Err(Error::InvalidBranch(format!(
                "branch cannot contain empty segments: {}",
                name
            )));
        }

        if segment == "." || segment == ".." {
            return Err(Error::InvalidBranch(format!(
                "branch cannot contain '.' or '..': {}",
                name
            )));
        }

        let valid = segment
            .chars()
            .all(|c| is_segment_char(c) || (allow_wildcard && c == '*'));
        if !valid {
            return Err(Error::InvalidBranch(format!(
                "invalid character in segment '{}' of {}",
                segment, name
            )));
        }
    }

    Ok(())
}

/// literal text before the first wildcard
pub fn literal_base(pattern: &str) -> &str {
    match pattern.find('*') {
        Some(pos) => &pattern[..pos],
        None => pattern,
    }
}

/// the directory part of a pattern's literal base, without trailing slash
///
/// `lxc/web-*/**` gives `lxc`, `lxc/**` gives `lxc`, `**` gives ``
pub fn base_dir(pattern: &str) -> &str {
    let base = literal_base(pattern);
    match base.rfind('/') {
        Some(pos) => &base[..pos],
        None => "",
    }
}

/// convert a wildcard pattern into an anchored regex where each `*` or `**`
/// matches one or more characters, across segment boundaries
pub fn pattern_regex(pattern: &str) -> Result<Regex> {
    let mut normalized = pattern.to_string();
    while normalized.contains("**") {
        normalized = normalized.replace("**", "*");
    }

    let body = normalized
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".+");

    Regex::new(&format!("^{}$", body)).map_err(|e| Error::usage(e.to_string()))
}

/// upper-case form of a name usable in an environment variable
///
/// `lxc/web-1` becomes `LXC_WEB_1`
pub fn env_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// join a parent branch and a child, either of which may be empty
pub fn join(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{}/{}", parent, child),
    }
}

/// all prefixes of a branch from the shortest to the full name
///
/// `a/b/c` gives `a`, `a/b`, `a/b/c`
pub fn prefixes(name: &str) -> Vec<&str> {
    let mut out: Vec<&str> = name
        .match_indices('/')
        .map(|(pos, _)| &name[..pos])
        .collect();
    if !name.is_empty() {
        out.push(name);
    }
    out
}
