//! Include/exclude rules over file and object names.
//!
//! A rule pattern is a shell glob (`*`, `?`, `[...]`, `[!...]`). It must not contain a
//! path separator except a single leading `/`, which anchors the pattern to the
//! enumeration root. A plain pattern is matched against the leaf name of an item, an
//! anchored pattern against its whole relative path.
//!
//! An item passes a rule list when the list has no include rule or the item matches at
//! least one include rule, and the item matches no exclude rule.

use anyhow::{Context, Result, anyhow};
use globset::{GlobBuilder, GlobMatcher};

pub const DIR_INFO_NOT_SUPPORTED: &str =
    "--include or --exclude does not support format containing dir info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
pub struct FilterRule {
    pub kind: FilterKind,
    pub pattern: String,
    anchored: bool,
    matcher: GlobMatcher,
}

impl FilterRule {
    pub fn new(kind: FilterKind, pattern: &str) -> Result<Self> {
        check_pattern(pattern).map_err(|e| anyhow!(e))?;

        let anchored = pattern.starts_with('/');
        let glob_pattern = pattern.strip_prefix('/').unwrap_or(pattern);
        let matcher = GlobBuilder::new(glob_pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pattern}"))?
            .compile_matcher();

        Ok(Self {
            kind,
            pattern: pattern.to_string(),
            anchored,
            matcher,
        })
    }

    pub fn include(pattern: &str) -> Result<Self> {
        Self::new(FilterKind::Include, pattern)
    }

    pub fn exclude(pattern: &str) -> Result<Self> {
        Self::new(FilterKind::Exclude, pattern)
    }

    pub fn is_match(&self, relative_path: &str) -> bool {
        if self.anchored {
            return self.matcher.is_match(relative_path);
        }
        self.matcher.is_match(leaf_name(relative_path))
    }
}

impl PartialEq for FilterRule {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.pattern == other.pattern
    }
}

/// Anything the rules can be evaluated against.
pub trait Filterable {
    /// Path relative to the enumeration root, `/` separated. Directories end with `/`.
    fn relative_path(&self) -> &str;
}

impl Filterable for str {
    fn relative_path(&self) -> &str {
        self
    }
}

impl Filterable for String {
    fn relative_path(&self) -> &str {
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRules {
    rules: Vec<FilterRule>,
}

impl FilterRules {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn has_include(&self) -> bool {
        self.rules.iter().any(|rule| rule.kind == FilterKind::Include)
    }

    pub fn matches<D: Filterable + ?Sized>(&self, item: &D) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let path = item.relative_path();
        let included = !self.has_include()
            || self
                .rules
                .iter()
                .filter(|rule| rule.kind == FilterKind::Include)
                .any(|rule| rule.is_match(path));

        included
            && !self
                .rules
                .iter()
                .filter(|rule| rule.kind == FilterKind::Exclude)
                .any(|rule| rule.is_match(path))
    }

    pub fn filter_many<D, I>(&self, items: I) -> Vec<D>
    where
        D: Filterable,
        I: IntoIterator<Item = D>,
    {
        items
            .into_iter()
            .filter(|item| self.matches(item))
            .collect()
    }
}

pub fn check_pattern(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Err("empty pattern is not allowed".to_string());
    }

    let body = pattern.strip_prefix('/').unwrap_or(pattern);
    if body.is_empty() || body.contains('/') {
        return Err(DIR_INFO_NOT_SUPPORTED.to_string());
    }

    Ok(())
}

pub fn leaf_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}
