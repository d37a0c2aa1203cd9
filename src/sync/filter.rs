//! File selection filter for local traversal.
//!
//! A filter expression is a whitespace separated list of shell-style globs.
//! Bare patterns select files, `!`-prefixed patterns exclude them. Without
//! any selecting pattern every file is selected; exclusions always win.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path};

use crate::error::{Result, SyncError};

/// Compiled filter expression.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: GlobSet,
    exclude: GlobSet,
    has_includes: bool,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl FileFilter {
    /// Filter that selects every file.
    pub fn allow_all() -> Self {
        Self {
            include: GlobSet::empty(),
            exclude: GlobSet::empty(),
            has_includes: false,
        }
    }

    /// Parse an optional expression; `None` or blank selects everything.
    pub fn from_expression(expression: Option<&str>) -> Result<Self> {
        match expression {
            Some(expr) if !expr.trim().is_empty() => Self::parse(expr),
            _ => Ok(Self::allow_all()),
        }
    }

    /// Parse a filter expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();
        let mut has_includes = false;

        for token in expression.split_whitespace() {
            let (builder, pattern) = match token.strip_prefix('!') {
                Some(rest) => (&mut exclude, rest),
                None => {
                    has_includes = true;
                    (&mut include, token)
                }
            };
            if pattern.is_empty() {
                continue;
            }
            let glob = Glob::new(pattern).map_err(|source| SyncError::InvalidFilter {
                pattern: token.to_string(),
                source,
            })?;
            builder.add(glob);
        }

        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|source| SyncError::InvalidFilter {
                pattern: expression.to_string(),
                source,
            })
        };

        Ok(Self {
            include: build(include)?,
            exclude: build(exclude)?,
            has_includes,
        })
    }

    /// Check a path relative to the sync root.
    pub fn is_selected(&self, relative: &Path) -> bool {
        if matches_path(&self.exclude, relative) {
            return false;
        }
        !self.has_includes || matches_path(&self.include, relative)
    }
}

/// Match against the whole relative path and against each component, so
/// `.git` excludes everything under a `.git` directory and `*.html` matches
/// files at any depth.
fn matches_path(set: &GlobSet, relative: &Path) -> bool {
    if set.is_empty() {
        return false;
    }
    if set.is_match(relative) {
        return true;
    }
    relative.components().any(|component| match component {
        Component::Normal(name) => set.is_match(name),
        _ => false,
    })
}
