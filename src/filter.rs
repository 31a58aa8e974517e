//! Tracee filtering for -e/--exclude patterns
//!
//! A tracee is excluded when any of its arguments matches the pattern.
//! Renderers skip excluded tracees together with their whole subtree.

use crate::tracee::Tracee;
use anyhow::{Context, Result};
use regex::Regex;

/// Filter that decides which tracees are left out of the output
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    /// Pattern matched against each argument (None = exclude nothing)
    pattern: Option<Regex>,
}

impl ExcludeFilter {
    /// Create a filter that keeps every tracee
    pub fn none() -> Self {
        Self { pattern: None }
    }

    /// Compile an exclude pattern like `^ld$` or `cc1`
    pub fn from_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid exclude pattern: {}", pattern))?;
        Ok(Self {
            pattern: Some(regex),
        })
    }

    /// Build from an optional command-line value
    pub fn from_option(pattern: Option<&str>) -> Result<Self> {
        pattern.map_or_else(|| Ok(Self::none()), Self::from_pattern)
    }

    /// Check whether a tracee (and its subtree) should be left out
    pub fn excludes(&self, tracee: &Tracee) -> bool {
        match (&self.pattern, &tracee.arguments) {
            (Some(regex), Some(arguments)) => arguments.iter().any(|arg| regex.is_match(arg)),
            _ => false,
        }
    }
}
