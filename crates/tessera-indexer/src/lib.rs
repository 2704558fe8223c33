//! Filesystem tree walking and ignore-rule resolution

pub mod rules;
pub mod walker;

#[cfg(test)]
pub mod tests;

pub use rules::{RuleSet, RootRules, BaseSource, DEFAULT_IGNORE_PATTERNS, MINIMAL_EXCLUDES};
pub use walker::TreeWalker;
