//! Path filtering for grovetest.
//!
//! A filter expression decides which tests a run executes. It is a single
//! string of comma-separated clauses, each matched against the full
//! slash-joined group/test path (for example `grouplifecycle/withlifecycle/setup`):
//!
//! - `module/test` matches the whole path exactly
//! - `module/*` matches any path starting with `module/` (trailing `*`)
//! - `*test` matches any path ending in `test` (leading `*`)
//! - a leading `~` negates the clause
//!
//! Every clause is evaluated; a matching negated clause excludes the path
//! outright, no matter what the other clauses say. Otherwise the path is
//! included iff at least one non-negated clause matched.
//!
//! Clauses are the raw substrings between commas: whitespace is significant,
//! and an empty expression parses to a single exact-match clause with an
//! empty pattern, which no real path ever matches. The absent-filter case
//! ("run everything") is represented by not installing a [`FilterSet`] at
//! all, not by an empty expression.

use log::debug;

/// How a clause's pattern is applied to a candidate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Full,
    Prefix,
    Suffix,
}

/// One parsed clause of a filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pattern: String,
    mode: MatchMode,
    negated: bool,
}

impl FilterRule {
    fn parse(clause: &str) -> Self {
        let (negated, rest) = match clause.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, clause),
        };
        // A trailing `*` wins over a leading one, so `*foo*` is a prefix
        // clause whose pattern keeps its leading `*`.
        let (mode, pattern) = if let Some(pattern) = rest.strip_suffix('*') {
            (MatchMode::Prefix, pattern)
        } else if let Some(pattern) = rest.strip_prefix('*') {
            (MatchMode::Suffix, pattern)
        } else {
            (MatchMode::Full, rest)
        };
        Self {
            pattern: pattern.to_owned(),
            mode,
            negated,
        }
    }

    fn is_match(&self, path: &str) -> bool {
        match self.mode {
            MatchMode::Full => path == self.pattern,
            MatchMode::Prefix => path.starts_with(&self.pattern),
            MatchMode::Suffix => path.ends_with(&self.pattern),
        }
    }
}

/// A parsed filter expression: an ordered list of [`FilterRule`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSet {
    expr: String,
    rules: Vec<FilterRule>,
}

impl FilterSet {
    /// Parse a comma-separated filter expression. Parsing never fails;
    /// degenerate clauses keep the matching behavior their shape implies
    /// (a lone `*` matches everything, an empty clause matches nothing).
    pub fn parse(expr: &str) -> Self {
        let rules: Vec<_> = expr.split(',').map(FilterRule::parse).collect();
        debug!("parsed {} filter clause(s) from {expr:?}", rules.len());
        Self {
            expr: expr.to_owned(),
            rules,
        }
    }

    /// The expression this set was parsed from.
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate a candidate path against every clause. A matching negated
    /// clause excludes immediately; otherwise at least one positive clause
    /// must have matched.
    pub fn is_match(&self, path: &str) -> bool {
        let mut matched = false;
        for rule in &self.rules {
            if rule.is_match(path) {
                if rule.negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn rule(pattern: &str, mode: MatchMode, negated: bool) -> FilterRule {
        FilterRule {
            pattern: pattern.to_owned(),
            mode,
            negated,
        }
    }

    #[test]
    fn parses_modes_and_negation() {
        let set = FilterSet::parse("a/b,foo*,*bar,~x*,~*y,~z");
        assert_eq!(
            set.rules,
            vec![
                rule("a/b", MatchMode::Full, false),
                rule("foo", MatchMode::Prefix, false),
                rule("bar", MatchMode::Suffix, false),
                rule("x", MatchMode::Prefix, true),
                rule("y", MatchMode::Suffix, true),
                rule("z", MatchMode::Full, true),
            ]
        );
    }

    #[test]
    fn full_prefix_suffix_grid() {
        assert!(FilterSet::parse("a/b").is_match("a/b"));
        assert!(FilterSet::parse("a/*").is_match("a/b"));
        assert!(FilterSet::parse("*b").is_match("a/b"));

        assert!(!FilterSet::parse("a/c").is_match("a/b"));
        assert!(!FilterSet::parse("x/*").is_match("a/b"));
        assert!(!FilterSet::parse("*/c").is_match("a/b"));
    }

    #[test]
    fn negated_match_wins_over_positive_matches() {
        let set = FilterSet::parse("foo*,~foo/bad");
        assert!(set.is_match("foo/ok"));
        assert!(!set.is_match("foo/bad"));
    }

    #[test]
    fn lone_star_matches_everything() {
        let set = FilterSet::parse("*");
        assert!(set.is_match("anything"));
        assert!(set.is_match("a/b/c"));

        // and its negation excludes everything
        let set = FilterSet::parse("a*,~*");
        assert!(!set.is_match("a/b"));
    }

    #[test]
    fn empty_expression_matches_no_real_path() {
        let set = FilterSet::parse("");
        assert_eq!(set.len(), 1);
        assert!(!set.is_match("a/b"));
        assert!(!set.is_match("a"));
        // the empty full-mode pattern only equals the empty path, which the
        // runner never produces
        assert!(set.is_match(""));
    }

    #[test]
    fn star_on_both_ends_is_prefix_with_literal_star() {
        let set = FilterSet::parse("*foo*");
        assert_eq!(set.rules, vec![rule("*foo", MatchMode::Prefix, false)]);
        assert!(set.is_match("*foo/bar"));
        assert!(!set.is_match("xfoo/bar"));
    }

    #[test]
    fn clauses_are_not_whitespace_trimmed() {
        let set = FilterSet::parse(" a/b");
        assert!(!set.is_match("a/b"));
        assert!(set.is_match(" a/b"));
    }

    #[test]
    fn tilde_alone_is_a_negated_empty_clause() {
        let set = FilterSet::parse("a/b,~");
        assert!(set.is_match("a/b"));
    }
}
