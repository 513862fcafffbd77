//! Skip-domain matcher using the Aho-Corasick algorithm
//!
//! Domains matched here are exempt from fake-IP assignment: in virtual mode
//! the DNS server forwards (or refuses) them instead of synthesizing an
//! answer. Four rule kinds are supported:
//!
//! - **Exact match**: O(1) hash lookup
//! - **Suffix match**: O(n) where n is domain length (Aho-Corasick)
//! - **Keyword match**: O(n) substring search (Aho-Corasick)
//! - **Regex match**: O(n*m) where m is pattern complexity
//!
//! # Pattern syntax
//!
//! [`DomainMatcherBuilder::add_pattern`] accepts the strings used in the
//! `skip_domains` configuration list:
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `full:example.com` | `example.com` only |
//! | `domain:example.com`, `+.example.com` | `example.com` and all subdomains |
//! | `.example.com` | subdomains of `example.com`, not the name itself |
//! | `*.example.com` | exactly one label below `example.com` |
//! | `keyword:ads` | any name containing `ads` |
//! | `regexp:^ad[0-9]+\.` | names matching the regex |
//! | `example.com` | `example.com` only |
//!
//! # Example
//!
//! ```
//! use tun_dns::rules::domain::DomainMatcher;
//!
//! let matcher = DomainMatcher::builder()
//!     .add_exact("example.com")
//!     .add_suffix("lan")
//!     .add_keyword("ads")
//!     .build()
//!     .unwrap();
//!
//! assert!(matcher.is_match("example.com"));
//! assert!(matcher.is_match("printer.lan."));
//! assert!(matcher.is_match("ads.example.org"));
//! assert!(!matcher.is_match("www.example.com"));
//! ```

use std::collections::HashSet;

use aho_corasick::AhoCorasick;
use regex::Regex;

use crate::error::RuleError;

/// Domain matcher supporting multiple match types
///
/// A domain is matched if any rule of any kind matches. Names are compared
/// case-insensitively with the trailing root dot ignored.
#[derive(Debug)]
pub struct DomainMatcher {
    /// Exact domains (O(1) lookup)
    exact_domains: HashSet<String>,

    /// Aho-Corasick automaton over reversed suffix patterns
    suffix_automaton: Option<AhoCorasick>,
    /// Reversed suffix patterns with a leading dot, indexed by pattern ID
    suffix_patterns: Vec<String>,

    /// Aho-Corasick automaton for keyword matching
    keyword_automaton: Option<AhoCorasick>,

    /// Compiled regex patterns
    regex_patterns: Vec<Regex>,

    /// Total count of all rules
    rule_count: usize,
}

impl DomainMatcher {
    /// Create a new builder for constructing a `DomainMatcher`
    #[must_use]
    pub fn builder() -> DomainMatcherBuilder {
        DomainMatcherBuilder::new()
    }

    /// Create a matcher that matches nothing
    #[must_use]
    pub fn empty() -> Self {
        Self {
            exact_domains: HashSet::new(),
            suffix_automaton: None,
            suffix_patterns: Vec::new(),
            keyword_automaton: None,
            regex_patterns: Vec::new(),
            rule_count: 0,
        }
    }

    /// Build a matcher from configuration pattern strings
    ///
    /// # Errors
    ///
    /// Returns `RuleError` if a pattern is malformed or a regex fails to compile.
    ///
    /// # Example
    ///
    /// ```
    /// use tun_dns::rules::domain::DomainMatcher;
    ///
    /// let matcher = DomainMatcher::from_patterns(["+.lan", "*.corp.example"]).unwrap();
    /// assert!(matcher.is_match("nas.lan"));
    /// assert!(matcher.is_match("git.corp.example"));
    /// assert!(!matcher.is_match("a.git.corp.example"));
    /// ```
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = DomainMatcherBuilder::new();
        for pattern in patterns {
            builder = builder.add_pattern(pattern.as_ref())?;
        }
        builder.build()
    }

    /// Check a domain against all rules
    #[must_use]
    pub fn is_match(&self, domain: &str) -> bool {
        let domain = domain.trim_end_matches('.');
        if domain.is_empty() || self.rule_count == 0 {
            return false;
        }

        let domain_lower = domain.to_ascii_lowercase();

        self.exact_domains.contains(&domain_lower)
            || self.match_suffix(&domain_lower)
            || self.match_keyword(&domain_lower)
            || self.match_regex(&domain_lower)
    }

    /// Match using suffix patterns
    ///
    /// Pattern "google.com" is stored as ".moc.elgoog" and the domain
    /// "mail.google.com" is searched as ".moc.elgoog.liam". A hit anchored at
    /// position 0 that ends on a label boundary is a suffix match.
    fn match_suffix(&self, domain: &str) -> bool {
        let Some(automaton) = self.suffix_automaton.as_ref() else {
            return false;
        };

        let reversed: String = format!(".{}", domain.chars().rev().collect::<String>());

        automaton.find_overlapping_iter(&reversed).any(|mat| {
            let pattern = &self.suffix_patterns[mat.pattern().as_usize()];
            let end = mat.end();
            mat.start() == 0
                && pattern.len() == mat.len()
                && (end == reversed.len() || reversed.as_bytes().get(end) == Some(&b'.'))
        })
    }

    fn match_keyword(&self, domain: &str) -> bool {
        self.keyword_automaton
            .as_ref()
            .is_some_and(|automaton| automaton.is_match(domain))
    }

    fn match_regex(&self, domain: &str) -> bool {
        self.regex_patterns.iter().any(|regex| regex.is_match(domain))
    }

    /// Check if the matcher has any rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rule_count == 0
    }

    /// Get the total number of rules
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }
}

impl Default for DomainMatcher {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builder for constructing a `DomainMatcher`
#[derive(Debug, Default)]
pub struct DomainMatcherBuilder {
    exact: Vec<String>,
    suffix: Vec<String>,
    keyword: Vec<String>,
    regex: Vec<Regex>,
}

impl DomainMatcherBuilder {
    /// Create a new empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exact domain rule (case-insensitive)
    #[must_use]
    pub fn add_exact(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        self.exact
            .push(domain.trim_end_matches('.').to_ascii_lowercase());
        self
    }

    /// Add a suffix rule
    ///
    /// The suffix "google.com" matches "google.com" and "www.google.com" but
    /// not "notgoogle.com".
    #[must_use]
    pub fn add_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into().to_ascii_lowercase();
        let suffix = suffix.trim_start_matches('.').trim_end_matches('.').to_string();
        self.suffix.push(suffix);
        self
    }

    /// Add a keyword (substring) rule
    #[must_use]
    pub fn add_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword.push(keyword.into().to_ascii_lowercase());
        self
    }

    /// Add a regex rule, matched against the lowercased name without trailing dot
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidRegex` if the pattern is invalid.
    pub fn add_regex(mut self, pattern: impl Into<String>) -> Result<Self, RuleError> {
        let pattern = pattern.into();
        let regex = Regex::new(&pattern).map_err(|_| RuleError::InvalidRegex(pattern.clone()))?;
        self.regex.push(regex);
        Ok(self)
    }

    /// Add a rule from its configuration string form
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPattern` for empty patterns and
    /// `RuleError::InvalidRegex` for bad `regexp:` rules.
    pub fn add_pattern(self, pattern: &str) -> Result<Self, RuleError> {
        let pattern = pattern.trim();
        let invalid = || RuleError::InvalidPattern(pattern.to_string());

        if let Some(rest) = pattern.strip_prefix("regexp:") {
            if rest.is_empty() {
                return Err(invalid());
            }
            return self.add_regex(rest);
        }

        let (kind, value) = if let Some(rest) = pattern.strip_prefix("full:") {
            (PatternKind::Exact, rest)
        } else if let Some(rest) = pattern.strip_prefix("domain:") {
            (PatternKind::Suffix, rest)
        } else if let Some(rest) = pattern.strip_prefix("keyword:") {
            (PatternKind::Keyword, rest)
        } else if let Some(rest) = pattern.strip_prefix("+.") {
            (PatternKind::Suffix, rest)
        } else if let Some(rest) = pattern.strip_prefix("*.") {
            (PatternKind::SingleLabel, rest)
        } else if let Some(rest) = pattern.strip_prefix('.') {
            (PatternKind::Subdomain, rest)
        } else {
            (PatternKind::Exact, pattern)
        };

        let value = value.trim_end_matches('.');
        if value.is_empty() {
            return Err(invalid());
        }

        Ok(match kind {
            PatternKind::Exact => self.add_exact(value),
            PatternKind::Suffix => self.add_suffix(value),
            PatternKind::Keyword => self.add_keyword(value),
            PatternKind::SingleLabel => {
                let escaped = regex::escape(&value.to_ascii_lowercase());
                self.add_regex(format!(r"^[^.]+\.{escaped}$"))?
            }
            PatternKind::Subdomain => {
                let escaped = regex::escape(&value.to_ascii_lowercase());
                self.add_regex(format!(r"^.+\.{escaped}$"))?
            }
        })
    }

    /// Compile all rules into a `DomainMatcher`
    ///
    /// # Errors
    ///
    /// Returns `RuleError::CompilationError` if an automaton fails to build.
    pub fn build(self) -> Result<DomainMatcher, RuleError> {
        let rule_count = self.rule_count();

        let exact_domains: HashSet<String> = self.exact.into_iter().collect();

        let (suffix_automaton, suffix_patterns) = if self.suffix.is_empty() {
            (None, Vec::new())
        } else {
            // "google.com" -> ".moc.elgoog"
            let patterns: Vec<String> = self
                .suffix
                .iter()
                .map(|suffix| format!(".{}", suffix.chars().rev().collect::<String>()))
                .collect();

            let automaton = AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(&patterns)
                .map_err(|e| RuleError::CompilationError(format!("suffix automaton: {e}")))?;

            (Some(automaton), patterns)
        };

        let keyword_automaton = if self.keyword.is_empty() {
            None
        } else {
            let automaton = AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(&self.keyword)
                .map_err(|e| RuleError::CompilationError(format!("keyword automaton: {e}")))?;
            Some(automaton)
        };

        Ok(DomainMatcher {
            exact_domains,
            suffix_automaton,
            suffix_patterns,
            keyword_automaton,
            regex_patterns: self.regex,
            rule_count,
        })
    }

    /// Get the total number of rules added
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.exact.len() + self.suffix.len() + self.keyword.len() + self.regex.len()
    }
}

enum PatternKind {
    Exact,
    Suffix,
    Keyword,
    SingleLabel,
    Subdomain,
}
