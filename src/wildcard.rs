//! Name normalization and wildcard matching for agent options.
//!
//! Option strings carry `:`-separated lists of glob patterns over class
//! or loader names. Patterns support `*` (any number of characters) and
//! `?` (exactly one character) and must match the whole input. The list
//! is compiled once at agent start into a single anchored regex, so the
//! per-class match on the class-loading hot path allocates nothing.

use regex::Regex;
use thiserror::Error;

use crate::ExceptionLogger;

/// Converts a dotted name to the internal (VM) form, e.g.
/// `java.util.Map` to `java/util/Map`.
pub fn to_vm_name(src_name: &str) -> String {
    src_name.replace('.', "/")
}

/// Diagnostic raised when an option string still uses the legacy `|`
/// list separator.
#[derive(Debug, Error)]
#[error(
    "usage of '|' as a list separator for agent options is deprecated \
     and will not work in future versions - use ':' instead: {expression}"
)]
pub struct SeparatorDeprecation {
    /// The offending option string.
    pub expression: String,
}

/// Rewrites the legacy `|` separator to `:`.
///
/// Emits one [`SeparatorDeprecation`] through `logger` per option string
/// that contains at least one `|`, then replaces every occurrence.
/// Strings without `|` pass through unchanged and silently.
pub fn normalize_separators(expression: &str, logger: &dyn ExceptionLogger) -> String {
    if expression.contains('|') {
        logger.log_exception(&SeparatorDeprecation {
            expression: expression.to_string(),
        });
        expression.replace('|', ":")
    } else {
        expression.to_string()
    }
}

/// Matcher for a `:`-separated list of `*`/`?` glob patterns.
///
/// [`WildcardMatcher::matches`] returns true iff at least one pattern
/// matches the entire input. An empty expression matches nothing.
#[derive(Debug, Clone)]
pub struct WildcardMatcher {
    pattern: Option<Regex>,
}

impl WildcardMatcher {
    /// Compiles `expression` into a matcher.
    pub fn new(expression: &str) -> Self {
        if expression.trim().is_empty() {
            return Self { pattern: None };
        }
        let mut source = String::from(r"\A(?:");
        for (i, part) in expression.split(':').enumerate() {
            if i > 0 {
                source.push('|');
            }
            to_regex(&mut source, part);
        }
        source.push_str(r")\z");
        // The translation only emits escaped literals, `.` and `.*`.
        // A compile failure here is a bug in to_regex and must not
        // masquerade as an empty pattern list.
        let pattern = Regex::new(&source)
            .unwrap_or_else(|e| panic!("glob translation produced an invalid regex: {e}"));
        Self {
            pattern: Some(pattern),
        }
    }

    /// True iff at least one pattern matches all of `s`.
    pub fn matches(&self, s: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(s))
    }
}

fn to_regex(out: &mut String, glob: &str) {
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if c.is_ascii_punctuation() => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}
