//! Path rewrite rules.
//!
//! # Directive Format
//! ```text
//! "<pattern>:<template>"      e.g. "/api/*:/$1"
//! ```
//! - `*` in the pattern captures a run of non-whitespace characters
//! - Everything else in the pattern is a regular expression
//! - `$1`, `$2`, ... in the template refer to the captures of the first match
//!
//! # Design Decisions
//! - Compiled once at construction, immutable afterwards
//! - Rules are kept in directive order so multi-rule rewrites are deterministic
//! - Directives without exactly one `:` are skipped, not rejected

use regex::Regex;

use crate::proxy::error::ConfigError;

const WILDCARD_GROUP: &str = r"(\S*)";

/// A compiled `pattern -> template` pair.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    template: String,
}

impl RewriteRule {
    /// Compile a single directive.
    ///
    /// Returns `Ok(None)` when the directive does not split into exactly
    /// a pattern and a template.
    pub fn parse(directive: &str) -> Result<Option<Self>, ConfigError> {
        let parts: Vec<&str> = directive.split(':').collect();
        let [pattern, template] = parts.as_slice() else {
            tracing::debug!(directive = %directive, "Skipping malformed rewrite directive");
            return Ok(None);
        };

        let pattern = Regex::new(&pattern.replace('*', WILDCARD_GROUP)).map_err(|source| {
            ConfigError::InvalidRewrite {
                directive: directive.to_string(),
                source,
            }
        })?;

        Ok(Some(Self {
            pattern,
            template: (*template).to_string(),
        }))
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Rewrite `path` if the pattern matches it anywhere.
    pub fn apply(&self, path: &str) -> Option<String> {
        let caps = self.pattern.captures(path)?;
        let values: Vec<&str> = caps
            .iter()
            .skip(1)
            .map(|m| m.map_or("", |m| m.as_str()))
            .collect();
        Some(expand(&self.template, &values))
    }
}

/// Compile directives in order, skipping malformed ones.
pub fn compile_rewrites<I, S>(directives: I) -> Result<Vec<RewriteRule>, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut rules = Vec::new();
    for directive in directives {
        if let Some(rule) = RewriteRule::parse(directive.as_ref())? {
            rules.push(rule);
        }
    }
    Ok(rules)
}

/// Run every rule over the progressively rewritten path.
///
/// Returns `None` when no rule matched.
pub fn rewrite_path(rules: &[RewriteRule], path: &str) -> Option<String> {
    let mut current: Option<String> = None;
    for rule in rules {
        let input = current.as_deref().unwrap_or(path);
        if let Some(rewritten) = rule.apply(input) {
            current = Some(rewritten);
        }
    }
    current
}

/// Substitute `$n` placeholders. Lower indices win on a shared prefix, so
/// `$10` reads as `$1` followed by `0`.
fn expand(template: &str, values: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        for (i, value) in values.iter().enumerate() {
            let placeholder = format!("${}", i + 1);
            if tail.starts_with(&placeholder) {
                out.push_str(value);
                rest = &tail[placeholder.len()..];
                continue 'scan;
            }
        }
        out.push('$');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}
