//! Protection rule classification and matching.
//!
//! A configured rule string is one of four shapes, classified once by
//! [`classify`]:
//!
//! - exact path (`/admin/delete.html`)
//! - path wildcard (`/admin/*`, or bare `/*` matching everything)
//! - extension wildcard (`*.do`)
//! - regular expression (`^/user/[0-9]+/edit$` — anchored with `^` and `$`)
//!
//! Matching a rule against a path always tries exact string equality first;
//! equality is the strongest signal regardless of the rule's shape.

use regex::Regex;

/// Shape of a configured protection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Matches only the identical path string.
    Exact,
    /// `prefix/*` — matches the prefix itself and anything below it.
    PathWildcard,
    /// `*.ext` — matches paths whose last `.`-suffix equals the rule's.
    ExtensionWildcard,
    /// `^...$` — matches paths the compiled pattern accepts in full.
    Regex,
}

/// Classify a rule string by shape. Pure, no compilation.
pub fn classify(rule: &str) -> RuleKind {
    if rule == "/*" || rule.ends_with("/*") {
        RuleKind::PathWildcard
    } else if rule.starts_with("*.") {
        RuleKind::ExtensionWildcard
    } else if is_regex_rule(rule) {
        RuleKind::Regex
    } else {
        RuleKind::Exact
    }
}

/// The syntax predicate separating regex rules from literals: a regex rule
/// is anchored on both ends.
pub fn is_regex_rule(rule: &str) -> bool {
    rule.len() > 1 && rule.starts_with('^') && rule.ends_with('$')
}

/// Match a path-wildcard rule. `/admin/*` matches `/admin`, `/admin/` and
/// `/admin/anything`, but not `/administrator`.
pub fn path_wildcard_matches(rule: &str, path: &str) -> bool {
    if rule == "/*" {
        return true;
    }
    // rule is `<prefix>/*`
    let prefix = &rule[..rule.len() - 2];
    path == prefix || path.starts_with(&rule[..rule.len() - 1])
}

/// Match an extension-wildcard rule. `*.do` matches `/edit.do` but not
/// `/edit.do/x`, `/edit.` or `/do`.
pub fn extension_matches(rule: &str, path: &str) -> bool {
    let suffix = &rule[1..]; // ".ext"
    match path.rfind('.') {
        Some(dot) => dot + 1 < path.len() && &path[dot..] == suffix,
        None => false,
    }
}

/// Match a compiled regex rule against the whole path.
pub fn regex_matches(compiled: &Regex, path: &str) -> bool {
    compiled.is_match(path)
}
