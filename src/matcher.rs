//! # Protection Matcher
//!
//! Decides whether a request must carry a CSRF token, and under which
//! resource identifier its page token is stored.
//!
//! ## Decision algorithm
//!
//! 1. The query string is stripped; the path is otherwise compared against
//!    rules exactly as configured (no leading-slash normalization).
//! 2. Infrastructure paths registered by the script-serving collaborator
//!    are always unprotected.
//! 3. The baseline comes from the configured [`ProtectionMode`]; the rule
//!    sets are exception lists on top of it.
//! 4. Rules match by shape ([`RuleKind`]): exact equality beats everything
//!    and, in the protected set, returns immediately. Wildcard, extension
//!    and regex matches are tentative; any match in the unprotected set
//!    overrides a tentative protect.
//! 5. Method gating is independent: a method is protected unless the
//!    protected-method set is non-empty and excludes it, or the
//!    unprotected-method set includes it. Final protection is the AND of
//!    both decisions.
//!
//! ## Resource identifiers
//!
//! For literal and wildcard matches the resource identifier is the
//! canonicalized path. For a regex match it is the *rule string itself*, so
//! every path one regex accepts shares a single page-token slot.

use crate::config::{CsrfConfig, ProtectionMode};
use crate::error::Result;
use crate::rules::{self, RuleKind};
use dashmap::{DashMap, DashSet};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Output of a protection decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionResult {
    /// Whether the request must carry a valid token.
    pub protected: bool,
    /// Canonical key for the resource's page token.
    pub resource_id: String,
}

/// Decides protection for request paths and methods.
///
/// Holds the compiled-regex cache (first writer wins per pattern) and the
/// infrastructure allow-list. Cheap to share behind an `Arc`; `decide` is
/// lock-free on the read path apart from cache shard access.
pub struct ProtectionMatcher {
    config: Arc<CsrfConfig>,
    regex_cache: DashMap<String, Regex>,
    infrastructure: DashSet<String>,
}

impl ProtectionMatcher {
    /// Build a matcher over the given configuration.
    ///
    /// Validates the configuration, including a compile check of every
    /// regex rule, so malformed rules fail here rather than on the first
    /// matching request.
    pub fn new(config: Arc<CsrfConfig>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            regex_cache: DashMap::new(),
            infrastructure: DashSet::new(),
        })
    }

    /// Mark a path as engine infrastructure, always unprotected.
    ///
    /// Called by the script-serving collaborator with its own observed
    /// request paths.
    pub fn register_infrastructure(&self, path: impl Into<String>) {
        self.infrastructure.insert(path.into());
    }

    /// Decide protection for one request.
    pub fn decide(&self, request_path: &str, method: &str) -> ProtectionResult {
        let path = canonicalize(request_path);

        if self.infrastructure.contains(path) {
            debug!(path, "infrastructure path, unprotected");
            return ProtectionResult {
                protected: false,
                resource_id: path.to_string(),
            };
        }

        let path_decision = self.decide_path(path);
        let protected = path_decision.protected && self.method_protected(method);
        debug!(
            path,
            method,
            protected,
            resource_id = %path_decision.resource_id,
            "protection decision"
        );
        ProtectionResult {
            protected,
            resource_id: path_decision.resource_id,
        }
    }

    fn decide_path(&self, path: &str) -> ProtectionResult {
        let baseline = match self.config.protection_mode {
            ProtectionMode::AllExceptUnprotected => true,
            ProtectionMode::OnlyProtected => false,
        };

        // Protected set first: an exact match decides the outcome
        // irrespective of anything the unprotected set would say.
        let mut tentative: Option<ProtectionResult> = None;
        for rule in &self.config.protected_paths {
            match self.match_rule(rule, path) {
                Some(MatchStrength::Exact) => {
                    return ProtectionResult {
                        protected: true,
                        resource_id: path.to_string(),
                    };
                }
                Some(MatchStrength::Pattern { resource_id }) => {
                    if tentative.is_none() {
                        tentative = Some(ProtectionResult {
                            protected: true,
                            resource_id,
                        });
                    }
                }
                None => {}
            }
        }

        // Unprotected set: any match, of any kind, unprotects the resource.
        for rule in &self.config.unprotected_paths {
            if self.match_rule(rule, path).is_some() {
                return ProtectionResult {
                    protected: false,
                    resource_id: path.to_string(),
                };
            }
        }

        tentative.unwrap_or_else(|| ProtectionResult {
            protected: baseline,
            resource_id: path.to_string(),
        })
    }

    /// Match one rule against the path. Exact string equality is tried
    /// first for every rule shape; the shape-specific match follows.
    fn match_rule(&self, rule: &str, path: &str) -> Option<MatchStrength> {
        if rule == path {
            return Some(MatchStrength::Exact);
        }
        let matched = match rules::classify(rule) {
            RuleKind::Exact => false,
            RuleKind::PathWildcard => rules::path_wildcard_matches(rule, path),
            RuleKind::ExtensionWildcard => rules::extension_matches(rule, path),
            RuleKind::Regex => self
                .compiled(rule)
                .map(|re| rules::regex_matches(&re, path))
                .unwrap_or(false),
        };
        matched.then(|| MatchStrength::Pattern {
            resource_id: if rules::classify(rule) == RuleKind::Regex {
                rule.to_string()
            } else {
                path.to_string()
            },
        })
    }

    /// Fetch the compiled pattern for a regex rule, compiling and caching
    /// it on first use. Concurrent first uses may compile twice; the first
    /// stored value wins and every later reader observes that one.
    fn compiled(&self, rule: &str) -> Option<Regex> {
        if let Some(re) = self.regex_cache.get(rule) {
            return Some(re.value().clone());
        }
        match Regex::new(rule) {
            Ok(re) => {
                let entry = self.regex_cache.entry(rule.to_string()).or_insert(re);
                Some(entry.value().clone())
            }
            Err(e) => {
                // unreachable after CsrfConfig::validate, kept as a guard
                warn!(rule, error = %e, "regex rule failed to compile");
                None
            }
        }
    }

    fn method_protected(&self, method: &str) -> bool {
        let method = method.to_ascii_uppercase();
        if !self.config.protected_methods.is_empty()
            && !self.config.protected_methods.contains(&method)
        {
            return false;
        }
        if self.config.unprotected_methods.contains(&method) {
            return false;
        }
        true
    }
}

enum MatchStrength {
    Exact,
    Pattern { resource_id: String },
}

/// Strip the query string; everything else is compared as configured.
fn canonicalize(request_path: &str) -> &str {
    match request_path.find('?') {
        Some(idx) => &request_path[..idx],
        None => request_path,
    }
}
