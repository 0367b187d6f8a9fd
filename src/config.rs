use crate::error::{CsrfError, Result};
use crate::rules::{self, RuleKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default number of random bytes per token.
pub const DEFAULT_TOKEN_LENGTH: usize = 32;

/// Minimum accepted token length in bytes.
pub const MIN_TOKEN_LENGTH: usize = 8;

/// Which rule set is the exception list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtectionMode {
    /// Every resource is protected unless an unprotected rule matches.
    AllExceptUnprotected,
    /// No resource is protected unless a protected rule matches.
    OnlyProtected,
}

impl Default for ProtectionMode {
    fn default() -> Self {
        ProtectionMode::AllExceptUnprotected
    }
}

/// CSRF engine configuration.
///
/// An explicit configuration object injected into the matcher and token
/// service at construction; there is no ambient global lookup. Rule and
/// method sets are read-only once the engine is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Random bytes per generated token.
    pub token_length: usize,

    /// Rotate a token after each successful validation.
    pub rotation_enabled: bool,

    /// Issue one token per (actor, resource) pair instead of validating
    /// everything against the master token.
    pub per_page_tokens: bool,

    /// Accept the token from the AJAX request header.
    pub ajax_enabled: bool,

    /// Request parameter / form field carrying the token.
    pub field_name: String,

    /// Request header carrying the token in AJAX mode.
    pub header_name: String,

    /// Baseline protection decision when no rule matches.
    pub protection_mode: ProtectionMode,

    /// Rules whose match makes a resource protected.
    pub protected_paths: Vec<String>,

    /// Rules whose match makes a resource unprotected.
    pub unprotected_paths: Vec<String>,

    /// If non-empty, only these methods are protected.
    pub protected_methods: HashSet<String>,

    /// If non-empty, these methods are never protected.
    pub unprotected_methods: HashSet<String>,

    /// Whether the surrounding filter should validate requests that carry
    /// no logical session. The engine itself reports `NoStoredToken` for
    /// session-less requests either way; this flag is the filter's call.
    pub validate_when_no_session: bool,

    /// Create the master token eagerly when an actor session starts.
    pub pre_create_tokens: bool,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_length: DEFAULT_TOKEN_LENGTH,
            rotation_enabled: false,
            per_page_tokens: false,
            ajax_enabled: false,
            field_name: "csrf_token".to_string(),
            header_name: "X-Csrf-Token".to_string(),
            protection_mode: ProtectionMode::default(),
            protected_paths: Vec::new(),
            unprotected_paths: Vec::new(),
            protected_methods: HashSet::new(),
            unprotected_methods: HashSet::new(),
            validate_when_no_session: false,
            pre_create_tokens: false,
        }
    }
}

impl CsrfConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token length in random bytes.
    pub fn with_token_length(mut self, length: usize) -> Self {
        self.token_length = length;
        self
    }

    /// Enable or disable post-validation rotation.
    pub fn with_rotation(mut self, enabled: bool) -> Self {
        self.rotation_enabled = enabled;
        self
    }

    /// Enable or disable per-resource page tokens.
    pub fn with_per_page_tokens(mut self, enabled: bool) -> Self {
        self.per_page_tokens = enabled;
        self
    }

    /// Enable or disable AJAX header validation.
    pub fn with_ajax(mut self, enabled: bool) -> Self {
        self.ajax_enabled = enabled;
        self
    }

    /// Set the token parameter / form field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Set the AJAX token header name.
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Set the baseline protection mode.
    pub fn with_protection_mode(mut self, mode: ProtectionMode) -> Self {
        self.protection_mode = mode;
        self
    }

    /// Add a rule to the protected set.
    pub fn protect_path(mut self, rule: impl Into<String>) -> Self {
        self.protected_paths.push(rule.into());
        self
    }

    /// Add a rule to the unprotected set.
    pub fn unprotect_path(mut self, rule: impl Into<String>) -> Self {
        self.unprotected_paths.push(rule.into());
        self
    }

    /// Restrict protection to the given methods.
    pub fn with_protected_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_methods = methods
            .into_iter()
            .map(|m| m.into().to_ascii_uppercase())
            .collect();
        self
    }

    /// Exempt the given methods from protection.
    pub fn with_unprotected_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unprotected_methods = methods
            .into_iter()
            .map(|m| m.into().to_ascii_uppercase())
            .collect();
        self
    }

    /// Set the validate-when-no-session flag.
    pub fn with_validate_when_no_session(mut self, enabled: bool) -> Self {
        self.validate_when_no_session = enabled;
        self
    }

    /// Eagerly create master tokens at session start.
    pub fn with_pre_create_tokens(mut self, enabled: bool) -> Self {
        self.pre_create_tokens = enabled;
        self
    }

    /// Check construction parameters and compile-check every regex rule.
    ///
    /// Called by the matcher and service constructors so a bad rule fails
    /// at build time, not on the first matching request.
    pub fn validate(&self) -> Result<()> {
        if self.token_length < MIN_TOKEN_LENGTH {
            return Err(CsrfError::Config(format!(
                "token length {} is below the minimum of {} bytes",
                self.token_length, MIN_TOKEN_LENGTH
            )));
        }
        if self.field_name.is_empty() {
            return Err(CsrfError::Config("token field name is empty".to_string()));
        }
        if self.ajax_enabled && self.header_name.is_empty() {
            return Err(CsrfError::Config(
                "ajax mode enabled but token header name is empty".to_string(),
            ));
        }
        for rule in self.protected_paths.iter().chain(&self.unprotected_paths) {
            if rules::classify(rule) == RuleKind::Regex {
                Regex::new(rule).map_err(|source| CsrfError::InvalidRule {
                    rule: rule.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}
