use thiserror::Error;

/// Fatal errors raised by the CSRF engine.
///
/// Everything here terminates the current request's processing chain.
/// Recoverable validation failures are *not* errors; they are reported as
/// [`ValidationOutcome::Invalid`](crate::ValidationOutcome) values so the
/// caller can decide request disposition.
#[derive(Error, Debug)]
pub enum CsrfError {
    /// The secure random source could not produce token material.
    #[error("secure random source unavailable: {0}")]
    Generator(String),

    /// A rotation was requested for a token slot that does not own the
    /// verified token. Contract violation in the caller, never retried.
    #[error("rotation target does not own the verified token: {0}")]
    InvalidRotationTarget(String),

    /// A configured protection rule could not be compiled.
    #[error("invalid protection rule `{rule}`: {source}")]
    InvalidRule {
        rule: String,
        #[source]
        source: regex::Error,
    },

    /// Invalid construction parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The external session scope rejected a token attribute operation.
    #[error("session scope error: {0}")]
    Session(String),
}

pub type Result<T> = std::result::Result<T, CsrfError>;

/// Why a protected request failed validation.
///
/// All of these are recoverable at the caller level. For
/// [`MasterTokenMismatch`](MismatchKind::MasterTokenMismatch) and
/// [`PageTokenMismatch`](MismatchKind::PageTokenMismatch) the engine has
/// already regenerated the mismatched slot as a side effect, so a retried
/// legitimate request can succeed once it fetches a fresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MismatchKind {
    /// The actor has no master token yet.
    NoStoredToken,
    /// The request carries no token parameter or header at all.
    RequestTokenMissing,
    /// The presented token does not equal the stored master token.
    MasterTokenMismatch,
    /// The presented token does not equal the stored page token (nor the
    /// master fallback).
    PageTokenMismatch,
    /// The AJAX header token was empty or did not match the master token.
    MissingOrMismatched,
}

impl MismatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchKind::NoStoredToken => "no stored token",
            MismatchKind::RequestTokenMissing => "request token missing",
            MismatchKind::MasterTokenMismatch => "master token mismatch",
            MismatchKind::PageTokenMismatch => "page token mismatch",
            MismatchKind::MissingOrMismatched => "missing or mismatched token",
        }
    }
}

impl std::fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of verifying one protected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The presented token matched a stored token.
    Valid {
        /// The token value the request presented.
        used_token: String,
        /// Whether the match was against the master token (true) or a
        /// per-resource page token (false).
        was_master: bool,
    },
    /// The request failed validation; the mismatched slot may already have
    /// been regenerated, see [`MismatchKind`].
    Invalid(MismatchKind),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid { .. })
    }
}
