//! # Token Service
//!
//! Orchestrates validation and rotation over the token store, the data
//! model and the generator. Per request the state machine is:
//!
//! ```text
//! Unchecked -> (Unprotected | Protected)
//! Protected -> (Valid | Invalid)
//! Valid     -> (Rotated | Unrotated)     depending on configuration
//! ```
//!
//! The `Unprotected` branch is the [matcher](crate::matcher)'s decision and
//! never reaches the service. The service consumes the matcher's resource
//! identifier, the actor from the logical session, and the stored token
//! set, and produces a [`ValidationOutcome`].
//!
//! ## Strategies
//!
//! One [`TokenService`] contract, two concrete stores behind it, selected
//! at configuration time:
//!
//! - [`SessionTokenService`] — tokens live in the actor's own session
//!   scope ([`SessionTokenStore`]).
//! - [`KeyedTokenService`] — tokens live in a process-wide concurrent map
//!   ([`KeyedTokenStore`]), suited to credential-keyed actors.
//!
//! ## Self-healing
//!
//! A mismatch burns the stored slot: the engine regenerates the mismatched
//! master token, or every page token sharing the mismatched stored value,
//! before reporting `Invalid`. A legitimate client that refetches its
//! token afterwards succeeds; a forged request never learns more than
//! "invalid".

use crate::config::CsrfConfig;
use crate::error::{CsrfError, MismatchKind, Result, ValidationOutcome};
use crate::generator::TokenGenerator;
use crate::hooks::FailureHook;
use crate::request::CsrfRequest;
use crate::session::{LogicalSession, SessionScopes};
use crate::store::{KeyedTokenStore, SessionTokenStore, TokenStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Validation and rotation contract shared by both service strategies.
pub trait TokenService: Send + Sync {
    /// Verify a protected request against the stored token set.
    ///
    /// Invokes every registered failure hook exactly once before returning
    /// an `Invalid` outcome. Mismatched slots are regenerated as a side
    /// effect, see the module docs.
    fn verify(&self, request: &CsrfRequest, resource_id: &str) -> Result<ValidationOutcome>;

    /// Rotate the slot a successfully verified token belonged to.
    ///
    /// Contract: `outcome` must be the `Valid` result of a verification
    /// for `(actor, resource_id)`; rotating a slot that does not own the
    /// used token fails fast with
    /// [`CsrfError::InvalidRotationTarget`]. No-op when rotation is
    /// disabled.
    fn rotate_used(
        &self,
        actor: &str,
        resource_id: &str,
        outcome: &ValidationOutcome,
    ) -> Result<()>;

    /// Regenerate the master token and every page token, e.g. after a
    /// privilege escalation such as login.
    fn rotate_all(&self, actor: &str) -> Result<()>;

    /// The token value to embed for `resource_id`, creating it if needed.
    ///
    /// Always returns a usable value for any resource that will later be
    /// verified: the page token in per-resource mode, the master token
    /// otherwise.
    fn token_value(&self, actor: &str, resource_id: &str) -> Result<String>;

    /// The actor's master token, creating it if needed.
    fn master_token(&self, actor: &str) -> Result<String>;

    /// Actor session started; pre-creates the master token when
    /// configured.
    fn on_session_created(&self, actor: &str) -> Result<()>;

    /// Actor session ended; drops the actor's token set.
    fn on_session_destroyed(&self, actor: &str);
}

/// Token service over a pluggable store.
pub struct CsrfService<S: TokenStore> {
    config: Arc<CsrfConfig>,
    store: S,
    sessions: Arc<dyn LogicalSession>,
    hooks: Vec<Arc<dyn FailureHook>>,
}

/// Strategy A: tokens bound to the actor's own session scope.
pub type SessionTokenService = CsrfService<SessionTokenStore>;

/// Strategy B: tokens in a process-wide concurrent map.
pub type KeyedTokenService = CsrfService<KeyedTokenStore>;

impl CsrfService<SessionTokenStore> {
    /// Build the session-bound service.
    pub fn session_bound(
        config: Arc<CsrfConfig>,
        sessions: Arc<dyn LogicalSession>,
        scopes: Arc<dyn SessionScopes>,
    ) -> Result<Self> {
        config.validate()?;
        let generator = TokenGenerator::new(config.token_length);
        Ok(Self {
            store: SessionTokenStore::new(scopes, generator),
            config,
            sessions,
            hooks: Vec::new(),
        })
    }
}

impl CsrfService<KeyedTokenStore> {
    /// Build the custom-keyed service with its process-wide store.
    pub fn custom(config: Arc<CsrfConfig>, sessions: Arc<dyn LogicalSession>) -> Result<Self> {
        config.validate()?;
        let generator = TokenGenerator::new(config.token_length);
        Ok(Self {
            store: KeyedTokenStore::new(generator),
            config,
            sessions,
            hooks: Vec::new(),
        })
    }
}

impl<S: TokenStore> CsrfService<S> {
    /// Build a service over an externally constructed store.
    pub fn with_store(
        config: Arc<CsrfConfig>,
        sessions: Arc<dyn LogicalSession>,
        store: S,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            sessions,
            hooks: Vec::new(),
        })
    }

    /// Register a failure hook. Hooks run in registration order, each
    /// exactly once per failed verification.
    pub fn with_failure_hook(mut self, hook: Arc<dyn FailureHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Verify and, on success with rotation enabled, rotate the used slot.
    ///
    /// The call the request filter makes for each protected request.
    pub fn verify_and_rotate(
        &self,
        request: &CsrfRequest,
        resource_id: &str,
    ) -> Result<ValidationOutcome> {
        let outcome = self.verify(request, resource_id)?;
        if outcome.is_valid() && self.config.rotation_enabled {
            if let Some(actor) = self.sessions.extract(request) {
                self.rotate_used(&actor, resource_id, &outcome)?;
            }
        }
        Ok(outcome)
    }

    fn fail(&self, request: &CsrfRequest, reason: MismatchKind) -> ValidationOutcome {
        warn!(
            method = %request.method,
            path = %request.path,
            reason = %reason,
            "request rejected"
        );
        for hook in &self.hooks {
            hook.on_failure(request, reason);
        }
        ValidationOutcome::Invalid(reason)
    }

    fn verify_master(
        &self,
        request: &CsrfRequest,
        actor: &str,
        presented: &str,
        master: &str,
    ) -> Result<ValidationOutcome> {
        if presented == master {
            debug!(actor, "master token verified");
            return Ok(ValidationOutcome::Valid {
                used_token: presented.to_string(),
                was_master: true,
            });
        }
        // burn the mismatched slot so a refetched token can succeed
        self.store.rotate_master(actor)?;
        Ok(self.fail(request, MismatchKind::MasterTokenMismatch))
    }

    fn verify_page(
        &self,
        request: &CsrfRequest,
        actor: &str,
        resource_id: &str,
        presented: &str,
        master: &str,
    ) -> Result<ValidationOutcome> {
        match self.store.page_token(actor, resource_id) {
            // First contact with this resource: bootstrap the page slot so
            // the next request can present it, and validate this request
            // against the master token. Never reported as a page-token
            // success.
            None => {
                self.store.page_token_or_create(actor, resource_id)?;
                debug!(actor, resource_id, "page token bootstrapped");
                self.verify_master(request, actor, presented, master)
            }
            Some(stored_page) => {
                if presented == stored_page {
                    debug!(actor, resource_id, "page token verified");
                    return Ok(ValidationOutcome::Valid {
                        used_token: presented.to_string(),
                        was_master: false,
                    });
                }
                if presented == master {
                    // stale page token but a valid master: accept as a
                    // master-token validation
                    debug!(actor, resource_id, "master fallback verified");
                    return Ok(ValidationOutcome::Valid {
                        used_token: presented.to_string(),
                        was_master: true,
                    });
                }
                let replaced = self.store.regenerate_used_page(actor, &stored_page)?;
                debug!(actor, resource_id, replaced, "mismatched page value burned");
                Ok(self.fail(request, MismatchKind::PageTokenMismatch))
            }
        }
    }

    fn verify_ajax(
        &self,
        request: &CsrfRequest,
        actor: &str,
        header_value: &str,
        master: &str,
    ) -> Result<ValidationOutcome> {
        // the header may carry a comma-joined list; only the first element
        // counts
        let presented = header_value.split(',').next().unwrap_or("").trim();
        if presented.is_empty() {
            return Ok(self.fail(request, MismatchKind::MissingOrMismatched));
        }
        if presented == master {
            debug!(actor, "ajax token verified");
            return Ok(ValidationOutcome::Valid {
                used_token: presented.to_string(),
                was_master: true,
            });
        }
        Ok(self.fail(request, MismatchKind::MissingOrMismatched))
    }
}

impl<S: TokenStore> TokenService for CsrfService<S> {
    fn verify(&self, request: &CsrfRequest, resource_id: &str) -> Result<ValidationOutcome> {
        let Some(actor) = self.sessions.extract(request) else {
            return Ok(self.fail(request, MismatchKind::NoStoredToken));
        };
        let Some(master) = self.store.stored_master(&actor) else {
            return Ok(self.fail(request, MismatchKind::NoStoredToken));
        };

        if self.config.ajax_enabled {
            if let Some(header_value) = request.header(&self.config.header_name) {
                return self.verify_ajax(request, &actor, header_value, &master);
            }
        }

        let Some(presented) = request.token_candidate(&self.config.field_name) else {
            return Ok(self.fail(request, MismatchKind::RequestTokenMissing));
        };

        if self.config.per_page_tokens {
            self.verify_page(request, &actor, resource_id, &presented, &master)
        } else {
            self.verify_master(request, &actor, &presented, &master)
        }
    }

    fn rotate_used(
        &self,
        actor: &str,
        resource_id: &str,
        outcome: &ValidationOutcome,
    ) -> Result<()> {
        if !self.config.rotation_enabled {
            return Ok(());
        }
        match outcome {
            ValidationOutcome::Valid {
                used_token,
                was_master: true,
            } => match self.store.stored_master(actor) {
                Some(master) if master == *used_token => {
                    self.store.rotate_master(actor)?;
                    Ok(())
                }
                _ => Err(CsrfError::InvalidRotationTarget(
                    "master slot does not hold the verified token".to_string(),
                )),
            },
            ValidationOutcome::Valid {
                used_token,
                was_master: false,
            } => match self.store.page_token(actor, resource_id) {
                Some(page) if page == *used_token => {
                    self.store.rotate_page(actor, resource_id)?;
                    Ok(())
                }
                _ => Err(CsrfError::InvalidRotationTarget(format!(
                    "page slot {resource_id} does not hold the verified token"
                ))),
            },
            ValidationOutcome::Invalid(_) => Err(CsrfError::InvalidRotationTarget(
                "cannot rotate after a failed validation".to_string(),
            )),
        }
    }

    fn rotate_all(&self, actor: &str) -> Result<()> {
        self.store.rotate_all(actor)
    }

    fn token_value(&self, actor: &str, resource_id: &str) -> Result<String> {
        if self.config.per_page_tokens {
            self.store.page_token_or_create(actor, resource_id)
        } else {
            self.store.master_token(actor)
        }
    }

    fn master_token(&self, actor: &str) -> Result<String> {
        self.store.master_token(actor)
    }

    fn on_session_created(&self, actor: &str) -> Result<()> {
        if self.config.pre_create_tokens {
            self.store.master_token(actor)?;
            debug!(actor, "tokens pre-created at session start");
        }
        Ok(())
    }

    fn on_session_destroyed(&self, actor: &str) {
        self.store.remove(actor);
    }
}
