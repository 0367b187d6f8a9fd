//! # Token Store
//!
//! Owns the `actor -> TokenSet` mapping behind the [`TokenStore`]
//! abstraction, with two concrete strategies:
//!
//! - [`KeyedTokenStore`] — a process-wide concurrent map, independent of
//!   any session object. Suits stateless or credential-keyed actor
//!   identification.
//! - [`SessionTokenStore`] — the token set lives as an attribute inside the
//!   actor's own session scope and expires with it.
//!
//! Every mutating operation on one actor's tokens is linearizable: the
//! keyed store serializes through the concurrent map's per-entry locking,
//! the session store through a per-actor lock registry wrapped around the
//! external scope's read-modify-write. Distinct actors never block each
//! other (shard-level contention aside).

use crate::error::{CsrfError, Result};
use crate::generator::TokenGenerator;
use crate::session::SessionScopes;
use crate::token::TokenSet;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Session attribute under which the token set is stored.
pub const TOKEN_ATTRIBUTE: &str = "palisade.csrf.tokens";

/// Storage abstraction for per-actor token sets.
pub trait TokenStore: Send + Sync {
    /// The actor's master token, generating and storing one atomically if
    /// absent. Concurrent callers for a new actor observe one value.
    fn master_token(&self, actor: &str) -> Result<String>;

    /// The actor's master token without creating one.
    fn stored_master(&self, actor: &str) -> Option<String>;

    /// The page token for `(actor, resource)`, if present.
    fn page_token(&self, actor: &str, resource: &str) -> Option<String>;

    /// The page token for `(actor, resource)`, generating and storing one
    /// atomically if absent; the master token is created first when the
    /// actor has none. Never yields two different values for one pair
    /// under concurrent first access.
    fn page_token_or_create(&self, actor: &str, resource: &str) -> Result<String>;

    /// Replace the master token with a fresh value.
    fn rotate_master(&self, actor: &str) -> Result<String>;

    /// Replace the page token for `resource` with a fresh value. Fails
    /// with [`CsrfError::InvalidRotationTarget`] if the slot does not
    /// exist.
    fn rotate_page(&self, actor: &str, resource: &str) -> Result<String>;

    /// Regenerate the master token and every page token. No-op for an
    /// actor with no tokens.
    fn rotate_all(&self, actor: &str) -> Result<()>;

    /// Replace every page token whose value equals `used_value`; returns
    /// the number of replaced entries.
    fn regenerate_used_page(&self, actor: &str, used_value: &str) -> Result<usize>;

    /// Drop the actor's token set entirely (logout / invalidation).
    fn remove(&self, actor: &str);
}

// ============================================================================
// Strategy B: process-wide concurrent map
// ============================================================================

/// Process-wide token store over a concurrent map.
pub struct KeyedTokenStore {
    tokens: DashMap<String, TokenSet>,
    generator: TokenGenerator,
}

impl KeyedTokenStore {
    pub fn new(generator: TokenGenerator) -> Self {
        Self {
            tokens: DashMap::new(),
            generator,
        }
    }

    /// Number of actors currently holding tokens.
    pub fn actors(&self) -> usize {
        self.tokens.len()
    }
}

impl TokenStore for KeyedTokenStore {
    fn master_token(&self, actor: &str) -> Result<String> {
        let mut entry = self.tokens.entry(actor.to_string()).or_default();
        if let Some(master) = entry.master() {
            return Ok(master.to_string());
        }
        let value = self.generator.generate()?;
        entry.set_master(value.clone());
        debug!(actor, "master token created");
        Ok(value)
    }

    fn stored_master(&self, actor: &str) -> Option<String> {
        self.tokens
            .get(actor)
            .and_then(|set| set.master().map(str::to_string))
    }

    fn page_token(&self, actor: &str, resource: &str) -> Option<String> {
        self.tokens
            .get(actor)
            .and_then(|set| set.page(resource).map(str::to_string))
    }

    fn page_token_or_create(&self, actor: &str, resource: &str) -> Result<String> {
        let mut entry = self.tokens.entry(actor.to_string()).or_default();
        if entry.master().is_none() {
            let value = self.generator.generate()?;
            entry.set_master(value);
        }
        entry.page_or_create(resource, &self.generator)
    }

    fn rotate_master(&self, actor: &str) -> Result<String> {
        let mut entry = self.tokens.entry(actor.to_string()).or_default();
        let value = self.generator.generate()?;
        entry.set_master(value.clone());
        debug!(actor, "master token rotated");
        Ok(value)
    }

    fn rotate_page(&self, actor: &str, resource: &str) -> Result<String> {
        let mut entry = self.tokens.get_mut(actor).ok_or_else(|| {
            CsrfError::InvalidRotationTarget(format!("no token set for actor {actor}"))
        })?;
        if entry.page(resource).is_none() {
            return Err(CsrfError::InvalidRotationTarget(format!(
                "no page token for resource {resource}"
            )));
        }
        let value = self.generator.generate()?;
        entry.set_page(resource.to_string(), value.clone());
        debug!(actor, resource, "page token rotated");
        Ok(value)
    }

    fn rotate_all(&self, actor: &str) -> Result<()> {
        if let Some(mut entry) = self.tokens.get_mut(actor) {
            if entry.master().is_some() {
                let value = self.generator.generate()?;
                entry.set_master(value);
            }
            entry.rotate_all_pages(&self.generator)?;
            debug!(actor, "all tokens rotated");
        }
        Ok(())
    }

    fn regenerate_used_page(&self, actor: &str, used_value: &str) -> Result<usize> {
        match self.tokens.get_mut(actor) {
            Some(mut entry) => entry.regenerate_used_page(used_value, &self.generator),
            None => Ok(0),
        }
    }

    fn remove(&self, actor: &str) {
        self.tokens.remove(actor);
    }
}

// ============================================================================
// Strategy A: actor-session-bound
// ============================================================================

/// Token store riding on the actor's own session scope.
///
/// The external scope only offers whole-value get/set, so read-modify-write
/// cycles are serialized through a per-actor lock registry. Locks are
/// dropped together with the token set on [`TokenStore::remove`]. Expiry is
/// the session's concern; the store performs none of its own.
pub struct SessionTokenStore {
    scopes: Arc<dyn SessionScopes>,
    generator: TokenGenerator,
    attribute: String,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionTokenStore {
    pub fn new(scopes: Arc<dyn SessionScopes>, generator: TokenGenerator) -> Self {
        Self {
            scopes,
            generator,
            attribute: TOKEN_ATTRIBUTE.to_string(),
            locks: DashMap::new(),
        }
    }

    /// Store the token set under a different session attribute.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    fn actor_lock(&self, actor: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(actor.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn read(&self, scope: &dyn crate::session::SessionScope) -> TokenSet {
        match scope.get(&self.attribute) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(error = %e, "token attribute unreadable, starting fresh");
                TokenSet::new()
            }),
            None => TokenSet::new(),
        }
    }

    fn write(&self, scope: &dyn crate::session::SessionScope, set: &TokenSet) -> Result<()> {
        let value =
            serde_json::to_value(set).map_err(|e| CsrfError::Session(e.to_string()))?;
        scope.set(&self.attribute, value);
        Ok(())
    }
}

impl TokenStore for SessionTokenStore {
    fn master_token(&self, actor: &str) -> Result<String> {
        let lock = self.actor_lock(actor);
        let _guard = lock.lock().unwrap();
        let scope = self.scopes.scope_or_create(actor);
        let mut set = self.read(scope.as_ref());
        match set.master() {
            Some(master) => Ok(master.to_string()),
            None => {
                let value = self.generator.generate()?;
                set.set_master(value.clone());
                self.write(scope.as_ref(), &set)?;
                debug!(actor, "master token created");
                Ok(value)
            }
        }
    }

    fn stored_master(&self, actor: &str) -> Option<String> {
        let scope = self.scopes.scope(actor)?;
        self.read(scope.as_ref()).master().map(str::to_string)
    }

    fn page_token(&self, actor: &str, resource: &str) -> Option<String> {
        let scope = self.scopes.scope(actor)?;
        self.read(scope.as_ref())
            .page(resource)
            .map(str::to_string)
    }

    fn page_token_or_create(&self, actor: &str, resource: &str) -> Result<String> {
        let lock = self.actor_lock(actor);
        let _guard = lock.lock().unwrap();
        let scope = self.scopes.scope_or_create(actor);
        let mut set = self.read(scope.as_ref());
        if set.master().is_none() {
            set.set_master(self.generator.generate()?);
        }
        let value = set.page_or_create(resource, &self.generator)?;
        self.write(scope.as_ref(), &set)?;
        Ok(value)
    }

    fn rotate_master(&self, actor: &str) -> Result<String> {
        let lock = self.actor_lock(actor);
        let _guard = lock.lock().unwrap();
        let scope = self.scopes.scope_or_create(actor);
        let mut set = self.read(scope.as_ref());
        let value = self.generator.generate()?;
        set.set_master(value.clone());
        self.write(scope.as_ref(), &set)?;
        debug!(actor, "master token rotated");
        Ok(value)
    }

    fn rotate_page(&self, actor: &str, resource: &str) -> Result<String> {
        let lock = self.actor_lock(actor);
        let _guard = lock.lock().unwrap();
        let scope = self.scopes.scope(actor).ok_or_else(|| {
            CsrfError::InvalidRotationTarget(format!("no session for actor {actor}"))
        })?;
        let mut set = self.read(scope.as_ref());
        if set.page(resource).is_none() {
            return Err(CsrfError::InvalidRotationTarget(format!(
                "no page token for resource {resource}"
            )));
        }
        let value = self.generator.generate()?;
        set.set_page(resource.to_string(), value.clone());
        self.write(scope.as_ref(), &set)?;
        debug!(actor, resource, "page token rotated");
        Ok(value)
    }

    fn rotate_all(&self, actor: &str) -> Result<()> {
        let lock = self.actor_lock(actor);
        let _guard = lock.lock().unwrap();
        let Some(scope) = self.scopes.scope(actor) else {
            return Ok(());
        };
        let mut set = self.read(scope.as_ref());
        if set.is_empty() {
            return Ok(());
        }
        if set.master().is_some() {
            set.set_master(self.generator.generate()?);
        }
        set.rotate_all_pages(&self.generator)?;
        self.write(scope.as_ref(), &set)?;
        debug!(actor, "all tokens rotated");
        Ok(())
    }

    fn regenerate_used_page(&self, actor: &str, used_value: &str) -> Result<usize> {
        let lock = self.actor_lock(actor);
        let _guard = lock.lock().unwrap();
        let Some(scope) = self.scopes.scope(actor) else {
            return Ok(0);
        };
        let mut set = self.read(scope.as_ref());
        let replaced = set.regenerate_used_page(used_value, &self.generator)?;
        if replaced > 0 {
            self.write(scope.as_ref(), &set)?;
        }
        Ok(replaced)
    }

    fn remove(&self, actor: &str) {
        let lock = self.actor_lock(actor);
        {
            let _guard = lock.lock().unwrap();
            if let Some(scope) = self.scopes.scope(actor) {
                scope.remove(&self.attribute);
            }
        }
        self.locks.remove(actor);
    }
}
