//! Logical session collaborators.
//!
//! Actor identity comes from outside the engine: a [`LogicalSession`]
//! extracts an opaque actor key from a request (a container session id, or
//! an identity derived from a bearer credential). The session-bound store
//! additionally needs attribute storage scoped to the actor's own session,
//! modeled by [`SessionScope`] / [`SessionScopes`]. The engine never
//! inspects the internals of either.
//!
//! [`MemorySessions`] is an in-process implementation of all three traits,
//! used by the test suite and suitable for single-process deployments.

use crate::request::CsrfRequest;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Extracts actor identity from requests.
pub trait LogicalSession: Send + Sync {
    /// The actor key for this request, if one exists.
    fn extract(&self, request: &CsrfRequest) -> Option<String>;

    /// The actor key for this request, creating the logical session if
    /// necessary.
    fn extract_or_create(&self, request: &CsrfRequest) -> String;

    /// End the actor's logical session.
    fn invalidate(&self, actor: &str);
}

/// Key-value attribute storage tied to one actor's session; lifetime and
/// expiry ride on the external session.
pub trait SessionScope: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;
    fn set(&self, key: &str, value: serde_json::Value);
    fn remove(&self, key: &str);
}

/// Resolves an actor key to that actor's [`SessionScope`].
pub trait SessionScopes: Send + Sync {
    /// The actor's scope, if the session still exists.
    fn scope(&self, actor: &str) -> Option<Arc<dyn SessionScope>>;

    /// The actor's scope, creating the session if necessary.
    fn scope_or_create(&self, actor: &str) -> Arc<dyn SessionScope>;
}

/// In-memory sessions: one attribute scope per actor key.
///
/// Actor identity is read from a request header (`x-session-id` by
/// default). `extract_or_create` for a request without that header mints a
/// random actor key; real deployments echo the key back to the client
/// through their own session machinery.
pub struct MemorySessions {
    header: String,
    scopes: DashMap<String, Arc<MemoryScope>>,
    id_generator: crate::generator::TokenGenerator,
}

impl Default for MemorySessions {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessions {
    pub fn new() -> Self {
        Self {
            header: "x-session-id".to_string(),
            scopes: DashMap::new(),
            id_generator: crate::generator::TokenGenerator::new(16),
        }
    }

    /// Use a different header for actor identity.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.scopes.len()
    }
}

impl LogicalSession for MemorySessions {
    fn extract(&self, request: &CsrfRequest) -> Option<String> {
        let actor = request.header(&self.header)?;
        self.scopes
            .contains_key(actor)
            .then(|| actor.to_string())
    }

    fn extract_or_create(&self, request: &CsrfRequest) -> String {
        let actor = match request.header(&self.header) {
            Some(id) => id.to_string(),
            // generator failure here means no OS randomness at all; the
            // id is not a secret, a process-unique fallback is acceptable
            None => self
                .id_generator
                .generate()
                .unwrap_or_else(|_| format!("anon-{}", self.scopes.len())),
        };
        self.scopes
            .entry(actor.clone())
            .or_insert_with(|| Arc::new(MemoryScope::default()));
        actor
    }

    fn invalidate(&self, actor: &str) {
        self.scopes.remove(actor);
    }
}

impl SessionScopes for MemorySessions {
    fn scope(&self, actor: &str) -> Option<Arc<dyn SessionScope>> {
        self.scopes
            .get(actor)
            .map(|scope| scope.value().clone() as Arc<dyn SessionScope>)
    }

    fn scope_or_create(&self, actor: &str) -> Arc<dyn SessionScope> {
        self.scopes
            .entry(actor.to_string())
            .or_insert_with(|| Arc::new(MemoryScope::default()))
            .value()
            .clone()
    }
}

/// Attribute map for one in-memory session.
#[derive(Default)]
pub struct MemoryScope {
    attributes: RwLock<HashMap<String, serde_json::Value>>,
}

impl SessionScope for MemoryScope {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.attributes.read().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: serde_json::Value) {
        self.attributes.write().unwrap().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.attributes.write().unwrap().remove(key);
    }
}
