//! Token records bound to one actor.
//!
//! A [`TokenSet`] holds the actor's master token and, when per-resource
//! tokening is enabled, one page token per resource the actor has touched.
//! All token writes in the engine go through the mutation methods here;
//! stores only decide *when* to call them and under which lock.

use crate::error::Result;
use crate::generator::TokenGenerator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The token set for one actor.
///
/// Invariant: `master` is set before or concurrently with the first page
/// token. A page token's presence implies the actor has been
/// token-initialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSet {
    master: Option<String>,
    pages: HashMap<String, String>,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The master token, if the actor has been token-initialized.
    pub fn master(&self) -> Option<&str> {
        self.master.as_deref()
    }

    /// The page token for `resource`, if one exists.
    pub fn page(&self, resource: &str) -> Option<&str> {
        self.pages.get(resource).map(String::as_str)
    }

    /// All page tokens, keyed by resource identifier.
    pub fn pages(&self) -> &HashMap<String, String> {
        &self.pages
    }

    pub fn set_master(&mut self, value: String) {
        self.master = Some(value);
    }

    pub fn set_page(&mut self, resource: String, value: String) {
        debug_assert!(
            self.master.is_some(),
            "page token set before master token for the same actor"
        );
        self.pages.insert(resource, value);
    }

    /// Return the page token for `resource`, generating and storing one if
    /// absent. Callers must ensure the master token exists first.
    pub fn page_or_create(&mut self, resource: &str, generator: &TokenGenerator) -> Result<String> {
        if let Some(existing) = self.pages.get(resource) {
            return Ok(existing.clone());
        }
        let value = generator.generate()?;
        self.set_page(resource.to_string(), value.clone());
        Ok(value)
    }

    /// Replace every page token with a freshly generated value.
    pub fn rotate_all_pages(&mut self, generator: &TokenGenerator) -> Result<()> {
        for value in self.pages.values_mut() {
            *value = generator.generate()?;
        }
        Ok(())
    }

    /// Replace *any* page token whose value equals `used_value`, returning
    /// how many entries were replaced.
    ///
    /// This is a global scan by value: several resources can transiently
    /// share one value (bootstrap plus concurrent first access), and the
    /// scan guarantees no stale copy of a burned value survives. Page maps
    /// hold one entry per protected resource the actor has touched, so the
    /// scan is bounded.
    pub fn regenerate_used_page(
        &mut self,
        used_value: &str,
        generator: &TokenGenerator,
    ) -> Result<usize> {
        let mut replaced = 0;
        for value in self.pages.values_mut() {
            if value == used_value {
                *value = generator.generate()?;
                replaced += 1;
            }
        }
        Ok(replaced)
    }

    /// Whether this set holds no tokens at all.
    pub fn is_empty(&self) -> bool {
        self.master.is_none() && self.pages.is_empty()
    }
}
