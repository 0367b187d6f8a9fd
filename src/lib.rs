//! # Palisade CSRF
//!
//! Cross-Site Request Forgery (CSRF) protection engine using the
//! synchronizer token pattern.
//!
//! ## Features
//!
//! - ✅ **Master Tokens** - One unforgeable secret per actor
//! - ✅ **Page Tokens** - Optional per-resource tokens keyed by the matched
//!   resource
//! - ✅ **Protection Rules** - Exact, path-wildcard, extension-wildcard and
//!   regex rules, protect-by-default or protect-by-exception
//! - ✅ **Token Rotation** - Single-use tokens after successful validation
//! - ✅ **Self-Healing** - Mismatched slots are regenerated so legitimate
//!   clients recover by refetching
//! - ✅ **Two Storage Strategies** - Session-bound or process-wide
//!   concurrent store
//! - ✅ **AJAX Support** - Header-based validation for scripted requests
//!
//! The engine is framework-agnostic: HTTP middleware hands it a
//! [`CsrfRequest`] view, asks the [`ProtectionMatcher`] whether the request
//! is protected, and runs the [`TokenService`] verdict. Actor identity
//! comes from a [`LogicalSession`] implementation; token embedding into
//! HTML and the client-side script consume [`TokenService::token_value`].
//!
//! ## Quick Start
//!
//! ```rust
//! use palisade_csrf::{
//!     CsrfConfig, CsrfRequest, CsrfService, LogicalSession, MemorySessions, ProtectionMatcher,
//!     TokenService,
//! };
//! use std::sync::Arc;
//!
//! let config = Arc::new(
//!     CsrfConfig::new()
//!         .with_rotation(true)
//!         .unprotect_path("/public/*")
//!         .with_protected_methods(["POST", "PUT", "DELETE"]),
//! );
//!
//! let matcher = ProtectionMatcher::new(config.clone()).unwrap();
//! let sessions = Arc::new(MemorySessions::new());
//! let service = CsrfService::custom(config, sessions.clone()).unwrap();
//!
//! // a page render embeds the actor's token
//! let render = CsrfRequest::new("GET", "/form").with_header("x-session-id", "alice");
//! let actor = sessions.extract_or_create(&render);
//! let token = service.token_value(&actor, "/transfer.do").unwrap();
//!
//! // the state-changing request presents it
//! let request = CsrfRequest::new("POST", "/transfer.do")
//!     .with_header("x-session-id", "alice")
//!     .with_parameter("csrf_token", token.as_str());
//!
//! let decision = matcher.decide(&request.path, &request.method);
//! assert!(decision.protected);
//!
//! let outcome = service
//!     .verify_and_rotate(&request, &decision.resource_id)
//!     .unwrap();
//! assert!(outcome.is_valid());
//! ```
//!
//! ## Per-Resource Tokens
//!
//! ```rust
//! use palisade_csrf::{
//!     CsrfConfig, CsrfRequest, CsrfService, LogicalSession, MemorySessions, TokenService,
//! };
//! use std::sync::Arc;
//!
//! let config = Arc::new(CsrfConfig::new().with_per_page_tokens(true));
//! let sessions = Arc::new(MemorySessions::new());
//! let service = CsrfService::custom(config, sessions.clone()).unwrap();
//!
//! let render = CsrfRequest::new("GET", "/account").with_header("x-session-id", "alice");
//! let actor = sessions.extract_or_create(&render);
//!
//! // each resource gets its own token; a token for one resource is not
//! // accepted for another
//! let edit_token = service.token_value(&actor, "/account/edit").unwrap();
//! let close_token = service.token_value(&actor, "/account/close").unwrap();
//! assert_ne!(edit_token, close_token);
//! ```
//!
//! ## Usage in a Filter
//!
//! ```ignore
//! fn handle(request: &CsrfRequest) -> Disposition {
//!     let decision = matcher.decide(&request.path, &request.method);
//!     if !decision.protected {
//!         return Disposition::Forward;
//!     }
//!     match service.verify_and_rotate(request, &decision.resource_id)? {
//!         ValidationOutcome::Valid { .. } => Disposition::Forward,
//!         // failure hooks have already fired; pick the response
//!         ValidationOutcome::Invalid(reason) => Disposition::Reject(reason),
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod hooks;
pub mod matcher;
pub mod request;
pub mod rules;
pub mod service;
pub mod session;
pub mod store;
pub mod token;

pub use config::{CsrfConfig, DEFAULT_TOKEN_LENGTH, MIN_TOKEN_LENGTH, ProtectionMode};
pub use error::{CsrfError, MismatchKind, Result, ValidationOutcome};
pub use generator::TokenGenerator;
pub use hooks::{FailureHook, LoggingFailureHook};
pub use matcher::{ProtectionMatcher, ProtectionResult};
pub use request::CsrfRequest;
pub use rules::RuleKind;
pub use service::{CsrfService, KeyedTokenService, SessionTokenService, TokenService};
pub use session::{LogicalSession, MemoryScope, MemorySessions, SessionScope, SessionScopes};
pub use store::{KeyedTokenStore, SessionTokenStore, TOKEN_ATTRIBUTE, TokenStore};
pub use token::TokenSet;
