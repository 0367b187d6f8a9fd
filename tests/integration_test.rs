//! Integration tests for palisade-csrf

use palisade_csrf::*;
use std::sync::Arc;

const ACTOR: &str = "session-1";

fn sessions_with_actor() -> Arc<MemorySessions> {
    let sessions = Arc::new(MemorySessions::new());
    let req = CsrfRequest::new("GET", "/").with_header("x-session-id", ACTOR);
    sessions.extract_or_create(&req);
    sessions
}

fn protected_request(token: &str, path: &str) -> CsrfRequest {
    CsrfRequest::new("POST", path)
        .with_header("x-session-id", ACTOR)
        .with_parameter("csrf_token", token)
}

#[test]
fn test_exact_rule_decides_with_canonical_resource() {
    let config = Arc::new(
        CsrfConfig::new()
            .with_protection_mode(ProtectionMode::OnlyProtected)
            .protect_path("/transfer.do")
            .protect_path("/admin/save.do"),
    );
    let matcher = ProtectionMatcher::new(config).unwrap();

    for rule in ["/transfer.do", "/admin/save.do"] {
        let result = matcher.decide(rule, "POST");
        assert!(result.protected);
        assert_eq!(result.resource_id, rule);
    }
}

#[test]
fn test_path_wildcard_boundaries() {
    let config = Arc::new(
        CsrfConfig::new()
            .with_protection_mode(ProtectionMode::OnlyProtected)
            .protect_path("/admin/*"),
    );
    let matcher = ProtectionMatcher::new(config).unwrap();

    assert!(matcher.decide("/admin", "POST").protected);
    assert!(matcher.decide("/admin/anything/below", "POST").protected);
    assert!(!matcher.decide("/adminx", "POST").protected);
}

#[test]
fn test_admin_exception_scenario() {
    // protect-by-exception: /admin/* protected, /admin/public.html carved out
    let config = Arc::new(
        CsrfConfig::new()
            .with_protection_mode(ProtectionMode::OnlyProtected)
            .protect_path("/admin/*")
            .unprotect_path("/admin/public.html"),
    );
    let matcher = ProtectionMatcher::new(config).unwrap();

    assert!(!matcher.decide("/admin/public.html", "POST").protected);
    assert!(matcher.decide("/admin/secret.html", "POST").protected);
}

#[test]
fn test_regex_rule_collapses_resources_onto_one_slot() {
    let rule = "^/item/[0-9]+/delete$";
    let config = Arc::new(
        CsrfConfig::new()
            .with_protection_mode(ProtectionMode::OnlyProtected)
            .protect_path(rule)
            .with_per_page_tokens(true),
    );
    let matcher = ProtectionMatcher::new(config.clone()).unwrap();
    let sessions = sessions_with_actor();
    let service = CsrfService::custom(config, sessions).unwrap();

    let a = matcher.decide("/item/1/delete", "POST");
    let b = matcher.decide("/item/2/delete", "POST");
    assert_eq!(a.resource_id, rule);
    assert_eq!(b.resource_id, rule);

    // both physical paths share one page-token slot
    let token_a = service.token_value(ACTOR, &a.resource_id).unwrap();
    let token_b = service.token_value(ACTOR, &b.resource_id).unwrap();
    assert_eq!(token_a, token_b);
}

#[test]
fn test_master_mismatch_self_heals() {
    let sessions = sessions_with_actor();
    let service = CsrfService::custom(Arc::new(CsrfConfig::new()), sessions).unwrap();
    let stored = service.master_token(ACTOR).unwrap();

    let outcome = service
        .verify(&protected_request("XYZ", "/transfer.do"), "/transfer.do")
        .unwrap();
    assert_eq!(
        outcome,
        ValidationOutcome::Invalid(MismatchKind::MasterTokenMismatch)
    );

    // the master token was regenerated to a value unseen by the attacker
    let fresh = service.master_token(ACTOR).unwrap();
    assert_ne!(fresh, stored);
    assert_ne!(fresh, "XYZ");

    // a legitimate client recovers by refetching
    let outcome = service
        .verify(&protected_request(&fresh, "/transfer.do"), "/transfer.do")
        .unwrap();
    assert!(outcome.is_valid());
}

#[test]
fn test_page_token_bootstrap_then_page_validation() {
    let sessions = sessions_with_actor();
    let service = CsrfService::custom(
        Arc::new(CsrfConfig::new().with_per_page_tokens(true)),
        sessions,
    )
    .unwrap();
    let master = service.master_token(ACTOR).unwrap();

    // first request for /x: no page token exists yet, master is accepted
    // as a fallback and the slot is bootstrapped
    let outcome = service
        .verify(&protected_request(&master, "/x"), "/x")
        .unwrap();
    assert_eq!(
        outcome,
        ValidationOutcome::Valid {
            used_token: master,
            was_master: true
        }
    );

    // the next request can use the page token proper
    let page = service.token_value(ACTOR, "/x").unwrap();
    let outcome = service.verify(&protected_request(&page, "/x"), "/x").unwrap();
    assert_eq!(
        outcome,
        ValidationOutcome::Valid {
            used_token: page,
            was_master: false
        }
    );
}

#[test]
fn test_rotation_rejects_replay() {
    let sessions = sessions_with_actor();
    let service = CsrfService::custom(
        Arc::new(
            CsrfConfig::new()
                .with_rotation(true)
                .with_per_page_tokens(true),
        ),
        sessions,
    )
    .unwrap();
    service.master_token(ACTOR).unwrap();
    let page = service.token_value(ACTOR, "/x").unwrap();

    let outcome = service
        .verify_and_rotate(&protected_request(&page, "/x"), "/x")
        .unwrap();
    assert!(outcome.is_valid());

    // the burned value is never accepted again for the same slot
    let replay = service.verify(&protected_request(&page, "/x"), "/x").unwrap();
    assert_eq!(
        replay,
        ValidationOutcome::Invalid(MismatchKind::PageTokenMismatch)
    );
}

#[test]
fn test_session_bound_service_end_to_end() {
    let sessions = sessions_with_actor();
    let config = Arc::new(CsrfConfig::new().with_per_page_tokens(true));
    let service =
        CsrfService::session_bound(config, sessions.clone(), sessions.clone()).unwrap();

    let page = service.token_value(ACTOR, "/x").unwrap();
    let outcome = service.verify(&protected_request(&page, "/x"), "/x").unwrap();
    assert_eq!(
        outcome,
        ValidationOutcome::Valid {
            used_token: page,
            was_master: false
        }
    );

    // invalidating the logical session takes the tokens with it
    sessions.invalidate(ACTOR);
    let outcome = service
        .verify(&protected_request("whatever", "/x"), "/x")
        .unwrap();
    assert_eq!(
        outcome,
        ValidationOutcome::Invalid(MismatchKind::NoStoredToken)
    );
}

#[test]
fn test_token_value_never_returns_unusable_value() {
    let sessions = sessions_with_actor();
    let service = CsrfService::custom(
        Arc::new(CsrfConfig::new().with_per_page_tokens(true)),
        sessions,
    )
    .unwrap();

    // reading lazily creates both the master and the page token
    let value = service.token_value(ACTOR, "/never/seen/before").unwrap();
    assert!(!value.is_empty());

    let outcome = service
        .verify(
            &protected_request(&value, "/never/seen/before"),
            "/never/seen/before",
        )
        .unwrap();
    assert!(outcome.is_valid());
}

#[test]
fn test_concurrent_page_token_creation_yields_one_value() {
    let sessions = sessions_with_actor();
    let service = Arc::new(
        CsrfService::custom(
            Arc::new(CsrfConfig::new().with_per_page_tokens(true)),
            sessions,
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            std::thread::spawn(move || service.token_value(ACTOR, "/x").unwrap())
        })
        .collect();
    let values: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(values.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_method_and_path_gating_compose() {
    let config = Arc::new(
        CsrfConfig::new()
            .unprotect_path("/health")
            .with_protected_methods(["POST", "PUT", "DELETE"]),
    );
    let matcher = ProtectionMatcher::new(config).unwrap();

    assert!(matcher.decide("/transfer.do", "POST").protected);
    assert!(!matcher.decide("/transfer.do", "GET").protected);
    assert!(!matcher.decide("/health", "POST").protected);
}

#[test]
fn test_full_filter_flow_with_hook() {
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<MismatchKind>>);
    impl FailureHook for Recorder {
        fn on_failure(&self, _request: &CsrfRequest, reason: MismatchKind) {
            self.0.lock().unwrap().push(reason);
        }
    }

    let config = Arc::new(CsrfConfig::new().with_protected_methods(["POST"]));
    let matcher = ProtectionMatcher::new(config.clone()).unwrap();
    let sessions = sessions_with_actor();
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    let service = CsrfService::custom(config, sessions)
        .unwrap()
        .with_failure_hook(recorder.clone());
    let master = service.master_token(ACTOR).unwrap();

    // unprotected request flows through without a token
    let get = CsrfRequest::new("GET", "/page").with_header("x-session-id", ACTOR);
    assert!(!matcher.decide(&get.path, &get.method).protected);

    // protected request without a token fires the hook once
    let bare = CsrfRequest::new("POST", "/transfer.do").with_header("x-session-id", ACTOR);
    let decision = matcher.decide(&bare.path, &bare.method);
    assert!(decision.protected);
    let outcome = service.verify(&bare, &decision.resource_id).unwrap();
    assert_eq!(
        outcome,
        ValidationOutcome::Invalid(MismatchKind::RequestTokenMissing)
    );
    assert_eq!(
        recorder.0.lock().unwrap().as_slice(),
        &[MismatchKind::RequestTokenMissing]
    );

    // and the legitimate retry succeeds without another hook firing
    let retry = protected_request(&master, "/transfer.do");
    let outcome = service.verify(&retry, &decision.resource_id).unwrap();
    assert!(outcome.is_valid());
    assert_eq!(recorder.0.lock().unwrap().len(), 1);
}
