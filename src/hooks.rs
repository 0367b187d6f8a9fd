//! Failure notification hooks.
//!
//! The engine invokes every registered hook exactly once per failed
//! verification, before the outcome is returned to the caller. What a hook
//! does with the failure (log, redirect, reject, count) is its own
//! business.

use crate::error::MismatchKind;
use crate::request::CsrfRequest;
use tracing::warn;

/// Invoked once for every `Invalid` verification outcome.
pub trait FailureHook: Send + Sync {
    fn on_failure(&self, request: &CsrfRequest, reason: MismatchKind);
}

/// Default hook: logs the failure through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingFailureHook;

impl FailureHook for LoggingFailureHook {
    fn on_failure(&self, request: &CsrfRequest, reason: MismatchKind) {
        warn!(
            method = %request.method,
            path = %request.path,
            reason = %reason,
            "csrf validation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingHook {
        seen: Mutex<Vec<(String, MismatchKind)>>,
    }

    impl FailureHook for RecordingHook {
        fn on_failure(&self, request: &CsrfRequest, reason: MismatchKind) {
            self.seen
                .lock()
                .unwrap()
                .push((request.path.clone(), reason));
        }
    }

    #[test]
    fn test_hook_receives_request_and_reason() {
        let hook = RecordingHook {
            seen: Mutex::new(Vec::new()),
        };
        let req = CsrfRequest::new("POST", "/transfer.do");
        hook.on_failure(&req, MismatchKind::MasterTokenMismatch);

        let seen = hook.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "/transfer.do");
        assert_eq!(seen[0].1, MismatchKind::MasterTokenMismatch);
    }
}
