//! Injected runtime context: connectivity flag and session credential.
//!
//! Every component that needs to know whether the network is reachable or
//! which bearer token to send receives a [`RuntimeContext`] clone instead of
//! reading ambient state.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
struct ContextInner {
    online: watch::Sender<bool>,
    credential: watch::Sender<Option<String>>,
}

/// Shared connectivity and credential state.
///
/// Cloning is cheap; all clones observe the same values.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    inner: Arc<ContextInner>,
}

impl RuntimeContext {
    pub fn new(online: bool, credential: Option<String>) -> Self {
        let (online, _) = watch::channel(online);
        let (credential, _) = watch::channel(credential.filter(|t| !t.is_empty()));
        Self { inner: Arc::new(ContextInner { online, credential }) }
    }

    pub fn is_online(&self) -> bool {
        *self.inner.online.borrow()
    }

    /// Record the current connectivity state.
    ///
    /// Returns true if the value changed. Subscribers are only notified on
    /// an actual transition.
    pub fn set_online(&self, online: bool) -> bool {
        self.inner.online.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        })
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe_connectivity(&self) -> watch::Receiver<bool> {
        self.inner.online.subscribe()
    }

    pub fn credential(&self) -> Option<String> {
        self.inner.credential.borrow().clone()
    }

    /// Replace the session credential. An empty token clears it.
    pub fn set_credential(&self, token: Option<String>) {
        self.inner.credential.send_replace(token.filter(|t| !t.is_empty()));
    }

    pub fn has_credential(&self) -> bool {
        self.inner.credential.borrow().is_some()
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(true, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_online_reports_transitions() {
        let ctx = RuntimeContext::new(true, None);
        assert!(!ctx.set_online(true));
        assert!(ctx.set_online(false));
        assert!(!ctx.is_online());
        assert!(ctx.set_online(true));
    }

    #[tokio::test]
    async fn test_subscribers_see_transition() {
        let ctx = RuntimeContext::new(false, None);
        let mut rx = ctx.subscribe_connectivity();

        let clone = ctx.clone();
        clone.set_online(true);

        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[test]
    fn test_credential_empty_is_none() {
        let ctx = RuntimeContext::new(true, Some(String::new()));
        assert!(!ctx.has_credential());

        ctx.set_credential(Some("abc".into()));
        assert_eq!(ctx.credential().as_deref(), Some("abc"));

        ctx.set_credential(None);
        assert!(ctx.credential().is_none());
    }
}
