//! Integration tests for the session lifecycle state machine.
//!
//! The backend is a scripted [`AuthApi`] with gates that can hold a call
//! open, so overlapping operations can be ordered deterministically.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Notify, broadcast};
use waypost_protocol::{CallResult, CallStatus, Identity, SessionToken};
use waypost_session::{
    AuthApi, MemoryTokenStore, Revalidation, Route, SessionConfig,
    SessionError, SessionEvent, SessionManager, SessionState, TokenStore,
};

// =========================================================================
// Scripted backend
// =========================================================================

/// Holds a call open until the test releases it.
#[derive(Default)]
struct Gate {
    held: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Gate {
    fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    async fn pass(&self) {
        if self.held.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    fn open(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }
}

#[derive(Default)]
struct Script {
    valid_tokens: Mutex<HashSet<String>>,
    backend_down: AtomicBool,
    signin_gate: Gate,
    restore_gate: Gate,
    restore_calls: AtomicUsize,
    signout_calls: AtomicUsize,
}

#[derive(Clone, Default)]
struct ScriptedApi {
    script: Arc<Script>,
}

impl ScriptedApi {
    fn invalidate_all(&self) {
        self.script.valid_tokens.lock().unwrap().clear();
    }

    fn validate(&self, token: &str) {
        self.script
            .valid_tokens
            .lock()
            .unwrap()
            .insert(token.to_string());
    }

    fn down(&self) -> Result<(), SessionError> {
        if self.script.backend_down.load(Ordering::SeqCst) {
            return Err(SessionError::Server {
                status: 500,
                message: "Internal server error".into(),
            });
        }
        Ok(())
    }
}

fn identity_json() -> serde_json::Value {
    json!({
        "id": 1,
        "email": "a@b.com",
        "username": "a",
        "isAdmin": false,
        "sessionId": "s1",
    })
}

fn expected_identity() -> Identity {
    serde_json::from_value(identity_json()).unwrap()
}

impl AuthApi for ScriptedApi {
    async fn signin(
        &self,
        email: &str,
        password: &str,
    ) -> Result<CallResult, SessionError> {
        self.script.signin_gate.pass().await;
        self.down()?;
        if email != "a@b.com" || password != "pw" {
            return Ok(CallResult::rejected("Invalid credentials"));
        }
        self.validate("abc");
        let mut payload = identity_json();
        payload["token"] = json!("abc");
        Ok(CallResult::new(CallStatus::Logged, payload))
    }

    async fn register(
        &self,
        _username: &str,
        email: &str,
        _password: &str,
    ) -> Result<CallResult, SessionError> {
        self.down()?;
        if email == "taken@b.com" {
            return Ok(CallResult::rejected("Email already registered"));
        }
        Ok(CallResult::new(CallStatus::Fulfilled, json!("registered")))
    }

    async fn signout(
        &self,
        token: &SessionToken,
    ) -> Result<CallResult, SessionError> {
        self.script.signout_calls.fetch_add(1, Ordering::SeqCst);
        self.down()?;
        self.script
            .valid_tokens
            .lock()
            .unwrap()
            .remove(token.as_str());
        Ok(CallResult::new(CallStatus::Fulfilled, serde_json::Value::Null))
    }

    async fn restore(
        &self,
        token: &SessionToken,
    ) -> Result<CallResult, SessionError> {
        self.script.restore_calls.fetch_add(1, Ordering::SeqCst);
        let valid = self
            .script
            .valid_tokens
            .lock()
            .unwrap()
            .contains(token.as_str());
        self.script.restore_gate.pass().await;
        self.down()?;
        if valid {
            Ok(CallResult::new(CallStatus::Logged, identity_json()))
        } else {
            Ok(CallResult::new(CallStatus::Invalid, serde_json::Value::Null))
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

type Manager = SessionManager<ScriptedApi, Arc<MemoryTokenStore>>;

/// Revalidation disabled so only explicit `revalidate()` calls run.
fn manual_config() -> SessionConfig {
    SessionConfig {
        revalidate_every: Duration::ZERO,
        ..SessionConfig::default()
    }
}

fn manager_with(
    store: MemoryTokenStore,
    config: SessionConfig,
) -> (Manager, ScriptedApi, Arc<MemoryTokenStore>) {
    let api = ScriptedApi::default();
    let store = Arc::new(store);
    let manager =
        SessionManager::new(api.clone(), Arc::clone(&store), config);
    (manager, api, store)
}

fn manager() -> (Manager, ScriptedApi, Arc<MemoryTokenStore>) {
    manager_with(MemoryTokenStore::new(), manual_config())
}

async fn signed_in() -> (Manager, ScriptedApi, Arc<MemoryTokenStore>) {
    let (manager, api, store) = manager();
    manager.mount().await;
    manager.login("a@b.com", "pw").await.expect("login should succeed");
    (manager, api, store)
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn expiry_count(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Expired))
        .count()
}

// =========================================================================
// Mount
// =========================================================================

#[tokio::test]
async fn test_mount_without_token_is_unauthenticated() {
    let (manager, api, _) = manager();
    assert_eq!(manager.mount().await, SessionState::Unauthenticated);
    assert_eq!(api.script.restore_calls.load(Ordering::SeqCst), 0);
    assert!(manager.identity().is_none());
}

#[tokio::test]
async fn test_mount_with_valid_token_restores_identity() {
    let (manager, api, _) = manager_with(
        MemoryTokenStore::with_token(SessionToken::new("abc")),
        manual_config(),
    );
    api.validate("abc");

    assert_eq!(manager.mount().await, SessionState::Authenticated);
    assert_eq!(manager.identity(), Some(expected_identity()));
}

#[tokio::test]
async fn test_mount_with_invalid_token_expires_once() {
    let (manager, _api, store) = manager_with(
        MemoryTokenStore::with_token(SessionToken::new("stale")),
        manual_config(),
    );
    let mut events = manager.subscribe();

    assert_eq!(manager.mount().await, SessionState::Expired);
    assert!(store.load().unwrap().is_none(), "token must be cleared");
    assert!(manager.is_notice_visible());
    assert_eq!(expiry_count(&drain(&mut events)), 1);
}

#[tokio::test]
async fn test_mount_with_unreachable_backend_expires() {
    let (manager, api, store) = manager_with(
        MemoryTokenStore::with_token(SessionToken::new("abc")),
        manual_config(),
    );
    api.validate("abc");
    api.script.backend_down.store(true, Ordering::SeqCst);

    assert_eq!(manager.mount().await, SessionState::Expired);
    assert!(store.load().unwrap().is_none());
}

// =========================================================================
// Login / register
// =========================================================================

#[tokio::test]
async fn test_login_stores_token_and_identity_without_token() {
    let (manager, _api, store) = manager();
    manager.mount().await;
    let mut events = manager.subscribe();

    let identity = manager.login("a@b.com", "pw").await.unwrap();

    assert_eq!(identity, expected_identity());
    assert_eq!(manager.identity(), Some(expected_identity()));
    assert_eq!(manager.state(), SessionState::Authenticated);
    assert_eq!(store.load().unwrap(), Some(SessionToken::new("abc")));
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Navigate(Route::Dashboard)]
    );
}

#[tokio::test]
async fn test_login_rejected_surfaces_message_and_keeps_state() {
    let (manager, _api, store) = manager();
    manager.mount().await;

    let err = manager.login("a@b.com", "wrong").await.unwrap_err();

    assert!(matches!(&err, SessionError::Rejected(m) if m == "Invalid credentials"));
    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_login_when_authenticated_returns_error() {
    let (manager, _api, _) = signed_in().await;
    let err = manager.login("a@b.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyAuthenticated));
}

#[tokio::test]
async fn test_login_while_login_in_flight_is_busy() {
    let (manager, api, _) = manager();
    manager.mount().await;
    api.script.signin_gate.hold();

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.login("a@b.com", "pw").await })
    };
    api.script.signin_gate.wait_entered().await;

    let err = manager.login("a@b.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::Busy));

    api.script.signin_gate.open();
    first.await.unwrap().expect("first login should finish");
    assert_eq!(manager.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_login_resolving_after_logout_is_discarded() {
    let (manager, api, store) = manager();
    manager.mount().await;
    api.script.signin_gate.hold();

    let login = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.login("a@b.com", "pw").await })
    };
    api.script.signin_gate.wait_entered().await;

    manager.logout().await;
    api.script.signin_gate.open();

    let err = login.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Superseded));
    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert!(manager.identity().is_none());
    assert!(store.load().unwrap().is_none(), "token must not be written back");

    // The busy flag was released; a fresh login works.
    manager.login("a@b.com", "pw").await.unwrap();
    assert_eq!(manager.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_login_after_expiry_recovers() {
    let (manager, api, _) = signed_in().await;
    api.invalidate_all();
    assert_eq!(manager.revalidate().await, Revalidation::Expired);

    manager.login("a@b.com", "pw").await.unwrap();
    assert_eq!(manager.state(), SessionState::Authenticated);
    assert!(!manager.is_notice_visible());
}

#[tokio::test]
async fn test_register_fulfilled_navigates_to_login() {
    let (manager, _api, _) = manager();
    manager.mount().await;
    let mut events = manager.subscribe();

    manager.register("b", "b@b.com", "pw").await.unwrap();

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Navigate(Route::Login)]
    );
}

#[tokio::test]
async fn test_register_rejected_returns_message() {
    let (manager, _api, _) = manager();
    manager.mount().await;
    let mut events = manager.subscribe();

    let err = manager
        .register("b", "taken@b.com", "pw")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Email already registered");
    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert!(drain(&mut events).is_empty());
}

// =========================================================================
// Logout
// =========================================================================

#[tokio::test]
async fn test_logout_clears_everything() {
    let (manager, api, store) = signed_in().await;

    manager.logout().await;

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert!(manager.identity().is_none());
    assert!(store.load().unwrap().is_none());
    assert_eq!(api.script.signout_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_logout_twice_is_idempotent() {
    let (manager, api, _) = signed_in().await;

    manager.logout().await;
    manager.logout().await;

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    // The second call has no token to send.
    assert_eq!(api.script.signout_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_logout_with_backend_down_still_clears() {
    let (manager, api, store) = signed_in().await;
    api.script.backend_down.store(true, Ordering::SeqCst);

    manager.logout().await;

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_revalidation_resolving_after_logout_does_not_resurrect() {
    let (manager, api, _) = signed_in().await;
    api.script.restore_gate.hold();

    let tick = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.revalidate().await })
    };
    api.script.restore_gate.wait_entered().await;

    manager.logout().await;
    api.script.restore_gate.open();

    assert_eq!(tick.await.unwrap(), Revalidation::Stale);
    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert!(manager.identity().is_none());
}

// =========================================================================
// Revalidation
// =========================================================================

#[tokio::test]
async fn test_revalidate_valid_session_is_confirmed() {
    let (manager, _api, _) = signed_in().await;
    assert_eq!(manager.revalidate().await, Revalidation::Confirmed);
    assert_eq!(manager.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_revalidate_invalid_token_expires_exactly_once() {
    let (manager, api, store) = signed_in().await;
    let mut events = manager.subscribe();
    api.invalidate_all();

    assert_eq!(manager.revalidate().await, Revalidation::Expired);
    assert_eq!(manager.revalidate().await, Revalidation::Skipped);

    assert_eq!(manager.state(), SessionState::Expired);
    assert!(store.load().unwrap().is_none());
    assert_eq!(expiry_count(&drain(&mut events)), 1);
}

#[tokio::test]
async fn test_revalidate_missing_token_expires() {
    let (manager, api, store) = signed_in().await;
    store.clear().unwrap();

    assert_eq!(manager.revalidate().await, Revalidation::Expired);
    assert_eq!(api.script.restore_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_revalidate_while_restore_in_flight_is_skipped() {
    let (manager, api, _) = signed_in().await;
    api.script.restore_gate.hold();

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.revalidate().await })
    };
    api.script.restore_gate.wait_entered().await;

    assert_eq!(manager.revalidate().await, Revalidation::Skipped);

    api.script.restore_gate.open();
    assert_eq!(first.await.unwrap(), Revalidation::Confirmed);
    assert_eq!(api.script.restore_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_revalidate_unauthenticated_is_skipped() {
    let (manager, api, _) = manager();
    manager.mount().await;
    assert_eq!(manager.revalidate().await, Revalidation::Skipped);
    assert_eq!(api.script.restore_calls.load(Ordering::SeqCst), 0);
}

// =========================================================================
// Expiry notice
// =========================================================================

#[tokio::test]
async fn test_dismiss_hides_notice_but_stays_expired() {
    let (manager, api, _) = signed_in().await;
    api.invalidate_all();
    manager.revalidate().await;
    let mut events = manager.subscribe();

    manager.dismiss_notice();
    manager.dismiss_notice();

    assert!(!manager.is_notice_visible());
    assert_eq!(manager.state(), SessionState::Expired);
    assert_eq!(drain(&mut events), vec![SessionEvent::NoticeDismissed]);
}

#[tokio::test]
async fn test_reauthenticate_clears_token_and_redirects() {
    let (manager, api, store) = signed_in().await;
    api.invalidate_all();
    manager.revalidate().await;
    // Something re-wrote a token meanwhile; reauthenticate clears it anyway.
    store.save(&SessionToken::new("leftover")).unwrap();
    let mut events = manager.subscribe();

    manager.reauthenticate();

    assert!(store.load().unwrap().is_none());
    assert!(!manager.is_notice_visible());
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Navigate(Route::Login)]
    );
}

// =========================================================================
// Periodic task and teardown
// =========================================================================

fn periodic_config() -> SessionConfig {
    SessionConfig {
        revalidate_every: Duration::from_secs(60),
        revalidate_jitter: Duration::ZERO,
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_periodic_tick_detects_expiry() {
    let (manager, api, _) =
        manager_with(MemoryTokenStore::new(), periodic_config());
    manager.mount().await;
    manager.login("a@b.com", "pw").await.unwrap();
    api.invalidate_all();

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    assert_eq!(manager.state(), SessionState::Expired);
    assert!(manager.is_notice_visible());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_periodic_revalidation() {
    let (manager, api, _) =
        manager_with(MemoryTokenStore::new(), periodic_config());
    manager.mount().await;
    manager.login("a@b.com", "pw").await.unwrap();
    let calls_before = api.script.restore_calls.load(Ordering::SeqCst);

    manager.shutdown();
    manager.shutdown();
    api.invalidate_all();
    tokio::time::sleep(Duration::from_secs(600)).await;
    settle().await;

    assert_eq!(manager.state(), SessionState::Authenticated);
    assert_eq!(
        api.script.restore_calls.load(Ordering::SeqCst),
        calls_before
    );
    assert!(matches!(
        manager.login("a@b.com", "pw").await,
        Err(SessionError::Disposed)
    ));
}

#[tokio::test]
async fn test_shutdown_discards_in_flight_mount_restore() {
    let (manager, api, _) = manager_with(
        MemoryTokenStore::with_token(SessionToken::new("abc")),
        manual_config(),
    );
    api.validate("abc");
    api.script.restore_gate.hold();

    let mount = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.mount().await })
    };
    api.script.restore_gate.wait_entered().await;
    manager.shutdown();
    api.script.restore_gate.open();

    assert_eq!(mount.await.unwrap(), SessionState::Checking);
    assert!(manager.identity().is_none());
}
