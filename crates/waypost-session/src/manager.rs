//! The session manager: the client's single source of truth for "who is
//! signed in".
//!
//! It owns the in-memory identity, drives the token store, talks to the
//! backend through an [`AuthApi`], and runs the periodic revalidation task.
//!
//! # Concurrency note
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Several logical operations may be waiting on the backend at
//! once (a logout overlapping a revalidation tick, say). Each user action
//! that changes who is signed in bumps an *epoch*; a restore or sign-in
//! result is applied only if the epoch it started under is still current,
//! so a call that lands after a logout cannot bring the session back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use waypost_protocol::{
    CallResult, CallStatus, Identity, SessionToken, SigninResponse,
};
use waypost_tick::{TickConfig, TickScheduler};

use crate::{
    AuthApi, Revalidation, Route, SessionConfig, SessionError, SessionEvent,
    SessionState, TokenStore,
};

const EVENT_CAPACITY: usize = 32;

struct Inner {
    state: SessionState,
    identity: Option<Identity>,
    /// Bumped by login, logout, reauthenticate and shutdown.
    epoch: u64,
    notice_visible: bool,
    /// Sequence number of the restore call in flight, if any. Mount-time
    /// and periodic restores share this slot.
    restoring: Option<u64>,
    restore_seq: u64,
    /// A login or registration is in flight.
    busy: bool,
    disposed: bool,
}

impl Inner {
    fn begin_restore(&mut self) -> u64 {
        self.restore_seq += 1;
        self.restoring = Some(self.restore_seq);
        self.restore_seq
    }

    fn end_restore(&mut self, seq: u64) {
        if self.restoring == Some(seq) {
            self.restoring = None;
        }
    }
}

struct Shared<A, S> {
    api: A,
    store: S,
    config: SessionConfig,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl<A, S> Drop for Shared<A, S> {
    fn drop(&mut self) {
        let ticker = self.ticker.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = ticker.take() {
            handle.abort();
        }
    }
}

/// Clears the in-flight login/registration flag however the call ends.
struct BusyGuard<'a> {
    inner: &'a Mutex<Inner>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .busy = false;
    }
}

/// Owns the client's authenticated session.
///
/// Cheap to clone; clones share state. Call [`mount`](Self::mount) once
/// when the client starts and [`shutdown`](Self::shutdown) when it goes
/// away.
///
/// ## Lifecycle
///
/// ```text
/// new() ──→ mount() ──→ login()/logout()/revalidate ticks ──→ shutdown()
/// ```
pub struct SessionManager<A: AuthApi, S: TokenStore> {
    shared: Arc<Shared<A, S>>,
}

impl<A: AuthApi, S: TokenStore> Clone for SessionManager<A, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: AuthApi, S: TokenStore> SessionManager<A, S> {
    /// Creates an unmounted manager in the `Unauthenticated` state.
    pub fn new(api: A, store: S, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Inner {
            state: SessionState::Unauthenticated,
            identity: None,
            epoch: 0,
            notice_visible: false,
            restoring: None,
            restore_seq: 0,
            busy: false,
            disposed: false,
        };
        Self {
            shared: Arc::new(Shared {
                api,
                store,
                config,
                inner: Mutex::new(inner),
                events,
                ticker: Mutex::new(None),
            }),
        }
    }

    // -- Queries ----------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// The signed-in user, present only while `Authenticated`.
    pub fn identity(&self) -> Option<Identity> {
        self.lock().identity.clone()
    }

    /// Whether the expiry notice should be shown.
    pub fn is_notice_visible(&self) -> bool {
        self.lock().notice_visible
    }

    /// The stored token, for attaching to outgoing requests.
    pub fn token(&self) -> Option<SessionToken> {
        self.load_token()
    }

    /// Subscribes to expiry and navigation events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    // -- Lifecycle --------------------------------------------------------

    /// Checks the stored token and starts periodic revalidation.
    ///
    /// Moves to `Checking`, then to `Unauthenticated` (no token),
    /// `Authenticated` (restore says `logged`) or `Expired` (anything
    /// else, including a failed call). Returns the resulting state.
    pub async fn mount(&self) -> SessionState {
        let (epoch, seq) = {
            let mut inner = self.lock();
            if inner.disposed {
                return inner.state;
            }
            inner.state = SessionState::Checking;
            inner.identity = None;
            (inner.epoch, inner.begin_restore())
        };
        self.start_revalidation();

        let Some(token) = self.load_token() else {
            let mut inner = self.lock();
            inner.end_restore(seq);
            if !inner.disposed
                && inner.epoch == epoch
                && inner.state == SessionState::Checking
            {
                inner.state = SessionState::Unauthenticated;
                tracing::info!("no stored session");
            }
            return inner.state;
        };

        tracing::debug!("restoring stored session");
        let outcome = self.shared.api.restore(&token).await;
        self.apply_restore(epoch, seq, SessionState::Checking, outcome);
        self.state()
    }

    /// Stops revalidation and freezes the manager. Results of calls still
    /// in flight are discarded. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.lock();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.epoch += 1;
        }
        let handle = self
            .shared
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        tracing::info!("session manager shut down");
    }

    // -- User actions -----------------------------------------------------

    /// Signs in and, on success, persists the token and navigates to the
    /// dashboard.
    ///
    /// # Errors
    /// - [`SessionError::Rejected`] — the backend refused; state unchanged
    /// - [`SessionError::AlreadyAuthenticated`] / [`SessionError::Busy`]
    /// - [`SessionError::Superseded`] — a logout landed while the call was
    ///   in flight; nothing was stored
    /// - transport errors from the [`AuthApi`]; state unchanged
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, SessionError> {
        let epoch = {
            let mut inner = self.lock();
            if inner.disposed {
                return Err(SessionError::Disposed);
            }
            if inner.state == SessionState::Authenticated {
                return Err(SessionError::AlreadyAuthenticated);
            }
            if inner.busy {
                return Err(SessionError::Busy);
            }
            inner.busy = true;
            inner.epoch
        };
        let _busy = BusyGuard {
            inner: &self.shared.inner,
        };

        let result = self.shared.api.signin(email, password).await?;
        if result.status != CallStatus::Logged {
            tracing::info!(status = %result.status, "sign-in rejected");
            return Err(SessionError::Rejected(result.message()));
        }
        let SigninResponse { token, identity } = result.response_as()?;
        let token = token.filter(|t| !t.is_empty()).ok_or_else(|| {
            SessionError::Rejected("sign-in response carried no token".into())
        })?;

        {
            let mut inner = self.lock();
            if inner.disposed {
                return Err(SessionError::Disposed);
            }
            if inner.epoch != epoch {
                tracing::info!("sign-in overtaken by logout, discarding result");
                return Err(SessionError::Superseded);
            }
            self.shared.store.save(&token)?;
            inner.epoch += 1;
            inner.state = SessionState::Authenticated;
            inner.identity = Some(identity.clone());
            inner.notice_visible = false;
        }
        tracing::info!(user_id = identity.id, "signed in");
        self.emit(SessionEvent::Navigate(Route::Dashboard));
        Ok(identity)
    }

    /// Registers a new account. Never changes session state; on success
    /// the UI is sent to the login view.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        {
            let mut inner = self.lock();
            if inner.disposed {
                return Err(SessionError::Disposed);
            }
            if inner.busy {
                return Err(SessionError::Busy);
            }
            inner.busy = true;
        }
        let _busy = BusyGuard {
            inner: &self.shared.inner,
        };

        let result = self.shared.api.register(username, email, password).await?;
        if result.status != CallStatus::Fulfilled {
            tracing::info!(status = %result.status, "registration rejected");
            return Err(SessionError::Rejected(result.message()));
        }
        tracing::info!("registered");
        self.emit(SessionEvent::Navigate(Route::Login));
        Ok(())
    }

    /// Signs out. Local state is cleared first and unconditionally; the
    /// backend signout is best-effort and its failure is only logged.
    ///
    /// Safe to call repeatedly.
    pub async fn logout(&self) {
        let token = {
            let mut inner = self.lock();
            inner.epoch += 1;
            inner.state = SessionState::Unauthenticated;
            inner.identity = None;
            inner.notice_visible = false;
            let token = self.load_token();
            if let Err(e) = self.shared.store.clear() {
                tracing::warn!(error = %e, "failed to clear stored token");
            }
            token
        };
        self.emit(SessionEvent::Navigate(Route::Login));

        let Some(token) = token else {
            tracing::debug!("logout with no stored token, skipping backend");
            return;
        };
        match self.shared.api.signout(&token).await {
            Ok(result) if result.status == CallStatus::Fulfilled => {
                tracing::info!("signed out");
            }
            Ok(result) => {
                tracing::warn!(status = %result.status, "backend did not confirm signout");
            }
            Err(e) => {
                tracing::warn!(error = %e, "signout failed, local session already cleared");
            }
        }
    }

    /// Hides the expiry notice. The state stays `Expired`.
    pub fn dismiss_notice(&self) {
        let dismissed = {
            let mut inner = self.lock();
            std::mem::replace(&mut inner.notice_visible, false)
        };
        if dismissed {
            self.emit(SessionEvent::NoticeDismissed);
        }
    }

    /// Clears any stored token and sends the UI to the login entry point.
    pub fn reauthenticate(&self) {
        {
            let mut inner = self.lock();
            inner.epoch += 1;
            inner.state = SessionState::Unauthenticated;
            inner.identity = None;
            inner.notice_visible = false;
            if let Err(e) = self.shared.store.clear() {
                tracing::warn!(error = %e, "failed to clear stored token");
            }
        }
        tracing::info!("reauthentication requested");
        self.emit(SessionEvent::Navigate(Route::Login));
    }

    // -- Revalidation -----------------------------------------------------

    /// Re-checks an authenticated session with the backend once.
    ///
    /// Called by the periodic task; public so callers can force a check.
    pub async fn revalidate(&self) -> Revalidation {
        let (epoch, seq) = {
            let mut inner = self.lock();
            if inner.disposed
                || inner.state != SessionState::Authenticated
                || inner.restoring.is_some()
            {
                return Revalidation::Skipped;
            }
            (inner.epoch, inner.begin_restore())
        };

        let Some(token) = self.load_token() else {
            let mut inner = self.lock();
            inner.end_restore(seq);
            if inner.disposed
                || inner.epoch != epoch
                || inner.state != SessionState::Authenticated
            {
                return Revalidation::Stale;
            }
            tracing::info!("stored token disappeared");
            self.expire(&mut inner);
            return Revalidation::Expired;
        };

        let outcome = self.shared.api.restore(&token).await;
        self.apply_restore(epoch, seq, SessionState::Authenticated, outcome)
    }

    fn start_revalidation(&self) {
        if self.shared.config.revalidate_every.is_zero() {
            return;
        }
        let mut ticker = self
            .shared
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if ticker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let weak = Arc::downgrade(&self.shared);
        let config = self.shared.config.tick_config();
        *ticker = Some(tokio::spawn(revalidation_loop(weak, config)));
        tracing::debug!(
            every_secs = self.shared.config.revalidate_every.as_secs(),
            "revalidation started"
        );
    }

    // -- Internals --------------------------------------------------------

    /// Applies a restore outcome if it is still relevant.
    ///
    /// `expected` is the state the restore was issued from; if the epoch
    /// moved or the state changed underneath, the result is dropped.
    fn apply_restore(
        &self,
        epoch: u64,
        seq: u64,
        expected: SessionState,
        outcome: Result<CallResult, SessionError>,
    ) -> Revalidation {
        let identity = match outcome {
            Ok(result) if result.status == CallStatus::Logged => {
                match result.response_as::<Identity>() {
                    Ok(identity) => Some(identity),
                    Err(e) => {
                        tracing::warn!(error = %e, "restore returned an unreadable identity");
                        None
                    }
                }
            }
            Ok(result) => {
                tracing::info!(status = %result.status, "backend did not confirm session");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "restore failed");
                None
            }
        };

        let mut inner = self.lock();
        inner.end_restore(seq);
        if inner.disposed || inner.epoch != epoch || inner.state != expected {
            tracing::debug!(
                issued_epoch = epoch,
                current_epoch = inner.epoch,
                "discarding stale restore result"
            );
            return Revalidation::Stale;
        }

        match identity {
            Some(identity) => {
                if expected == SessionState::Checking {
                    tracing::info!(user_id = identity.id, "session restored");
                }
                inner.state = SessionState::Authenticated;
                inner.identity = Some(identity);
                Revalidation::Confirmed
            }
            None => {
                self.expire(&mut inner);
                Revalidation::Expired
            }
        }
    }

    /// Clears the token and identity and raises the expiry notice once.
    fn expire(&self, inner: &mut Inner) {
        if let Err(e) = self.shared.store.clear() {
            tracing::warn!(error = %e, "failed to clear expired token");
        }
        inner.identity = None;
        if inner.state != SessionState::Expired {
            inner.state = SessionState::Expired;
            inner.notice_visible = true;
            tracing::info!("session expired");
            self.emit(SessionEvent::Expired);
        }
    }

    fn load_token(&self) -> Option<SessionToken> {
        match self.shared.store.load() {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stored token");
                None
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background task: one revalidation per tick until the manager is gone.
async fn revalidation_loop<A: AuthApi, S: TokenStore>(
    weak: Weak<Shared<A, S>>,
    config: TickConfig,
) {
    let mut scheduler = TickScheduler::new(config);
    loop {
        let tick = scheduler.wait_for_tick().await;
        let Some(shared) = weak.upgrade() else {
            break;
        };
        let outcome = SessionManager { shared }.revalidate().await;
        tracing::trace!(
            tick = tick.tick,
            skipped = tick.ticks_skipped,
            ?outcome,
            "revalidation tick"
        );
    }
}
