//! The auth surface the session manager talks to.
//!
//! The manager never speaks HTTP itself; it calls an [`AuthApi`]. In
//! production that is [`HttpAuthApi`](crate::HttpAuthApi) pointed at the
//! gateway. Tests plug in a scripted implementation.

use waypost_protocol::{CallResult, SessionToken};

use crate::SessionError;

/// The four auth operations, as seen from the client.
///
/// Each returns the backend's [`CallResult`] on any well-formed answer,
/// including business rejections. `Err` is reserved for failures to get
/// an answer at all.
pub trait AuthApi: Send + Sync + 'static {
    fn signin(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<CallResult, SessionError>> + Send;

    fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<CallResult, SessionError>> + Send;

    fn signout(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = Result<CallResult, SessionError>> + Send;

    /// Exchanges a stored token for the current identity, or a non-`logged`
    /// status when the token is no longer valid.
    fn restore(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = Result<CallResult, SessionError>> + Send;
}
