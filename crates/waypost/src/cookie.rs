//! The `auth-token` session cookie.
//!
//! Only the gateway ever sets this cookie, and only with the attributes
//! below, so `Set-Cookie` values are formatted directly and inbound
//! `Cookie` headers are scanned for the one name we care about.

use axum::http::header::{COOKIE, HeaderMap};
use waypost_protocol::{AUTH_COOKIE, SessionToken};

/// Lifetime of the session cookie: seven days.
pub const MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// `Set-Cookie` value that stores `token` for [`MAX_AGE_SECS`].
///
/// Returns `None` if the token is empty or holds a byte that is not a
/// cookie octet, since it would otherwise add or alter attributes.
pub fn set_cookie(token: &SessionToken, secure: bool) -> Option<String> {
    let value = token.as_str();
    if value.is_empty() || !value.bytes().all(is_cookie_octet) {
        return None;
    }
    Some(format_cookie(value, MAX_AGE_SECS, secure))
}

/// RFC 6265 `cookie-octet`: visible ASCII except `"`, `,`, `;` and `\`.
fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

/// `Set-Cookie` value that deletes the session cookie.
pub fn clear_cookie(secure: bool) -> String {
    format_cookie("", 0, secure)
}

fn format_cookie(value: &str, max_age: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{AUTH_COOKIE}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Returns the session token carried by the request's `Cookie` headers.
///
/// An empty value counts as absent.
pub fn token_from_headers(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map(SessionToken::new)
}
