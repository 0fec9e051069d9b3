//! Token storage: where the session credential lives between requests.
//!
//! A store is a dumb container. It never decides whether a token is still
//! good; that is the manager's job, via `restore`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use waypost_protocol::SessionToken;

use crate::SessionError;

/// Reads, writes and deletes the persisted session token.
///
/// Methods are synchronous: stores are small local files or memory, and
/// the manager calls them while updating its own state.
pub trait TokenStore: Send + Sync + 'static {
    /// Returns the stored token, or `None` if nothing is stored.
    fn load(&self) -> Result<Option<SessionToken>, SessionError>;

    /// Replaces the stored token.
    fn save(&self, token: &SessionToken) -> Result<(), SessionError>;

    /// Removes the stored token. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), SessionError>;
}

impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    fn load(&self) -> Result<Option<SessionToken>, SessionError> {
        (**self).load()
    }

    fn save(&self, token: &SessionToken) -> Result<(), SessionError> {
        (**self).save(token)
    }

    fn clear(&self) -> Result<(), SessionError> {
        (**self).clear()
    }
}

/// In-process store. Loses the token when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<SessionToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `token`, as if a previous run saved it.
    pub fn with_token(token: SessionToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<SessionToken>, SessionError> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &SessionToken) -> Result<(), SessionError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

/// Persists the token in a single file, surviving restarts.
///
/// A missing or blank file means "no token".
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<SessionToken>, SessionError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| SessionToken::new(token)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, token: &SessionToken) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token.as_str())?;
        tracing::debug!(path = %self.path.display(), "session token saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "session token removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
