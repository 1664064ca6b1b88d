// resident-app/src/session_store.rs
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;

use thiserror::Error;

// Key name under which the credential is persisted
const TOKEN_KEY: &str = "userToken";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Durable, scoped storage for the one opaque session credential.
/// Survives process restarts; cleared on logout.
pub trait SessionStore: Send + Sync {
    fn save(&self, credential: &str) -> Result<(), StoreError>;
    fn load(&self) -> Result<Option<String>, StoreError>;
    /// Must be safe to call when nothing is stored
    fn clear(&self) -> Result<(), StoreError>;
}

/// File-backed store under the per-user data directory, written with
/// owner-only permissions. The portable rendition of the phone's
/// secure scoped storage.
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    /// Store under the platform data directory (e.g.
    /// `~/.local/share/apnagate` on Linux). `None` when the platform
    /// reports no such directory.
    pub fn new() -> Option<Self> {
        dirs::data_dir().map(|dir| Self::at(dir.join("apnagate")))
    }

    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_KEY)
    }
}

impl SessionStore for FileTokenStore {
    fn save(&self, credential: &str) -> Result<(), StoreError> {
        fs_err::create_dir_all(&self.dir)?;
        let path = self.token_path();
        fs_err::write(&path, credential)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs_err::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StoreError> {
        match fs_err::read_to_string(self.token_path()) {
            Ok(token) => {
                let token = token.trim().to_string();
                Ok(if token.is_empty() { None } else { Some(token) })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs_err::remove_file(self.token_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store for tests and kiosk-style use where nothing may
/// persist across restarts
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: RwLock::new(Some(token.to_string())),
        }
    }
}

impl SessionStore for MemoryTokenStore {
    fn save(&self, credential: &str) -> Result<(), StoreError> {
        *self.token.write().expect("token store poisoned") = Some(credential.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.token.read().expect("token store poisoned").clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.token.write().expect("token store poisoned") = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::at(dir.path().join("apnagate"));

        store.save("tok-abc").unwrap();
        assert_eq!(store.load().unwrap(), Some("tok-abc".to_string()));
    }

    #[test]
    fn load_without_a_saved_token_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::at(dir.path().join("apnagate"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn clear_is_safe_when_nothing_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::at(dir.path().join("apnagate"));

        store.clear().unwrap();
        store.save("tok-abc").unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::at(dir.path().join("apnagate"));
        store.save("tok-abc").unwrap();

        let mode = std::fs::metadata(dir.path().join("apnagate").join("userToken"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
