// common/src/models/session.rs
use std::fmt;
use std::sync::{Arc, RwLock};

/// Shared handle to the one live session credential of a client process.
///
/// The session layer is the only writer; every other component holds a
/// clone and only reads the credential when attaching it to a request.
/// Absent credential = unauthenticated.
#[derive(Clone, Default)]
pub struct CredentialSlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl CredentialSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, credential: String) {
        *self.inner.write().expect("credential slot poisoned") = Some(credential);
    }

    pub fn clear(&self) {
        *self.inner.write().expect("credential slot poisoned") = None;
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().expect("credential slot poisoned").clone()
    }

    pub fn is_present(&self) -> bool {
        self.inner.read().expect("credential slot poisoned").is_some()
    }
}

// Never print the credential itself, only whether one is held.
impl fmt::Debug for CredentialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSlot")
            .field("present", &self.is_present())
            .finish()
    }
}
