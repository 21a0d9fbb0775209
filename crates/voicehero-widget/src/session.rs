//! Per-browser session identity and the returning-visitor flag.

use crate::error::WidgetError;
use rand::Rng;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use voicehero_core::now_millis;

pub const SESSION_ID_KEY: &str = "voicehero_session_id";
pub const RETURNING_VISITOR_KEY: &str = "vh_returning";
/// Cookie set once the visitor has received a playback context
pub const RETURNING_VISITOR_COOKIE: &str = "vh_returning=true; max-age=31536000; path=/";

const SESSION_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Persistent key/value storage of the host (local storage, a cookie jar, a file).
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, WidgetError>;
    fn set(&self, key: &str, value: &str) -> Result<(), WidgetError>;
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, WidgetError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WidgetError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON file backed storage, one object of string values
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>, WidgetError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                WidgetError::Storage(format!("corrupt storage file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(WidgetError::Storage(e.to_string())),
        }
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, WidgetError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WidgetError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        let raw = serde_json::to_string_pretty(&entries)
            .map_err(|e| WidgetError::Storage(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| WidgetError::Storage(e.to_string()))
    }
}

/// Storage that always fails, as in a browser privacy mode
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl KeyValueStorage for UnavailableStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, WidgetError> {
        Err(WidgetError::Storage("persistent storage is disabled".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), WidgetError> {
        Err(WidgetError::Storage("persistent storage is disabled".to_string()))
    }
}

/// `vh-<epoch ms>-<random base36 suffix>`
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SESSION_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("vh-{}-{}", now_millis(), suffix)
}

#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Returns the persisted session id, creating it on first use.
    ///
    /// Never fails: when storage is unusable an ephemeral id is returned and
    /// a new one will be generated on the next call.
    pub fn get_or_create_session_id(&self) -> String {
        match self.storage.get(SESSION_ID_KEY) {
            Ok(Some(existing)) if !existing.is_empty() => return existing,
            Ok(_) => {}
            Err(e) => {
                debug!("Session storage unavailable, using ephemeral id: {}", e);
                return generate_session_id();
            }
        }

        let session_id = generate_session_id();
        if let Err(e) = self.storage.set(SESSION_ID_KEY, &session_id) {
            debug!("Failed to persist session id, using it ephemerally: {}", e);
        }
        session_id
    }

    pub fn is_returning_visitor(&self) -> bool {
        matches!(
            self.storage.get(RETURNING_VISITOR_KEY),
            Ok(Some(value)) if value == "true"
        )
    }

    pub fn mark_returning_visitor(&self) {
        if let Err(e) = self.storage.set(RETURNING_VISITOR_KEY, "true") {
            warn!("Failed to persist returning visitor flag: {}", e);
        }
    }
}
