//! Durable client storage for the remembered refresh credential
//!
//! The token store persists exactly one value (the refresh credential) and
//! only when the user asked to be remembered. Storage is a small key/value
//! abstraction so the session layer can run against a JSON file on disk or
//! an in-process map.
//!
//! `FileStorage` writes use atomic temp-file + rename so a crash mid-write
//! never leaves a truncated file behind. The file holds credentials, so it is
//! created with 0600 permissions on unix.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Key/value persistence that survives process restart.
///
/// Implementations are synchronous: the token store performs its state
/// transitions without suspending, and the persisted payload is a single
/// short string.
pub trait DurableStorage: Send + Sync {
    /// Read a value. `Ok(None)` means the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// JSON-file backed storage.
///
/// The whole file is a flat JSON object of string values. The in-memory copy
/// is loaded once on open and every mutation rewrites the file.
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open storage at the given path.
    ///
    /// A missing file is a cold start with no persisted session; the file is
    /// only created on the first write.
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::Io(format!("reading storage file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::StorageParse(format!("parsing storage file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded session storage");
            entries
        } else {
            info!(path = %path.display(), "storage file not found, no persisted session");
            HashMap::new()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        state.insert(key.to_owned(), value.to_owned());
        debug!(key, "stored value");
        write_atomic(&self.path, &state)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        if state.remove(key).is_some() {
            debug!(key, "removed value");
            write_atomic(&self.path, &state)?;
        }
        Ok(())
    }
}

/// In-process storage.
///
/// Clones share the same map, so a store rebuilt over a clone observes what
/// an earlier store persisted. Nothing survives the process itself.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Write the storage map to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets 0600 permissions before the rename so the credential is
/// never readable by other users, even briefly.
fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::StorageParse(format!("serializing storage: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => return Err(Error::Io("storage path has no parent directory".into())),
    };

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| Error::Io(format!("writing temp storage file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&tmp_path, perms)
            .map_err(|e| Error::Io(format!("setting storage file permissions: {e}")))?;
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| Error::Io(format!("renaming temp storage file: {e}")))?;

    debug!(path = %path.display(), "persisted session storage");
    Ok(())
}
