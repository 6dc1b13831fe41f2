use crate::infrastructure::error::InfraError;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const USER_KEY: &str = "user";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set(&self, key: &str, value: &str) -> Result<(), InfraError>;
    fn remove(&self, key: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringSessionStorage {
    service_name: String,
}

impl KeyringSessionStorage {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, key)
            .map_err(|error| InfraError::Storage(error.to_string()))
    }
}

impl Default for KeyringSessionStorage {
    fn default() -> Self {
        Self::new("taskdash.session")
    }
}

impl SessionStorage for KeyringSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(InfraError::Storage(error.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|error| InfraError::Storage(error.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        match self.entry(key)?.delete_credential() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Storage(error.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, InfraError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(error) => return Err(error.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(values) => Ok(values),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "discarding unreadable session file");
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("json.tmp");
        let mut file = open_private(&staging)?;
        file.write_all(serde_json::to_string_pretty(values)?.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn modify<F>(&self, change: F) -> Result<(), InfraError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self
            .write_guard
            .lock()
            .map_err(|error| InfraError::Storage(format!("session file lock poisoned: {error}")))?;
        let mut values = self.read_all()?;
        change(&mut values);
        self.write_all(&values)
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.modify(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.modify(|values| {
            values.remove(key);
        })
    }
}

// The session file holds bearer tokens; keep it owner-only.
#[cfg(unix)]
fn open_private(path: &Path) -> Result<File, InfraError> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; a leftover staging file keeps its bits.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> Result<File, InfraError> {
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}

#[derive(Debug, Default)]
pub struct InMemorySessionStorage {
    values: Mutex<HashMap<String, String>>,
}

impl InMemorySessionStorage {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.values
            .lock()
            .map_err(|error| InfraError::Storage(format!("in-memory lock poisoned: {error}")))
    }
}

impl SessionStorage for InMemorySessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_FILE: AtomicUsize = AtomicUsize::new(0);

    struct TempSessionFile {
        dir: PathBuf,
    }

    impl TempSessionFile {
        fn new() -> Self {
            let sequence = NEXT_TEMP_FILE.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "taskdash-session-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            Self { dir }
        }

        fn storage(&self) -> FileSessionStorage {
            FileSessionStorage::in_dir(&self.dir)
        }
    }

    impl Drop for TempSessionFile {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn file_storage_set_get_remove() {
        let temp = TempSessionFile::new();
        let storage = temp.storage();
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).expect("get"), None);

        storage.set(ACCESS_TOKEN_KEY, "token-1").expect("set token");
        storage.set(USER_KEY, r#"{"email":"a@b.c"}"#).expect("set user");
        assert_eq!(
            temp.storage().get(ACCESS_TOKEN_KEY).expect("get"),
            Some("token-1".to_string())
        );

        storage.remove(ACCESS_TOKEN_KEY).expect("remove");
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).expect("get"), None);
        assert!(storage.get(USER_KEY).expect("get").is_some());
    }

    #[test]
    fn unreadable_file_is_treated_as_empty() {
        let temp = TempSessionFile::new();
        let storage = temp.storage();
        fs::write(storage.path(), "{not json").expect("write garbage");
        assert_eq!(storage.get(USER_KEY).expect("get"), None);

        storage.set(USER_KEY, "{}").expect("set overwrites garbage");
        assert_eq!(storage.get(USER_KEY).expect("get"), Some("{}".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempSessionFile::new();
        let storage = temp.storage();
        let staging = storage.path().with_extension("json.tmp");
        fs::write(&staging, "{}").expect("write leftover staging file");
        fs::set_permissions(&staging, fs::Permissions::from_mode(0o644)).expect("widen staging file");

        storage.set(ACCESS_TOKEN_KEY, "token-1").expect("set token");

        let mode = fs::metadata(storage.path()).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!staging.exists());
    }

    proptest! {
        #[test]
        fn in_memory_roundtrip(key in "[a-z_]{1,16}", value in ".{0,64}") {
            let storage = InMemorySessionStorage::default();
            storage.set(&key, &value).expect("set");
            prop_assert_eq!(storage.get(&key).expect("get"), Some(value));
            storage.remove(&key).expect("remove");
            prop_assert_eq!(storage.get(&key).expect("get"), None);
        }
    }
}
