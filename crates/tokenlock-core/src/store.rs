//! Durable identity → secret mapping.
//!
//! The keyfile is a pretty-printed JSON object of identity to lowercase hex.
//! Every mutation rewrites the whole file through a temporary file in the
//! same directory followed by a rename, so readers see either the previous
//! mapping or the new one.

use crate::crypto::Secret;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Identity → hex-encoded secret, in identity order.
pub type KeyMap = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct SecretStore {
    path: PathBuf,
}

impl SecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full mapping. A keyfile that does not exist yet is empty.
    pub fn load(&self) -> Result<KeyMap> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(KeyMap::new()),
            Err(e) => return Err(Error::storage(&self.path, format!("read: {e}"))),
        };
        let raw: BTreeMap<String, String> = serde_json::from_str(&data)
            .map_err(|e| Error::storage(&self.path, format!("malformed keyfile: {e}")))?;
        let mut keys = KeyMap::new();
        for (identity, encoded) in raw {
            if encoded.is_empty() || hex::decode(&encoded).is_err() {
                return Err(Error::storage(
                    &self.path,
                    format!("entry for {identity} is not a hex string"),
                ));
            }
            keys.insert(identity, encoded.to_ascii_lowercase());
        }
        Ok(keys)
    }

    /// Replace the persisted mapping with `keys`.
    pub fn save(&self, keys: &KeyMap) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| Error::storage(&self.path, format!("create {}: {e}", dir.display())))?;
            restrict_permissions(&dir, 0o700);
        }

        let json = serde_json::to_string_pretty(keys)
            .map_err(|e| Error::storage(&self.path, format!("serialize: {e}")))?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| Error::storage(&self.path, format!("create temp file: {e}")))?;
        restrict_permissions(tmp.path(), 0o600);
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.write_all(b"\n"))
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::storage(&self.path, format!("write temp file: {e}")))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::storage(&self.path, format!("replace keyfile: {}", e.error)))?;
        debug!(path = %self.path.display(), entries = keys.len(), "keyfile saved");
        Ok(())
    }

    /// Insert or overwrite the secret for `identity`.
    pub fn put(&self, identity: &str, secret: &Secret) -> Result<()> {
        let mut keys = self.load()?;
        keys.insert(identity.to_string(), secret.to_hex().to_string());
        self.save(&keys)
    }

    pub fn remove(&self, identity: &str) -> Result<()> {
        let mut keys = self.load()?;
        if keys.remove(identity).is_none() {
            return Err(Error::IdentityNotFound(identity.to_string()));
        }
        self.save(&keys)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }
}

pub(crate) fn restrict_permissions(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
            tracing::warn!(path = %path.display(), "could not restrict permissions: {e}");
        }
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_keyfile_loads_empty() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path().join("keyfile.json"));
        assert!(store.load().unwrap().is_empty());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn put_then_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path().join("keyfile.json"));
        let secret = Secret::generate(32);
        store.put("alice", &secret).unwrap();
        let keys = store.load().unwrap();
        assert_eq!(keys.get("alice").unwrap(), secret.to_hex().as_str());
    }

    #[test]
    fn put_overwrites_existing_identity() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path().join("keyfile.json"));
        store.put("alice", &Secret::generate(16)).unwrap();
        let second = Secret::generate(16);
        store.put("alice", &second).unwrap();
        let keys = store.load().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys["alice"], second.to_hex().as_str());
    }

    #[test]
    fn remove_unknown_identity_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keyfile.json");
        let store = SecretStore::new(&path);
        store.put("bob", &Secret::generate(16)).unwrap();
        let before = fs::read(&path).unwrap();

        let err = store.remove("alice").unwrap_err();
        assert!(matches!(err, Error::IdentityNotFound(ref id) if id == "alice"));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(store.list().unwrap(), vec!["bob".to_string()]);
    }

    #[test]
    fn remove_existing_identity() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path().join("keyfile.json"));
        store.put("alice", &Secret::generate(16)).unwrap();
        store.put("bob", &Secret::generate(16)).unwrap();
        store.remove("alice").unwrap();
        assert_eq!(store.list().unwrap(), vec!["bob".to_string()]);
    }

    #[test]
    fn list_is_sorted() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path().join("keyfile.json"));
        for id in ["carol", "alice", "bob"] {
            store.put(id, &Secret::generate(8)).unwrap();
        }
        assert_eq!(store.list().unwrap(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn malformed_keyfile_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keyfile.json");
        let store = SecretStore::new(&path);

        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(store.load(), Err(Error::Storage { .. })));

        fs::write(&path, r#"{"alice": "not-hex"}"#).unwrap();
        assert!(matches!(store.load(), Err(Error::Storage { .. })));

        fs::write(&path, r#"{"alice": 42}"#).unwrap();
        assert!(matches!(store.load(), Err(Error::Storage { .. })));
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path().join("keyfile.json"));
        store.put("alice", &Secret::generate(16)).unwrap();
        store.put("bob", &Secret::generate(16)).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["keyfile.json".to_string()]);
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path().join("nested").join("keyfile.json"));
        store.put("alice", &Secret::generate(16)).unwrap();
        assert!(store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn keyfile_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path().join("keyfile.json"));
        store.put("alice", &Secret::generate(16)).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
