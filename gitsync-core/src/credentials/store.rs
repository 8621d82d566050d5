//! Stored per-URL credentials
//!
//! The store file lives at `~/.config/gitsync/credentials.toml` and must have
//! restrictive permissions (0600 on Unix). Secrets inside it are sealed with a
//! [`SecretCipher`]; the orchestrator only ever reads entries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Seals secrets before they are written and opens them on read
pub trait SecretCipher: Send + Sync {
    /// Turn a plaintext secret into its at-rest form
    fn seal(&self, plaintext: &str) -> String;

    /// Recover the plaintext from its at-rest form
    fn open(&self, sealed: &str) -> Result<String>;
}

/// Base64 at-rest encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodedCipher;

impl SecretCipher for EncodedCipher {
    fn seal(&self, plaintext: &str) -> String {
        STANDARD.encode(plaintext.as_bytes())
    }

    fn open(&self, sealed: &str) -> Result<String> {
        let bytes = STANDARD
            .decode(sealed.trim())
            .map_err(|e| Error::Credentials(format!("Invalid sealed secret: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Credentials(format!("Sealed secret is not UTF-8: {}", e)))
    }
}

/// One stored credential, as seen by the resolver
#[derive(Clone)]
pub struct StoredCredentialEntry {
    url: String,
    is_token: bool,
    username: String,
    sealed_password: String,
    sealed_token: String,
    cipher: Arc<dyn SecretCipher>,
}

impl StoredCredentialEntry {
    /// Entry for a username/password identity
    pub fn user_password(
        url: impl Into<String>,
        username: impl Into<String>,
        password: &str,
        cipher: Arc<dyn SecretCipher>,
    ) -> Self {
        Self {
            url: url.into(),
            is_token: false,
            username: username.into(),
            sealed_password: cipher.seal(password),
            sealed_token: String::new(),
            cipher,
        }
    }

    /// Entry for a token identity
    pub fn token(url: impl Into<String>, token: &str, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            url: url.into(),
            is_token: true,
            username: String::new(),
            sealed_password: String::new(),
            sealed_token: cipher.seal(token),
            cipher,
        }
    }

    fn from_record(record: &CredentialRecord, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            url: record.url.clone(),
            is_token: record.is_token,
            username: record.username.clone(),
            sealed_password: record.password.clone(),
            sealed_token: record.token.clone(),
            cipher,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_token(&self) -> bool {
        self.is_token
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Plaintext password; empty if missing or unreadable
    pub fn decrypt_password(&self) -> String {
        self.open_secret(&self.sealed_password, "password")
    }

    /// Plaintext token; empty if missing or unreadable
    pub fn decrypt_token(&self) -> String {
        self.open_secret(&self.sealed_token, "token")
    }

    fn open_secret(&self, sealed: &str, what: &str) -> String {
        if sealed.is_empty() {
            return String::new();
        }
        match self.cipher.open(sealed) {
            Ok(secret) => secret,
            Err(e) => {
                warn!(url = %self.url, "Stored {} could not be opened: {}", what, e);
                String::new()
            }
        }
    }
}

impl fmt::Debug for StoredCredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentialEntry")
            .field("url", &self.url)
            .field("is_token", &self.is_token)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Read-only lookup of stored credentials, keyed by exact URL
pub trait CredentialStore: Send + Sync {
    fn get_entry(&self, url: &str) -> Option<StoredCredentialEntry>;
}

/// In-process credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, StoredCredentialEntry>>,
}

impl MemoryCredentialStore {
    /// Insert or replace the entry for its URL
    pub fn insert(&self, entry: StoredCredentialEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(entry.url.clone(), entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_entry(&self, url: &str) -> Option<StoredCredentialEntry> {
        self.entries.read().ok()?.get(url).cloned()
    }
}

/// On-disk form of a stored credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialRecord {
    pub url: String,
    pub is_token: bool,
    pub username: String,
    /// Sealed password
    pub password: String,
    /// Sealed token
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct CredentialFile {
    #[serde(default, rename = "entry")]
    entries: Vec<CredentialRecord>,
}

/// TOML-backed credential store
pub struct FileCredentialStore {
    path: PathBuf,
    cipher: Arc<dyn SecretCipher>,
    records: BTreeMap<String, CredentialRecord>,
}

impl fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("path", &self.path)
            .field("entries", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl FileCredentialStore {
    /// Load the store at `path` using the default cipher
    ///
    /// A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        Self::load_with_cipher(path, Arc::new(EncodedCipher))
    }

    /// Load the store at `path` with a specific cipher
    pub fn load_with_cipher(path: impl Into<PathBuf>, cipher: Arc<dyn SecretCipher>) -> Result<Self> {
        let path = path.into();
        let mut store = Self {
            path,
            cipher,
            records: BTreeMap::new(),
        };

        if !store.path.exists() {
            debug!(path = %store.path.display(), "No credential store yet");
            return Ok(store);
        }

        check_permissions(&store.path)?;

        let contents = std::fs::read_to_string(&store.path)?;
        let file: CredentialFile = toml::from_str(&contents).map_err(|e| {
            Error::Credentials(format!(
                "Failed to parse credential store {}: {}",
                store.path.display(),
                e
            ))
        })?;

        for record in file.entries {
            if store.records.contains_key(&record.url) {
                return Err(Error::Credentials(format!(
                    "Duplicate credential entry for {} in {}",
                    record.url,
                    store.path.display()
                )));
            }
            store.records.insert(record.url.clone(), record);
        }

        debug!(path = %store.path.display(), entries = store.records.len(), "Loaded credential store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored records, ordered by URL
    pub fn records(&self) -> impl Iterator<Item = &CredentialRecord> {
        self.records.values()
    }

    /// Store a username/password identity for `url`, replacing any existing entry
    pub fn upsert_user_password(&mut self, url: &str, username: &str, password: &str) {
        let record = CredentialRecord {
            url: url.to_string(),
            is_token: false,
            username: username.to_string(),
            password: self.cipher.seal(password),
            token: String::new(),
            updated_at: Some(Utc::now()),
        };
        self.records.insert(record.url.clone(), record);
    }

    /// Store a token identity for `url`, replacing any existing entry
    pub fn upsert_token(&mut self, url: &str, token: &str) {
        let record = CredentialRecord {
            url: url.to_string(),
            is_token: true,
            username: String::new(),
            password: String::new(),
            token: self.cipher.seal(token),
            updated_at: Some(Utc::now()),
        };
        self.records.insert(record.url.clone(), record);
    }

    /// Remove the entry for `url`; returns whether one existed
    pub fn remove(&mut self, url: &str) -> bool {
        self.records.remove(url).is_some()
    }

    /// Write the store back to disk with owner-only permissions
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = CredentialFile {
            entries: self.records.values().cloned().collect(),
        };
        let contents = toml::to_string_pretty(&file)
            .map_err(|e| Error::Credentials(format!("Failed to serialize credentials: {}", e)))?;

        let header = "# gitsync credentials - do not share or commit to version control\n\n";
        std::fs::write(&self.path, format!("{header}{contents}"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        debug!(path = %self.path.display(), entries = self.records.len(), "Saved credential store");
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get_entry(&self, url: &str) -> Option<StoredCredentialEntry> {
        self.records
            .get(url)
            .map(|record| StoredCredentialEntry::from_record(record, self.cipher.clone()))
    }
}

fn check_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = std::fs::metadata(path)?.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(Error::Credentials(format!(
                "Credential store {} has insecure permissions {:o}. \
                 Please run: chmod 600 {}",
                path.display(),
                mode & 0o777,
                path.display()
            )));
        }
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const URL: &str = "https://example.com/org/repo.git";

    #[test]
    fn test_encoded_cipher_roundtrip() {
        let cipher = EncodedCipher;
        let sealed = cipher.seal("s3cr3t");
        assert_ne!(sealed, "s3cr3t");
        assert_eq!(cipher.open(&sealed).unwrap(), "s3cr3t");
    }

    #[test]
    fn test_unreadable_secret_is_empty() {
        let record = CredentialRecord {
            url: URL.to_string(),
            username: "alice".to_string(),
            password: "***not base64***".to_string(),
            ..Default::default()
        };
        let entry = StoredCredentialEntry::from_record(&record, Arc::new(EncodedCipher));
        assert_eq!(entry.decrypt_password(), "");
        assert_eq!(entry.username(), "alice");
    }

    #[test]
    fn test_memory_store_one_entry_per_url() {
        let store = MemoryCredentialStore::default();
        let cipher: Arc<dyn SecretCipher> = Arc::new(EncodedCipher);
        store.insert(StoredCredentialEntry::user_password(
            URL,
            "alice",
            "one",
            cipher.clone(),
        ));
        store.insert(StoredCredentialEntry::token(URL, "two", cipher));

        assert_eq!(store.len(), 1);
        let entry = store.get_entry(URL).unwrap();
        assert!(entry.is_token());
        assert_eq!(entry.decrypt_token(), "two");
        assert!(store.get_entry("https://example.com/other.git").is_none());
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::load(dir.path().join("credentials.toml")).unwrap();
        assert_eq!(store.records().count(), 0);
        assert!(store.get_entry(URL).is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("credentials.toml");

        let mut store = FileCredentialStore::load(&path).unwrap();
        store.upsert_user_password(URL, "alice", "secret");
        store.upsert_token("https://example.com/other.git", "tok");
        store.save().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("secret"));

        let reloaded = FileCredentialStore::load(&path).unwrap();
        assert_eq!(reloaded.records().count(), 2);

        let entry = reloaded.get_entry(URL).unwrap();
        assert!(!entry.is_token());
        assert_eq!(entry.username(), "alice");
        assert_eq!(entry.decrypt_password(), "secret");

        let token = reloaded.get_entry("https://example.com/other.git").unwrap();
        assert_eq!(token.decrypt_token(), "tok");
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCredentialStore::load(dir.path().join("c.toml")).unwrap();
        store.upsert_token(URL, "tok");
        assert!(store.remove(URL));
        assert!(!store.remove(URL));
        assert!(store.get_entry(URL).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_insecure_permissions_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[[entry]]\nurl = \"{URL}\"\nusername = \"alice\"").unwrap();

        let perms = std::fs::Permissions::from_mode(0o644);
        std::fs::set_permissions(file.path(), perms).unwrap();

        let result = FileCredentialStore::load(file.path());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("insecure permissions"));
    }

    #[cfg(unix)]
    #[test]
    fn test_duplicate_urls_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[entry]]\nurl = \"{URL}\"\nusername = \"a\"\n\n[[entry]]\nurl = \"{URL}\"\nusername = \"b\""
        )
        .unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();

        let err = FileCredentialStore::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate credential entry"));
    }
}
