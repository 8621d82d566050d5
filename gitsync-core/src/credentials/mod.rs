//! Credential resolution for remote operations
//!
//! Every authentication challenge raised by the transport is answered by
//! [`CredentialResolver`]. Explicit per-operation input
//! ([`CredentialProfile`]) wins over the stored per-URL defaults
//! ([`StoredCredentialEntry`]), field by field, and only when non-empty.

mod store;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use store::{
    CredentialRecord, CredentialStore, EncodedCipher, FileCredentialStore, MemoryCredentialStore,
    SecretCipher, StoredCredentialEntry,
};

/// Kind of credential the transport is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    /// Plain username + password (or token in the username slot)
    UsernamePassword,
    /// Whatever the transport can do without explicit material
    Default,
    /// Client certificate or key based authentication
    Certificate,
}

/// A single authentication challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    /// URL the transport is talking to
    pub url: String,
    /// Kind of credential requested
    pub kind: CredentialKind,
}

impl CredentialRequest {
    /// Create a new request
    pub fn new(url: impl Into<String>, kind: CredentialKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// Credentials typed in for one operation
///
/// Any field may be empty; empty fields fall through to the stored entry.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialProfile {
    /// Authenticate with `token` instead of `username`/`password`
    pub is_token: bool,
    pub username: String,
    pub password: String,
    pub token: String,
}

impl CredentialProfile {
    /// Profile with nothing filled in; stored credentials decide
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Profile using a username and password
    pub fn user_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            is_token: false,
            username: username.into(),
            password: password.into(),
            token: String::new(),
        }
    }

    /// Profile using a single access token
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            is_token: true,
            token: token.into(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for CredentialProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProfile")
            .field("is_token", &self.is_token)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("token", &redacted(&self.token))
            .finish()
    }
}

/// Authentication material handed back to the transport
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Username/password pair; either may be empty
    UsernamePassword { username: String, password: String },
    /// Anonymous / transport default credentials
    Default,
}

impl Credential {
    /// Username, if this is a username/password credential
    pub fn username(&self) -> Option<&str> {
        match self {
            Credential::UsernamePassword { username, .. } => Some(username),
            Credential::Default => None,
        }
    }

    /// Password, if this is a username/password credential
    pub fn password(&self) -> Option<&str> {
        match self {
            Credential::UsernamePassword { password, .. } => Some(password),
            Credential::Default => None,
        }
    }

    /// Whether both username and password are empty
    pub fn is_empty(&self) -> bool {
        match self {
            Credential::UsernamePassword { username, password } => {
                username.is_empty() && password.is_empty()
            }
            Credential::Default => false,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::UsernamePassword { username, password } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &redacted(password))
                .finish(),
            Credential::Default => f.write_str("Default"),
        }
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Answers authentication challenges from a profile and a credential store
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCredentialStore::default()))
    }
}

impl CredentialResolver {
    /// Create a resolver backed by the given store
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Resolve a challenge, looking the URL up in the backing store
    pub fn answer(&self, request: &CredentialRequest, profile: &CredentialProfile) -> Credential {
        if request.kind != CredentialKind::UsernamePassword {
            return Credential::Default;
        }

        let entry = self.store.get_entry(&request.url);
        debug!(
            url = %request.url,
            stored = entry.is_some(),
            profile_token = profile.is_token,
            "Resolving credentials"
        );
        Self::resolve(request, profile, entry.as_ref())
    }

    /// Pure resolution of a challenge from a profile and an optional stored entry
    ///
    /// Only `UsernamePassword` requests consult the inputs; every other kind
    /// yields [`Credential::Default`].
    pub fn resolve(
        request: &CredentialRequest,
        profile: &CredentialProfile,
        stored: Option<&StoredCredentialEntry>,
    ) -> Credential {
        if request.kind != CredentialKind::UsernamePassword {
            return Credential::Default;
        }

        let (mut username, mut password) = if profile.is_token {
            (profile.token.clone(), String::new())
        } else {
            (profile.username.clone(), profile.password.clone())
        };

        if let Some(entry) = stored {
            if entry.is_token() {
                if username.is_empty() {
                    username = entry.decrypt_token();
                }
                // Token identities never carry a password.
                password.clear();
            } else {
                if username.is_empty() {
                    username = entry.username().to_string();
                }
                // A token profile never borrows a stored password.
                if password.is_empty() && !profile.is_token {
                    password = entry.decrypt_password();
                }
            }
        }

        Credential::UsernamePassword { username, password }
    }
}
