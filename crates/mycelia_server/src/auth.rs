//! Bearer token authentication.
//!
//! Tokens are never stored. The credentials file holds the hex-encoded
//! BLAKE3 hash of each token next to the principal it authenticates.

use async_trait::async_trait;
use mycelia_policy::{PolicySet, Principal};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No bearer token on the request
    #[error("Missing bearer token")]
    MissingToken,

    /// Token does not match any credential
    #[error("Invalid credentials")]
    InvalidToken,

    /// Credentials file unreadable
    #[error("Failed to read credentials from {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Credentials file is not valid JSON or has the wrong shape
    #[error("Malformed credentials: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A token hash is not 32 hex-encoded bytes
    #[error("Invalid token hash for principal {0}")]
    InvalidHash(String),

    /// Two credentials share a token hash
    #[error("Duplicate token hash for principal {0}")]
    DuplicateHash(String),
}

/// Resolves a bearer token to a principal
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Authenticate a token
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for unknown tokens
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

#[derive(Deserialize)]
struct CredentialFile {
    credentials: Vec<CredentialEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialEntry {
    principal: String,
    token_hash: String,
    #[serde(default)]
    policies: PolicySet,
}

/// Fixed set of credentials loaded at startup
#[derive(Debug, Default)]
pub struct StaticCredentials {
    by_hash: HashMap<[u8; 32], Principal>,
}

impl StaticCredentials {
    /// Create an empty credential set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hex-encoded BLAKE3 hash of a token, as stored in credentials files
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        hex::encode(blake3::hash(token.as_bytes()).as_bytes())
    }

    /// Parse a credentials document
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed, a hash is invalid or a
    /// hash appears twice
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let file: CredentialFile = serde_json::from_str(json)?;
        let mut by_hash = HashMap::with_capacity(file.credentials.len());
        for entry in file.credentials {
            let hash: [u8; 32] = hex::decode(entry.token_hash.trim())
                .ok()
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| AuthError::InvalidHash(entry.principal.clone()))?;
            let principal = Principal::new(entry.principal, entry.policies);
            if let Some(previous) = by_hash.insert(hash, principal) {
                return Err(AuthError::DuplicateHash(previous.principal));
            }
        }
        Ok(Self { by_hash })
    }

    /// Load a credentials file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| AuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let credentials = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            principals = credentials.len(),
            "credentials loaded"
        );
        Ok(credentials)
    }

    /// Add a credential from a plaintext token
    #[must_use]
    pub fn with_token(mut self, token: &str, principal: Principal) -> Self {
        self.by_hash
            .insert(*blake3::hash(token.as_bytes()).as_bytes(), principal);
        self
    }

    /// Number of principals
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    /// Whether no credential is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticCredentials {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        self.by_hash
            .get(blake3::hash(token.as_bytes()).as_bytes())
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
