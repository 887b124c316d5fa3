//! API Key Vault
//!
//! Stores one API key per provider, encrypted at rest.
//!
//! - Values are sealed with XChaCha20-Poly1305 under a random 24-byte nonce.
//! - The vault key is derived with Argon2id from machine-specific entropy,
//!   so no password prompt is needed.
//! - Keys are never logged, not even redacted.
//!
//! A copied vault file does not open on another machine. A local process
//! running as the same user can still derive the key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::ai::providers::{ApiKeySet, ProviderKind};
use crate::core::fs::app_data_dir;

/// Vault file name inside the app data dir
pub const VAULT_FILE_NAME: &str = "credentials.vault";

/// Default vault location
pub fn default_vault_path() -> PathBuf {
    app_data_dir().join(VAULT_FILE_NAME)
}

/// Errors that can occur during credential operations
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to initialize vault: {0}")]
    InitializationFailed(String),

    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Credential value is empty")]
    EmptyValue,

    #[error("Credential value too long (max 1024 bytes)")]
    ValueTooLong,

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for credential operations
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Checks a key before it is stored.
///
/// Unexpected prefixes only warn; the provider has the final word.
pub fn validate_key(provider: ProviderKind, value: &str) -> CredentialResult<()> {
    if value.is_empty() {
        return Err(CredentialError::EmptyValue);
    }
    if value.len() > 1024 {
        return Err(CredentialError::ValueTooLong);
    }

    let expected = match provider {
        ProviderKind::Google => "AIza",
        ProviderKind::OpenAI | ProviderKind::Deepseek => "sk-",
        ProviderKind::Grok => "gsk_",
    };
    if !value.starts_with(expected) {
        warn!(
            "{} API key does not match expected format ({}*), proceeding anyway",
            provider.short_name(),
            expected
        );
    }

    Ok(())
}

/// Redacted preview for display. Short values are fully masked.
pub fn redact(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 12 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Encrypted key stored in the vault
#[derive(Clone, Serialize, Deserialize)]
struct EncryptedCredential {
    ciphertext: Vec<u8>,
    nonce: [u8; 24],
    provider: ProviderKind,
    /// Unix timestamp of the last store
    stored_at: i64,
}

#[derive(Serialize, Deserialize)]
struct VaultFile {
    version: u32,
    /// Entries keyed by `ProviderKind::vault_key`
    credentials: HashMap<String, EncryptedCredential>,
}

/// One pending edit to the vault file, keyed by `ProviderKind::vault_key`
enum VaultChange {
    Insert(String, EncryptedCredential),
    Remove(String),
}

/// Encrypted per-user key store
pub struct CredentialVault {
    vault_path: PathBuf,
    encryption_key: [u8; 32],
    cache: RwLock<HashMap<String, EncryptedCredential>>,
    /// Serializes saves; kept apart from `cache` so no cache lock is held across file IO.
    io_lock: Mutex<()>,
}

impl CredentialVault {
    const VERSION: u32 = 1;

    /// Opens (or creates) the vault at `vault_path`
    pub fn new(vault_path: PathBuf) -> CredentialResult<Self> {
        let parent = vault_path.parent().ok_or_else(|| {
            CredentialError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Invalid vault path",
            ))
        })?;
        std::fs::create_dir_all(parent)?;

        let encryption_key = Self::derive_key(&vault_path)?;

        let cache = if vault_path.exists() {
            Self::load_vault(&vault_path)?
        } else {
            HashMap::new()
        };

        info!("Credential vault opened at {}", vault_path.display());

        Ok(Self {
            vault_path,
            encryption_key,
            cache: RwLock::new(cache),
            io_lock: Mutex::new(()),
        })
    }

    /// Opens the vault at the default location
    pub fn open_default() -> CredentialResult<Self> {
        Self::new(default_vault_path())
    }

    pub fn path(&self) -> &Path {
        &self.vault_path
    }

    fn derive_key(vault_path: &Path) -> CredentialResult<[u8; 32]> {
        use argon2::{Algorithm, Argon2, Params, Version};

        let machine_id = Self::machine_entropy(vault_path);
        let salt = b"whatif-studio-vault-salt-v1";

        // 8 MB, 3 passes, 1 lane
        let params = Params::new(8 * 1024, 3, 1, Some(32)).map_err(|e| {
            CredentialError::InitializationFailed(format!(
                "Failed to configure key derivation: {}",
                e
            ))
        })?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; 32];
        argon2
            .hash_password_into(machine_id.as_bytes(), salt, &mut key)
            .map_err(|e| {
                CredentialError::InitializationFailed(format!("Key derivation failed: {}", e))
            })?;

        Ok(key)
    }

    /// Stable per-installation input for key derivation
    fn machine_entropy(vault_path: &Path) -> String {
        let mut components = vec![
            "whatif-studio-credential-vault-v1".to_string(),
            vault_path.to_string_lossy().to_string(),
        ];

        #[cfg(target_os = "linux")]
        {
            if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
                components.push(id.trim().to_string());
            } else if let Ok(id) = std::fs::read_to_string("/var/lib/dbus/machine-id") {
                components.push(id.trim().to_string());
            }
        }

        #[cfg(target_os = "macos")]
        {
            if let Ok(output) = std::process::Command::new("ioreg")
                .args(["-rd1", "-c", "IOPlatformExpertDevice"])
                .output()
            {
                if output.status.success() {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    if let Some(line) = stdout.lines().find(|l| l.contains("IOPlatformUUID")) {
                        components.push(line.trim().to_string());
                    }
                }
            }
        }

        if let Ok(hostname) = hostname::get() {
            components.push(hostname.to_string_lossy().to_string());
        }

        components.join(":")
    }

    fn load_vault(path: &Path) -> CredentialResult<HashMap<String, EncryptedCredential>> {
        let content = std::fs::read_to_string(path)?;
        let vault_file: VaultFile = serde_json::from_str(&content)
            .map_err(|e| CredentialError::SerializationError(e.to_string()))?;

        if vault_file.version > Self::VERSION {
            return Err(CredentialError::InitializationFailed(format!(
                "Vault version {} is newer than supported version {}",
                vault_file.version,
                Self::VERSION
            )));
        }

        debug!("Loaded vault with {} keys", vault_file.credentials.len());

        Ok(vault_file.credentials)
    }

    /// Applies one change under the cross-process lock.
    ///
    /// The file is re-read while locked so entries stored by other processes
    /// since this vault was opened survive. The cache is replaced with the
    /// merged entries only after the write succeeds.
    async fn apply_change(&self, change: VaultChange) -> CredentialResult<bool> {
        use fs2::FileExt;
        use std::fs::OpenOptions;

        let _io_guard = self.io_lock.lock().await;

        let lock_path = self.vault_path.with_extension("vault.lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;

        let outcome = self.merge_and_write(change);

        if let Err(e) = FileExt::unlock(&lock_file) {
            warn!("Failed to unlock vault lock file: {}", e);
        }

        let (credentials, changed) = outcome?;
        *self.cache.write().await = credentials;
        Ok(changed)
    }

    fn merge_and_write(
        &self,
        change: VaultChange,
    ) -> CredentialResult<(HashMap<String, EncryptedCredential>, bool)> {
        let mut credentials = if self.vault_path.exists() {
            Self::load_vault(&self.vault_path)?
        } else {
            HashMap::new()
        };

        let changed = match change {
            VaultChange::Insert(key, credential) => {
                credentials.insert(key, credential);
                true
            }
            VaultChange::Remove(key) => credentials.remove(&key).is_some(),
        };

        if changed {
            self.write_vault(&credentials)?;
        }
        Ok((credentials, changed))
    }

    fn write_vault(&self, credentials: &HashMap<String, EncryptedCredential>) -> CredentialResult<()> {
        let vault_file = VaultFile {
            version: Self::VERSION,
            credentials: credentials.clone(),
        };
        let content = serde_json::to_string_pretty(&vault_file)
            .map_err(|e| CredentialError::SerializationError(e.to_string()))?;

        let temp_path = self
            .vault_path
            .with_extension(format!("vault.tmp.{}", uuid::Uuid::new_v4()));
        std::fs::write(&temp_path, &content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600));
        }

        #[cfg(windows)]
        {
            if self.vault_path.exists() {
                std::fs::remove_file(&self.vault_path)?;
            }
        }

        if let Err(e) = std::fs::rename(&temp_path, &self.vault_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }

        debug!("Vault saved with {} keys", credentials.len());
        Ok(())
    }

    /// Encrypts and stores the key for a provider, replacing any previous one
    pub async fn store(&self, provider: ProviderKind, value: &str) -> CredentialResult<()> {
        let value = value.trim();
        validate_key(provider, value)?;

        let mut nonce = [0u8; 24];
        rand::Rng::fill(&mut OsRng, &mut nonce);

        let ciphertext = Self::encrypt(&self.encryption_key, &nonce, value.as_bytes())?;

        let encrypted = EncryptedCredential {
            ciphertext,
            nonce,
            provider,
            stored_at: chrono::Utc::now().timestamp(),
        };

        self.apply_change(VaultChange::Insert(
            provider.vault_key().to_string(),
            encrypted,
        ))
        .await?;

        info!("Stored API key: {}", provider.vault_key());
        Ok(())
    }

    /// Decrypts the key for a provider
    pub async fn retrieve(&self, provider: ProviderKind) -> CredentialResult<String> {
        let cache = self.cache.read().await;
        let encrypted = cache
            .get(provider.vault_key())
            .ok_or_else(|| CredentialError::NotFound(provider.vault_key().to_string()))?;

        let plaintext = Self::decrypt(
            &self.encryption_key,
            &encrypted.nonce,
            &encrypted.ciphertext,
        )?;

        String::from_utf8(plaintext).map_err(|e| CredentialError::DecryptionError(e.to_string()))
    }

    pub async fn exists(&self, provider: ProviderKind) -> bool {
        self.cache.read().await.contains_key(provider.vault_key())
    }

    /// Removes the key for a provider. Removing a missing key is not an error.
    pub async fn delete(&self, provider: ProviderKind) -> CredentialResult<()> {
        let removed = self
            .apply_change(VaultChange::Remove(provider.vault_key().to_string()))
            .await?;

        if removed {
            info!("Deleted API key: {}", provider.vault_key());
        }
        Ok(())
    }

    /// Providers with a stored key, in display order
    pub async fn list(&self) -> Vec<ProviderKind> {
        let cache = self.cache.read().await;
        let mut providers: Vec<ProviderKind> = cache.values().map(|c| c.provider).collect();
        providers.sort();
        providers.dedup();
        providers
    }

    /// Decrypts every stored key into an [`ApiKeySet`].
    ///
    /// An entry that fails to decrypt is skipped with a warning so one bad
    /// entry does not lock the user out of the other providers.
    pub async fn load_key_set(&self) -> ApiKeySet {
        let mut keys = ApiKeySet::new();
        for provider in ProviderKind::ALL {
            if !self.exists(provider).await {
                continue;
            }
            match self.retrieve(provider).await {
                Ok(value) => keys.set(provider, &value),
                Err(e) => warn!("Skipping unreadable key {}: {}", provider.vault_key(), e),
            }
        }
        keys
    }

    fn encrypt(key: &[u8; 32], nonce: &[u8; 24], plaintext: &[u8]) -> CredentialResult<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| CredentialError::EncryptionError(format!("Invalid key: {}", e)))?;

        cipher
            .encrypt(XNonce::from_slice(nonce), plaintext)
            .map_err(|e| CredentialError::EncryptionError(format!("Encryption failed: {}", e)))
    }

    fn decrypt(key: &[u8; 32], nonce: &[u8; 24], ciphertext: &[u8]) -> CredentialResult<Vec<u8>> {
        // 16-byte Poly1305 tag
        if ciphertext.len() < 16 {
            return Err(CredentialError::DecryptionError(
                "Ciphertext too short (missing authentication tag)".to_string(),
            ));
        }

        let cipher = XChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| CredentialError::DecryptionError(format!("Invalid key: {}", e)))?;

        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                CredentialError::DecryptionError(
                    "Decryption failed: authentication tag verification failed".to_string(),
                )
            })
    }
}

// =============================================================================
// Tests
// =============================================================================
