//! Keystore and credentials: keypair, key id, portal session keys, packet sealing.

use chacha20poly1305::aead::{Aead, KeyInit};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

pub const DEFAULT_KEYSTORE_NAME: &str = "vlc-ccnx-keystore";
pub const DEFAULT_KEYSTORE_PASSWORD: &str = "keystore_password";

/// Who the portal signs in as.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    #[serde(default = "default_keystore_name")]
    pub keystore_name: String,
    #[serde(default = "default_keystore_password")]
    pub keystore_password: String,
    /// Subject name; defaults to the keystore name.
    #[serde(default)]
    pub subject_name: Option<String>,
}

fn default_keystore_name() -> String {
    DEFAULT_KEYSTORE_NAME.to_string()
}
fn default_keystore_password() -> String {
    DEFAULT_KEYSTORE_PASSWORD.to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            keystore_name: default_keystore_name(),
            keystore_password: default_keystore_password(),
            subject_name: None,
        }
    }
}

impl Credentials {
    pub fn subject(&self) -> &str {
        self.subject_name.as_deref().unwrap_or(&self.keystore_name)
    }
}

/// Public key (32 bytes, X25519).
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }
}

/// Key id: SHA-256 of the public key.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KeyId([u8; 32]);

impl KeyId {
    pub fn from_public_key(public: &PublicKey) -> Self {
        KeyId(Sha256::digest(public.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        KeyId(bytes)
    }

    /// Short hex form for logs.
    pub fn short_hex(&self) -> String {
        self.0[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// In-memory keystore opened from credentials.
pub struct Keystore {
    credentials: Credentials,
    secret: StaticSecret,
    public: PublicKey,
    key_id: KeyId,
}

impl Keystore {
    /// Open a keystore with a fresh keypair. Fails on an empty keystore name or password.
    pub fn open(credentials: Credentials) -> Result<Self, KeystoreError> {
        if credentials.keystore_name.is_empty() {
            return Err(KeystoreError::MissingName);
        }
        if credentials.keystore_password.is_empty() {
            return Err(KeystoreError::MissingPassword);
        }
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey(X25519PublicKey::from(&secret).to_bytes());
        let key_id = KeyId::from_public_key(&public);
        log::info!(
            "keystore {} open for subject {} (key {})",
            credentials.keystore_name,
            credentials.subject(),
            key_id.short_hex()
        );
        Ok(Self {
            credentials,
            secret,
            public,
            key_id,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// X25519 shared secret with a peer.
    pub fn shared_secret(&self, other: &PublicKey) -> [u8; 32] {
        let other = X25519PublicKey::from(other.0);
        self.secret.diffie_hellman(&other).to_bytes()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeystoreError {
    #[error("keystore name is empty")]
    MissingName,
    #[error("keystore password is empty")]
    MissingPassword,
}

/// Session key for one portal. Both sides get the same key: key ids are hashed in sorted order.
pub fn derive_session_key(shared_secret: &[u8; 32], a: &KeyId, b: &KeyId) -> [u8; 32] {
    let (lo, hi) = if a.as_bytes() <= b.as_bytes() {
        (a, b)
    } else {
        (b, a)
    };
    let mut hasher = Sha256::new();
    hasher.update(b"ccnx-portal-v1");
    hasher.update(lo.as_bytes());
    hasher.update(hi.as_bytes());
    hasher.update(shared_secret);
    hasher.finalize().into()
}

/// Nonce: direction byte + 64-bit counter. Never reuse a (key, direction, counter).
fn nonce_bytes(direction: u8, counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[0] = direction;
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Seal a packet with ChaCha20-Poly1305.
pub fn seal(
    key: &[u8; 32],
    direction: u8,
    counter: u64,
    plaintext: &[u8],
) -> Result<Vec<u8>, SealError> {
    let cipher =
        chacha20poly1305::ChaCha20Poly1305::new_from_slice(key).map_err(|_| SealError::Key)?;
    let nonce = nonce_bytes(direction, counter);
    cipher
        .encrypt(chacha20poly1305::Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| SealError::Seal)
}

/// Open a sealed packet.
pub fn open(
    key: &[u8; 32],
    direction: u8,
    counter: u64,
    ciphertext: &[u8],
) -> Result<Vec<u8>, SealError> {
    let cipher =
        chacha20poly1305::ChaCha20Poly1305::new_from_slice(key).map_err(|_| SealError::Key)?;
    let nonce = nonce_bytes(direction, counter);
    cipher
        .decrypt(chacha20poly1305::Nonce::from_slice(&nonce), ciphertext)
        .map_err(|_| SealError::Open)
}

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("invalid key")]
    Key,
    #[error("sealing failed")]
    Seal,
    #[error("authentication failed")]
    Open,
}
