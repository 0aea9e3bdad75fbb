//! KeyVault: password-derived symmetric key, long-term identity key
//! wrapping, and per-chat ephemeral key generation (§4.4).

use std::path::{Path, PathBuf};

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

use super::aes_gcm::{Cipher, NONCE_SIZE};
use super::key_exchange::KeyPair;

/// Fixed 16-byte salt (§4.4, §9 Open Questions: a reproducible
/// password-derived key is chosen over a per-installation salt file, at
/// the acknowledged cost that the same password always derives the same
/// key and is therefore precomputable by a password-equivalent attacker).
const FIXED_SALT: [u8; 16] = [
    0x3b, 0xa1, 0xa0, 0xcf, 0x5b, 0x89, 0x05, 0xb6, 0x06, 0x8f, 0x89, 0x4a, 0xc8, 0x8d, 0x85, 0x6d,
];

const PRIVATE_KEY_FILE: &str = "private_key.key";
const PUBLIC_KEY_FILE: &str = "public_key.key";

#[derive(Debug, thiserror::Error)]
pub enum KeyVaultError {
    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("I/O error reading/writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored key is corrupt or was wrapped under a different password")]
    Corrupt,

    #[error(transparent)]
    Crypto(#[from] super::aes_gcm::CryptoError),
}

/// Argon2id at roughly libsodium's INTERACTIVE work factor: 64 MiB memory,
/// 2 passes, single lane.
fn argon2_interactive() -> Argon2<'static> {
    let params = Params::new(65536, 2, 1, Some(32)).expect("static Argon2id params are valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hash a password for `add_user_to_data_base`/`get_user_info_from_data_base`
/// (§5 supplemented feature): the server only ever sees a SHA-256 digest,
/// never the password itself. Independent of [`derive_symmetric_key`] — the
/// Argon2id-derived key wraps the local identity and never leaves the
/// client, while this digest is the one thing that does cross the wire.
pub fn hash_password_for_wire(password: &str) -> String {
    BASE64.encode(Sha256::digest(password.as_bytes()))
}

/// Derive the 32-byte symmetric key from a password under the fixed salt.
pub fn derive_symmetric_key(password: &str) -> Result<[u8; 32], KeyVaultError> {
    let mut out = [0u8; 32];
    argon2_interactive()
        .hash_password_into(password.as_bytes(), &FIXED_SALT, &mut out)
        .map_err(|e| KeyVaultError::Derivation(e.to_string()))?;
    Ok(out)
}

pub struct KeyVault {
    symmetric_key: [u8; 32],
    long_term: KeyPair,
    keys_dir: PathBuf,
}

impl KeyVault {
    /// Derive the symmetric key from `password`, then either read and
    /// unwrap the long-term key pair from `keys_dir`, or generate and
    /// persist a fresh one if this is the first run. Decryption failure
    /// (wrong password against an existing wrapped key) is fatal.
    pub fn unlock(password: &str, keys_dir: impl AsRef<Path>) -> Result<Self, KeyVaultError> {
        let keys_dir = keys_dir.as_ref().to_path_buf();
        let symmetric_key = derive_symmetric_key(password)?;
        let cipher = Cipher::new(&symmetric_key);

        let private_path = keys_dir.join(PRIVATE_KEY_FILE);
        let public_path = keys_dir.join(PUBLIC_KEY_FILE);

        let long_term = if private_path.exists() && public_path.exists() {
            let wrapped_private = std::fs::read_to_string(&private_path).map_err(|e| KeyVaultError::Io {
                path: private_path.clone(),
                source: e,
            })?;
            let private_b64 = unwrap_one(&cipher, wrapped_private.trim())?;
            let private_bytes = BASE64.decode(private_b64).map_err(|_| KeyVaultError::Corrupt)?;
            if private_bytes.len() != 32 {
                return Err(KeyVaultError::Corrupt);
            }
            let mut array = [0u8; 32];
            array.copy_from_slice(&private_bytes);
            KeyPair::from_private_bytes(array)
        } else {
            let fresh = KeyPair::generate();
            std::fs::create_dir_all(&keys_dir).map_err(|e| KeyVaultError::Io {
                path: keys_dir.clone(),
                source: e,
            })?;

            let private_b64 = BASE64.encode(fresh.private_key_bytes());
            let public_b64 = fresh.public_key_base64();

            std::fs::write(&private_path, wrap_one(&cipher, &private_b64)).map_err(|e| KeyVaultError::Io {
                path: private_path.clone(),
                source: e,
            })?;
            std::fs::write(&public_path, wrap_one(&cipher, &public_b64)).map_err(|e| KeyVaultError::Io {
                path: public_path.clone(),
                source: e,
            })?;

            fresh
        };

        Ok(Self {
            symmetric_key,
            long_term,
            keys_dir,
        })
    }

    pub fn long_term_key_pair(&self) -> &KeyPair {
        &self.long_term
    }

    pub fn symmetric_key(&self) -> &[u8; 32] {
        &self.symmetric_key
    }

    pub fn keys_dir(&self) -> &Path {
        &self.keys_dir
    }

    /// A fresh Curve25519 pair for one `ChatOrchestrator` instance. RAM
    /// only — never written to `keys_dir`.
    pub fn generate_ephemeral() -> KeyPair {
        KeyPair::generate()
    }

    /// Encrypt `plaintext` under the password-derived key for storage in
    /// the local SQLite database.
    pub fn encrypt_at_rest(&self, plaintext: &str) -> Result<String, KeyVaultError> {
        Ok(wrap_one(&Cipher::new(&self.symmetric_key), plaintext))
    }

    /// Reverse of [`KeyVault::encrypt_at_rest`].
    pub fn decrypt_at_rest(&self, ciphertext: &str) -> Result<String, KeyVaultError> {
        let cipher = Cipher::new(&self.symmetric_key);
        let plaintext = unwrap_one(&cipher, ciphertext)?;
        Ok(plaintext)
    }
}

fn wrap_one(cipher: &Cipher, plaintext: &str) -> String {
    let (nonce, ciphertext) = cipher.encrypt(plaintext.as_bytes()).expect("AES-GCM encryption cannot fail here");
    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    BASE64.encode(sealed)
}

fn unwrap_one(cipher: &Cipher, wrapped: &str) -> Result<String, KeyVaultError> {
    let raw = BASE64.decode(wrapped).map_err(|_| KeyVaultError::Corrupt)?;
    if raw.len() < NONCE_SIZE {
        return Err(KeyVaultError::Corrupt);
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
    let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| KeyVaultError::Corrupt)?;
    String::from_utf8(plaintext).map_err(|_| KeyVaultError::Corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_derives_the_same_key() {
        let a = derive_symmetric_key("hunter2").unwrap();
        let b = derive_symmetric_key("hunter2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_passwords_derive_different_keys() {
        let a = derive_symmetric_key("hunter2").unwrap();
        let b = derive_symmetric_key("hunter3").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn first_run_generates_and_persists_a_long_term_key() {
        let dir = tempfile::tempdir().unwrap();
        let vault = KeyVault::unlock("correct horse battery staple", dir.path()).unwrap();

        assert!(dir.path().join(PRIVATE_KEY_FILE).exists());
        assert!(dir.path().join(PUBLIC_KEY_FILE).exists());
        assert_eq!(vault.long_term_key_pair().public_key_bytes().len(), 32);
    }

    #[test]
    fn second_unlock_with_the_same_password_reads_back_the_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let first = KeyVault::unlock("correct horse battery staple", dir.path()).unwrap();
        let second = KeyVault::unlock("correct horse battery staple", dir.path()).unwrap();

        assert_eq!(
            first.long_term_key_pair().public_key_bytes(),
            second.long_term_key_pair().public_key_bytes()
        );
    }

    #[test]
    fn wrong_password_fails_to_unwrap_an_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        KeyVault::unlock("correct horse battery staple", dir.path()).unwrap();

        let result = KeyVault::unlock("wrong password", dir.path());
        assert!(matches!(result, Err(KeyVaultError::Corrupt)));
    }

    #[test]
    fn wire_hash_is_stable_and_never_echoes_the_password() {
        let a = hash_password_for_wire("hunter2");
        let b = hash_password_for_wire("hunter2");
        assert_eq!(a, b);
        assert_ne!(a, "hunter2");
        assert_ne!(a, BASE64.encode(derive_symmetric_key("hunter2").unwrap()));
    }

    #[test]
    fn encrypt_at_rest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let vault = KeyVault::unlock("correct horse battery staple", dir.path()).unwrap();

        let sealed = vault.encrypt_at_rest("hello, world").unwrap();
        let opened = vault.decrypt_at_rest(&sealed).unwrap();
        assert_eq!(opened, "hello, world");
    }
}
