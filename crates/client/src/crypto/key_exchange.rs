//! Curve25519 key exchange.
//!
//! Keys here are "ephemeral" in the protocol sense (per-chat, RAM-only,
//! never persisted) rather than in `x25519-dalek`'s one-shot-DH sense: a
//! `ChatOrchestrator` performs repeated Diffie-Hellman against the same
//! peer key over the lifetime of a chat, so key material is held as a
//! `StaticSecret` rather than an `EphemeralSecret`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};

#[derive(Debug, thiserror::Error)]
pub enum KeyExchangeError {
    #[error("Invalid public key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),
}

/// A Curve25519 key pair, used for both the long-term identity key and
/// per-chat ephemeral keys.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct a key pair from a raw 32-byte private scalar, as read
    /// back from the wrapped on-disk long-term key.
    pub fn from_private_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Derive the shared secret with a peer's public key. Callable
    /// repeatedly against the same `KeyPair` (successive messages in one
    /// chat all encrypt/decrypt under derivations of this same pair).
    pub fn diffie_hellman(&self, peer_public: &PublicKey) -> [u8; 32] {
        let shared: SharedSecret = self.secret.diffie_hellman(peer_public);
        *shared.as_bytes()
    }
}

pub fn parse_public_key(base64_key: &str) -> Result<PublicKey, KeyExchangeError> {
    let bytes = BASE64.decode(base64_key)?;
    if bytes.len() != 32 {
        return Err(KeyExchangeError::InvalidKeyLength(bytes.len()));
    }
    let mut array = [0u8; 32];
    array.copy_from_slice(&bytes);
    Ok(PublicKey::from(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_generation_produces_a_44_char_base64_key() {
        let kp = KeyPair::generate();
        assert_eq!(kp.public_key_base64().len(), 44);
    }

    #[test]
    fn parse_public_key_round_trips() {
        let kp = KeyPair::generate();
        let parsed = parse_public_key(&kp.public_key_base64()).unwrap();
        assert_eq!(parsed.as_bytes(), kp.public_key_bytes().as_slice());
    }

    #[test]
    fn key_exchange_is_symmetric() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let alice_shared = alice.diffie_hellman(&PublicKey::from(bob.public_key_bytes()));
        let bob_shared = bob.diffie_hellman(&PublicKey::from(alice.public_key_bytes()));

        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn diffie_hellman_is_reusable_across_multiple_messages() {
        let alice = KeyPair::generate();
        let bob_public = PublicKey::from(KeyPair::generate().public_key_bytes());

        let first = alice.diffie_hellman(&bob_public);
        let second = alice.diffie_hellman(&bob_public);
        assert_eq!(first, second);
    }

    #[test]
    fn from_private_bytes_reconstructs_the_same_public_key() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_private_bytes(kp.private_key_bytes());
        assert_eq!(restored.public_key_bytes(), kp.public_key_bytes());
    }

    #[test]
    fn invalid_key_length_is_rejected() {
        let result = parse_public_key("aGVsbG8=");
        assert!(matches!(result, Err(KeyExchangeError::InvalidKeyLength(5))));
    }
}
