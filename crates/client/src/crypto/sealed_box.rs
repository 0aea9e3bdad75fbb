//! `Box(my_private, peer_public)` — the authenticated public-key envelope
//! every outbound message is encrypted under (§4.3, §4.4, §6).
//!
//! The specification's primitive is XSalsa20-Poly1305; this crate composes
//! the same `(own_private, peer_public) → shared secret → AEAD` shape from
//! the key-exchange/AES-GCM primitives already in the dependency stack
//! (see `DESIGN.md` for the substitution rationale) instead of pulling in
//! a dedicated NaCl-box crate.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use x25519_dalek::PublicKey;

use super::aes_gcm::{Cipher, CryptoError, NONCE_SIZE};
use super::key_exchange::KeyPair;

/// Encrypt `plaintext` under the box `(my, peer)`, returning
/// `base64(nonce || ciphertext)` ready to go on the wire.
pub fn seal(my: &KeyPair, peer_public: &PublicKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    let shared = my.diffie_hellman(peer_public);
    let cipher = Cipher::new(&shared);
    let (nonce, ciphertext) = cipher.encrypt(plaintext)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(sealed))
}

/// Reverse of [`seal`]: recover the plaintext under the box `(my, peer)`.
pub fn open(my: &KeyPair, peer_public: &PublicKey, sealed: &str) -> Result<Vec<u8>, CryptoError> {
    let raw = BASE64
        .decode(sealed)
        .map_err(|_| CryptoError::CiphertextTooShort(NONCE_SIZE))?;
    if raw.len() < NONCE_SIZE {
        return Err(CryptoError::CiphertextTooShort(NONCE_SIZE));
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);

    let shared = my.diffie_hellman(peer_public);
    let cipher = Cipher::new(&shared);
    cipher.decrypt(nonce, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_between_two_parties() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let bob_public = PublicKey::from(bob.public_key_bytes());
        let alice_public = PublicKey::from(alice.public_key_bytes());

        let sealed = seal(&alice, &bob_public, b"hi bob").unwrap();
        let opened = open(&bob, &alice_public, &sealed).unwrap();

        assert_eq!(opened, b"hi bob");
    }

    #[test]
    fn wrong_peer_key_fails_to_open() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mallory = KeyPair::generate();
        let bob_public = PublicKey::from(bob.public_key_bytes());
        let mallory_public = PublicKey::from(mallory.public_key_bytes());

        let sealed = seal(&alice, &bob_public, b"hi bob").unwrap();
        let result = open(&bob, &mallory_public, &sealed);

        assert!(result.is_err());
    }

    #[test]
    fn tampered_payload_fails_to_open() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let bob_public = PublicKey::from(bob.public_key_bytes());
        let alice_public = PublicKey::from(alice.public_key_bytes());

        let mut sealed = seal(&alice, &bob_public, b"hi bob").unwrap();
        sealed.pop();
        sealed.push('A');

        assert!(open(&bob, &alice_public, &sealed).is_err());
    }
}
