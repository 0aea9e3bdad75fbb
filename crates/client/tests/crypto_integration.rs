//! Cross-module crypto scenarios (§8): two independent identities
//! exchanging a `Message` through the same `sealed_box`/`KeyVault`
//! primitives `ChatOrchestrator` composes, without a live signaling
//! server or WebRTC data channel.

use client::crypto::key_exchange::{parse_public_key, KeyPair};
use client::crypto::{sealed_box, KeyVault};
use client::domain::Message;

/// Scenario 1 (happy online relay), crypto layer only: Alice seals a
/// message under Bob's ephemeral public key; Bob opens it under his own
/// ephemeral private key and Alice's public key, and recovers the exact
/// `Message`.
#[tokio::test]
async fn ephemeral_box_round_trips_a_message_between_two_identities() {
    let alice_ephemeral = KeyPair::generate();
    let bob_ephemeral = KeyPair::generate();
    let bob_public = parse_public_key(&bob_ephemeral.public_key_base64()).unwrap();

    let message = Message::new("hi", "alice", "bob");
    let plaintext = serde_json::to_vec(&message).unwrap();

    let sealed = sealed_box::seal(&alice_ephemeral, &bob_public, &plaintext).unwrap();

    let alice_public = parse_public_key(&alice_ephemeral.public_key_base64()).unwrap();
    let opened = sealed_box::open(&bob_ephemeral, &alice_public, &sealed).unwrap();
    let recovered: Message = serde_json::from_slice(&opened).unwrap();

    assert_eq!(recovered, message);
}

/// Scenario 2 (offline spool), crypto layer only: Alice seals under
/// Bob's *long-term* public key while he's offline; Bob, unlocking his
/// KeyVault later (simulating a fresh process), decrypts with the
/// long-term private key restored from disk.
#[tokio::test]
async fn long_term_box_survives_a_simulated_restart() {
    let dir = tempfile::tempdir().unwrap();

    let bob_vault_before_restart = KeyVault::unlock("bob's password", dir.path()).unwrap();
    let bob_long_term_public = parse_public_key(&bob_vault_before_restart.long_term_key_pair().public_key_base64()).unwrap();

    let alice_long_term = KeyPair::generate();
    let message = Message::new("see you", "alice", "bob");
    let plaintext = serde_json::to_vec(&message).unwrap();
    let sealed = sealed_box::seal(&alice_long_term, &bob_long_term_public, &plaintext).unwrap();

    // Simulate Bob's process restarting and unlocking the same on-disk identity.
    let bob_vault_after_restart = KeyVault::unlock("bob's password", dir.path()).unwrap();
    let alice_public = parse_public_key(&alice_long_term.public_key_base64()).unwrap();
    let opened = sealed_box::open(bob_vault_after_restart.long_term_key_pair(), &alice_public, &sealed).unwrap();
    let recovered: Message = serde_json::from_slice(&opened).unwrap();

    assert_eq!(recovered, message);
}

/// Opening a sealed message under the wrong recipient identity must fail
/// rather than silently returning garbage (§7 `DecryptionFailure`).
#[tokio::test]
async fn sealing_under_the_wrong_recipient_fails_to_open() {
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    let mallory = KeyPair::generate();

    let bob_public = parse_public_key(&bob.public_key_base64()).unwrap();
    let sealed = sealed_box::seal(&alice, &bob_public, b"top secret").unwrap();

    let alice_public = parse_public_key(&alice.public_key_base64()).unwrap();
    assert!(sealed_box::open(&mallory, &alice_public, &sealed).is_err());
}
