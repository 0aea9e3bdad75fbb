//! Key exchange, symmetric encryption, and the password-derived KeyVault
//! (§4.4). `sealed_box` composes the two primitives into the `Box`
//! abstraction the rest of the client calls by name.

pub mod aes_gcm;
pub mod key_exchange;
pub mod keyvault;
pub mod sealed_box;

pub use key_exchange::KeyPair;
pub use keyvault::{hash_password_for_wire, KeyVault, KeyVaultError};
