//! Point-to-point payload encryption under pairwise channel keys
//!
//! Payloads are sealed with ChaCha20-Poly1305. The output is
//! `nonce (12 bytes) || ciphertext+tag`, and the associated data binds the
//! ordered (sender, recipient) pair so a payload cannot be replayed in the
//! other direction or to a third replica.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use shroud_core::ReplicaId;

use crate::error::{Result, VssError};
use crate::keys::ChannelKey;

const NONCE_LEN: usize = 12;
const AAD_LABEL: &[u8] = b"shroud/channel/v1";

/// Cipher state shared by every encrypt and decrypt on a replica
///
/// All transforms take the same lock, one at a time.
pub struct SecureChannel {
    local: ReplicaId,
    nonces: Mutex<ChaCha20Rng>,
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("local", &self.local)
            .finish()
    }
}

fn associated_data(from: ReplicaId, to: ReplicaId) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_LABEL.len() + 8);
    aad.extend_from_slice(AAD_LABEL);
    aad.extend_from_slice(&from.to_be_bytes());
    aad.extend_from_slice(&to.to_be_bytes());
    aad
}

impl SecureChannel {
    pub fn new(local: ReplicaId) -> Self {
        Self {
            local,
            nonces: Mutex::new(ChaCha20Rng::from_entropy()),
        }
    }

    /// Encrypt `plaintext` for `peer`
    pub fn seal(&self, key: &ChannelKey, peer: ReplicaId, plaintext: &[u8]) -> Result<Vec<u8>> {
        let aad = associated_data(self.local, peer);
        let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|_| VssError::Encryption { peer })?;

        let mut nonces = self.nonces.lock();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonces.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(
                &Nonce::from(nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| VssError::Encryption { peer })?;
        drop(nonces);

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a payload `peer` sealed for this replica
    pub fn open(&self, key: &ChannelKey, peer: ReplicaId, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(VssError::Decryption { peer });
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let aad = associated_data(peer, self.local);
        let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|_| VssError::Decryption { peer })?;

        let _guard = self.nonces.lock();
        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| VssError::Decryption { peer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> ChannelKey {
        ChannelKey::new([byte; 32])
    }

    #[test]
    fn test_seal_open_between_peers() {
        let alice = SecureChannel::new(0);
        let bob = SecureChannel::new(1);
        let sealed = alice.seal(&key(9), 1, b"share bytes").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 11 + 16);
        assert_eq!(bob.open(&key(9), 0, &sealed).unwrap(), b"share bytes");
    }

    #[test]
    fn test_wrong_direction_or_key_fails() {
        let alice = SecureChannel::new(0);
        let bob = SecureChannel::new(1);
        let carol = SecureChannel::new(2);
        let sealed = alice.seal(&key(9), 1, b"payload").unwrap();

        assert!(bob.open(&key(8), 0, &sealed).is_err());
        assert!(carol.open(&key(9), 0, &sealed).is_err());
        assert!(alice.open(&key(9), 1, &sealed).is_err());
        assert!(bob.open(&key(9), 0, &sealed[..5]).is_err());
    }

    #[test]
    fn test_nonces_differ() {
        let alice = SecureChannel::new(0);
        let a = alice.seal(&key(1), 1, b"x").unwrap();
        let b = alice.seal(&key(1), 1, b"x").unwrap();
        assert_ne!(a, b);
    }
}
