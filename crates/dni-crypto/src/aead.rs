//! Transport-phase AEAD: ChaCha20-Poly1305 keyed by a Noise IK split key,
//! nonced by an externally-tracked 64-bit counter.
//!
//! The wire format carries no explicit nonce or counter field (see the
//! packet codec); the counter is reconstructed from the Session's
//! `send_counter`/`recv_counter`, so encryption and decryption both take the
//! counter as an explicit argument rather than keeping it internally the
//! way `snow::TransportState` would.

use crate::CryptoError;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

/// Largest counter value that may still be used. At `u64::MAX` the nonce
/// space for this key is exhausted and the session must be re-established.
const MAX_COUNTER: u64 = u64::MAX;

/// Bytes a ChaCha20-Poly1305 authentication tag adds to the plaintext length.
/// `encrypt` always appends exactly this much; there is no other expansion.
pub const AEAD_TAG_LEN: usize = 16;

/// A single-direction AEAD cipher, keyed from one half of a Noise IK split.
pub struct SessionCipher {
    cipher: ChaCha20Poly1305,
}

impl SessionCipher {
    /// Build a cipher from a 32-byte key produced by
    /// [`crate::noise::NoiseHandshake::finalize`].
    #[must_use]
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// `encrypt(cipher, counter, plaintext) -> ciphertext`. The nonce is
    /// `counter` encoded as a 96-bit little-endian integer (the low 8 bytes
    /// hold the counter, the high 4 bytes are zero).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::CounterExhausted`] if `counter` has reached
    /// the maximum usable value for this key.
    pub fn encrypt(&self, counter: u64, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if counter >= MAX_COUNTER {
            return Err(CryptoError::CounterExhausted);
        }
        let nonce = counter_nonce(counter);
        self.cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::AeadTagInvalid)
    }

    /// `decrypt(cipher, counter, ciphertext) -> plaintext`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadTagInvalid`] if the authentication tag
    /// does not verify, and [`CryptoError::CounterExhausted`] if `counter`
    /// has reached the maximum usable value.
    pub fn decrypt(&self, counter: u64, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if counter >= MAX_COUNTER {
            return Err(CryptoError::CounterExhausted);
        }
        let nonce = counter_nonce(counter);
        self.cipher
            .decrypt(&nonce, ciphertext)
            .map_err(|_| CryptoError::AeadTagInvalid)
    }
}

fn counter_nonce(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[..8].copy_from_slice(&counter.to_le_bytes());
    *Nonce::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_at_counter_zero() {
        let key = [7u8; 32];
        let cipher = SessionCipher::new(&key);
        let ct = cipher.encrypt(0, b"hello").unwrap();
        let pt = cipher.decrypt(0, &ct).unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn roundtrip_at_nonzero_counter() {
        let key = [1u8; 32];
        let cipher = SessionCipher::new(&key);
        let ct = cipher.encrypt(42, b"world").unwrap();
        assert_eq!(cipher.decrypt(42, &ct).unwrap(), b"world");
    }

    #[test]
    fn wrong_counter_fails_to_decrypt() {
        let key = [1u8; 32];
        let cipher = SessionCipher::new(&key);
        let ct = cipher.encrypt(0, b"data").unwrap();
        assert!(matches!(
            cipher.decrypt(1, &ct),
            Err(CryptoError::AeadTagInvalid)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = [1u8; 32];
        let cipher = SessionCipher::new(&key);
        let mut ct = cipher.encrypt(0, b"data").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        assert!(matches!(
            cipher.decrypt(0, &ct),
            Err(CryptoError::AeadTagInvalid)
        ));
    }

    #[test]
    fn counter_exhaustion_is_rejected() {
        let key = [1u8; 32];
        let cipher = SessionCipher::new(&key);
        assert!(matches!(
            cipher.encrypt(u64::MAX, b"data"),
            Err(CryptoError::CounterExhausted)
        ));
        assert!(matches!(
            cipher.decrypt(u64::MAX, b"data"),
            Err(CryptoError::CounterExhausted)
        ));
    }

    #[test]
    fn counter_one_below_exhaustion_still_works() {
        let key = [1u8; 32];
        let cipher = SessionCipher::new(&key);
        let ct = cipher.encrypt(u64::MAX - 1, b"data").unwrap();
        assert_eq!(cipher.decrypt(u64::MAX - 1, &ct).unwrap(), b"data");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_roundtrip(counter in 0u64..1_000_000, data in prop::collection::vec(any::<u8>(), 0..256)) {
                let key = [9u8; 32];
                let cipher = SessionCipher::new(&key);
                let ct = cipher.encrypt(counter, &data).unwrap();
                let pt = cipher.decrypt(counter, &ct).unwrap();
                prop_assert_eq!(pt, data);
            }
        }
    }
}
