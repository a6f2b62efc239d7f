//! BLAKE3 hashing and HKDF-style key derivation.
//!
//! Used to derive the two directional transport keys out of a completed
//! Noise handshake's hash chain, and to fingerprint the persisted identity
//! certificate.

/// BLAKE3 hash output (32 bytes).
pub type HashOutput = [u8; 32];

/// Compute the BLAKE3 hash of input data.
#[must_use]
pub fn hash(data: &[u8]) -> HashOutput {
    *blake3::hash(data).as_bytes()
}

/// HKDF-Extract: extract a pseudorandom key from input key material.
///
/// Corresponds to HKDF-Extract from RFC 5869, using BLAKE3 as the hash.
#[must_use]
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    if salt.is_empty() {
        hash(ikm)
    } else {
        let salt_hash = hash(salt);
        let mut hasher = blake3::Hasher::new_keyed(&salt_hash);
        hasher.update(ikm);
        *hasher.finalize().as_bytes()
    }
}

/// HKDF-Expand: expand a pseudorandom key into arbitrary-length output.
pub fn hkdf_expand(prk: &[u8; 32], info: &[u8], output: &mut [u8]) {
    let mut hasher = blake3::Hasher::new_keyed(prk);
    hasher.update(info);
    let mut reader = hasher.finalize_xof();
    reader.fill(output);
}

/// Combined extract-then-expand HKDF.
pub fn hkdf(salt: &[u8], ikm: &[u8], info: &[u8], output: &mut [u8]) {
    let prk = hkdf_extract(salt, ikm);
    hkdf_expand(&prk, info, output);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash(b"hello world"), hash(b"hello world"));
    }

    #[test]
    fn hash_differs_across_inputs() {
        assert_ne!(hash(b"input1"), hash(b"input2"));
    }

    #[test]
    fn hkdf_is_deterministic() {
        let mut out1 = [0u8; 64];
        let mut out2 = [0u8; 64];
        hkdf(b"salt", b"ikm", b"info", &mut out1);
        hkdf(b"salt", b"ikm", b"info", &mut out2);
        assert_eq!(out1, out2);
    }

    #[test]
    fn hkdf_differs_across_contexts() {
        let mut out1 = [0u8; 32];
        let mut out2 = [0u8; 32];
        hkdf(b"salt", b"ikm", b"ctx1", &mut out1);
        hkdf(b"salt", b"ikm", b"ctx2", &mut out2);
        assert_ne!(out1, out2);
    }

    #[test]
    fn blake3_empty_string_matches_known_vector() {
        let expected = [
            0xaf, 0x13, 0x49, 0xb9, 0xf5, 0xf9, 0xa1, 0xa6, 0xa0, 0x40, 0x4d, 0xea, 0x36, 0xdc,
            0xc9, 0x49, 0x9b, 0xcb, 0x25, 0xc9, 0xad, 0xc1, 0x12, 0xb7, 0xcc, 0x9a, 0x93, 0xca,
            0xe4, 0x1f, 0x32, 0x62,
        ];
        assert_eq!(hash(b""), expected);
    }
}
