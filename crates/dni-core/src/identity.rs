//! Local identity: the fingerprint, display name, and long-term static
//! keypair that authenticate this installation to its peers (§3, §6).
//!
//! The identity provider itself (smart card, OS keychain, whatever) is out
//! of scope; this module only models the result of its `authenticate()`
//! call and persists it.

use std::path::Path;

use dni_crypto::noise::StaticKeypair;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// A 16-hex-character peer identifier, deterministically derived from the
/// identity certificate by the (out-of-scope) identity provider.
pub type Fingerprint = String;

/// This installation's identity: who we are to our peers.
pub struct Identity {
    /// The stable peer identifier, supplied by the identity provider.
    pub fingerprint: Fingerprint,
    /// Human-readable name, supplied by the identity provider.
    pub display_name: String,
    /// The Noise-IK `s` key. Created once at first run; never rotated.
    pub static_keypair: StaticKeypair,
}

/// On-disk representation of [`Identity`]. The private key is stored as
/// raw bytes; protecting this file at rest (encryption, OS keychain) is
/// explicitly out of scope (§1).
#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    fingerprint: String,
    display_name: String,
    static_private_key_b64: String,
}

impl Identity {
    /// Construct from the identity provider's `authenticate()` result.
    #[must_use]
    pub fn from_provider(
        fingerprint: Fingerprint,
        display_name: String,
        static_private_key: [u8; 32],
    ) -> Self {
        Self {
            fingerprint,
            display_name,
            static_keypair: StaticKeypair::from_private_bytes(static_private_key),
        }
    }

    /// Load a previously persisted identity from `path`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Corrupt` if the file cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, QueueError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| QueueError::Corrupt(format!("reading identity file: {e}")))?;
        let record: IdentityRecord = serde_json::from_str(&data)
            .map_err(|e| QueueError::Corrupt(format!("parsing identity file: {e}")))?;
        let raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &record.static_private_key_b64)
            .map_err(|e| QueueError::Corrupt(format!("decoding static key: {e}")))?;
        let key: [u8; 32] = raw
            .try_into()
            .map_err(|_| QueueError::Corrupt("static key is not 32 bytes".into()))?;
        Ok(Self {
            fingerprint: record.fingerprint,
            display_name: record.display_name,
            static_keypair: StaticKeypair::from_private_bytes(key),
        })
    }

    /// Persist this identity to `path` via write-temp-then-rename.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::PersistFailure` if the write, fsync, or rename
    /// fails.
    pub fn save(&self, path: &Path) -> Result<(), QueueError> {
        let record = IdentityRecord {
            fingerprint: self.fingerprint.clone(),
            display_name: self.display_name.clone(),
            static_private_key_b64: base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                self.static_keypair.private_key(),
            ),
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| QueueError::PersistFailure(format!("serializing identity: {e}")))?;
        crate::persist::atomic_write(path, json.as_bytes())
            .map_err(|e| QueueError::PersistFailure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let identity = Identity::from_provider("abcdef0123456789".into(), "Alice".into(), [7u8; 32]);
        identity.save(&path).unwrap();

        let loaded = Identity::load(&path).unwrap();
        assert_eq!(loaded.fingerprint, "abcdef0123456789");
        assert_eq!(loaded.display_name, "Alice");
        assert_eq!(loaded.static_keypair.public_key(), identity.static_keypair.public_key());
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(Identity::load(&path).is_err());
    }
}
