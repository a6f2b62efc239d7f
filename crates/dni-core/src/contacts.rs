//! Contact Book (§4.7): fingerprint-keyed TOFU pin store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::identity::Fingerprint;

/// A pinned peer: the identity we trust under a given fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// The peer's fingerprint.
    pub fingerprint: Fingerprint,
    /// Display name, mutable via `rename`.
    pub display_name: String,
    /// The static public key pinned on first successful handshake.
    /// Immutable thereafter.
    pub pinned_static_public_key: [u8; 32],
    /// Unix timestamp (seconds) of the first successful TOFU handshake.
    pub first_seen_ts: u64,
}

/// Result of a `pin()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinResult {
    /// First observation of this fingerprint; a new contact was created.
    Created,
    /// The presented key matched the existing pin; nothing changed.
    Unchanged,
    /// The presented key differs from the existing pin. Fatal to the
    /// caller's session (§4.5, §7).
    Violation,
}

/// Fingerprint-keyed contact store, persisted as JSON.
pub struct ContactBook {
    contacts: HashMap<Fingerprint, Contact>,
    path: PathBuf,
}

impl ContactBook {
    /// Load the contact book from `path`, or start empty if it does not
    /// exist yet.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Corrupt` if the file exists but cannot be
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, QueueError> {
        let contacts = match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| QueueError::Corrupt(format!("parsing contact book: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(QueueError::Corrupt(format!("reading contact book: {e}"))),
        };
        Ok(Self {
            contacts,
            path: path.to_path_buf(),
        })
    }

    fn persist(&self) -> Result<(), QueueError> {
        let json = serde_json::to_string_pretty(&self.contacts)
            .map_err(|e| QueueError::PersistFailure(format!("serializing contact book: {e}")))?;
        crate::persist::atomic_write(&self.path, json.as_bytes())
            .map_err(|e| QueueError::PersistFailure(e.to_string()))
    }

    /// Pin `static_pub` under `fingerprint`, creating the contact on first
    /// observation. The pinned key never changes once set.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::PersistFailure` if persisting a newly created
    /// contact fails. A `Violation` result is not itself an `Err`; the
    /// caller decides how to react (§4.5 treats it as session-fatal).
    pub fn pin(
        &mut self,
        fingerprint: &Fingerprint,
        static_pub: [u8; 32],
        name: &str,
    ) -> Result<PinResult, QueueError> {
        if let Some(existing) = self.contacts.get(fingerprint) {
            return Ok(if existing.pinned_static_public_key == static_pub {
                PinResult::Unchanged
            } else {
                tracing::warn!(fingerprint, "pinning violation: static key mismatch");
                PinResult::Violation
            });
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.contacts.insert(
            fingerprint.clone(),
            Contact {
                fingerprint: fingerprint.clone(),
                display_name: name.to_string(),
                pinned_static_public_key: static_pub,
                first_seen_ts: now,
            },
        );
        self.persist()?;
        tracing::debug!(fingerprint, "contact created via TOFU");
        Ok(PinResult::Created)
    }

    /// Look up a contact by fingerprint.
    #[must_use]
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<&Contact> {
        self.contacts.get(fingerprint)
    }

    /// Update a contact's display name.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::PersistFailure` if the fingerprint is unknown
    /// or persistence fails.
    pub fn rename(&mut self, fingerprint: &Fingerprint, new_name: &str) -> Result<(), QueueError> {
        let contact = self
            .contacts
            .get_mut(fingerprint)
            .ok_or_else(|| QueueError::Corrupt(format!("unknown contact {fingerprint}")))?;
        contact.display_name = new_name.to_string();
        self.persist()
    }

    /// Number of contacts known.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the contact book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
