//! # dni-crypto
//!
//! Cryptographic primitives for the dni-im secure messenger core.
//!
//! This crate provides:
//! - The `Noise_IK_25519_ChaChaPoly_BLAKE2s` handshake for session
//!   establishment, with the initiator authenticating the responder's
//!   long-term key on the first flight.
//! - A counter-nonced ChaCha20-Poly1305 AEAD for the transport phase,
//!   keyed from the handshake split.
//! - BLAKE3-based key derivation and secure random generation.
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Key Exchange | X25519 | static + ephemeral |
//! | Handshake Hash | BLAKE2s | via `snow`, mixed into `Noise_IK` |
//! | Transport AEAD | ChaCha20-Poly1305 | 96-bit nonce = counter (LE) |
//! | Key Derivation | HKDF-BLAKE3 | split + persisted-key contexts |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod error;
pub mod hash;
pub mod noise;
pub mod random;

pub use error::CryptoError;

/// X25519 public/private key size in bytes.
pub const X25519_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 key size in bytes.
pub const AEAD_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size in bytes (96 bits).
pub const AEAD_NONCE_SIZE: usize = 12;

/// ChaCha20-Poly1305 authentication tag size in bytes (128 bits).
pub const AEAD_TAG_SIZE: usize = 16;
