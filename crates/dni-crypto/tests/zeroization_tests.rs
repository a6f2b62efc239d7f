//! Zeroization validation tests.
//!
//! These are compile-time and drop-safety checks: the `zeroize` crate is
//! the actual guarantee, this suite verifies the relevant types opt in.

use dni_crypto::noise::{NoiseHandshake, SplitKeys, StaticKeypair};

#[test]
fn static_keypair_zeroizes_on_drop() {
    let keypair = StaticKeypair::generate().unwrap();
    drop(keypair);
}

#[test]
fn split_keys_zeroize_on_drop() {
    fn assert_zeroize_on_drop<T: zeroize::ZeroizeOnDrop>() {}
    assert_zeroize_on_drop::<SplitKeys>();

    let a = StaticKeypair::generate().unwrap();
    let b = StaticKeypair::generate().unwrap();
    let mut initiator = NoiseHandshake::new_initiator(&a, b.public_key()).unwrap();
    let mut responder = NoiseHandshake::new_responder(&b).unwrap();

    let msg1 = initiator.write_handshake_message(&[]).unwrap();
    responder.read_handshake_message(&msg1).unwrap();
    let msg2 = responder.write_handshake_message(&[]).unwrap();
    initiator.read_handshake_message(&msg2).unwrap();

    let (keys, _peer) = initiator.finalize().unwrap();
    drop(keys);
}

#[test]
fn static_keypair_does_not_implement_clone_to_all_callers_without_intent() {
    // StaticKeypair DOES implement Clone (the Session Manager needs to hand
    // a clone of the local identity to multiple concurrent handshakes), but
    // it does not implement Copy, and cloning does not avoid the Drop zeroize.
    let keypair = StaticKeypair::generate().unwrap();
    let cloned = keypair.clone();
    assert_eq!(keypair.public_key(), cloned.public_key());
}
