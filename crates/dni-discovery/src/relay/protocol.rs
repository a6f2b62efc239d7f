//! Wire protocol between a client and the untrusted relay (§4.4).
//!
//! Distinct from the peer-to-peer packet format in `dni_core::packet`: the
//! relay only ever sees fingerprints, static public keys, and opaque
//! payloads it forwards without inspecting.

use std::convert::TryFrom;

use crate::error::DiscoveryError;

/// Length in bytes of a wire fingerprint (16 ASCII characters).
pub const FINGERPRINT_SIZE: usize = 16;
/// Length in bytes of a wire static public key.
pub const STATIC_PUB_SIZE: usize = 32;

/// Relay message opcodes (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelayOpcode {
    /// Client registers its fingerprint, static key, and display name.
    Register = 0x01,
    /// Relay acknowledges a registration.
    RegisterAck = 0x81,
    /// Client asks the relay to forward an opaque payload to a fingerprint.
    Relay = 0x02,
    /// Client asks for the relay's current registration list.
    List = 0x03,
    /// Relay's response to `List`.
    ListResp = 0x83,
    /// Client asks to be removed from the registration table before its
    /// eviction timeout would otherwise expire it (graceful shutdown).
    Deregister = 0x04,
}

impl TryFrom<u8> for RelayOpcode {
    type Error = DiscoveryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(RelayOpcode::Register),
            0x81 => Ok(RelayOpcode::RegisterAck),
            0x02 => Ok(RelayOpcode::Relay),
            0x03 => Ok(RelayOpcode::List),
            0x83 => Ok(RelayOpcode::ListResp),
            0x04 => Ok(RelayOpcode::Deregister),
            _ => Err(DiscoveryError::MalformedRelayMessage),
        }
    }
}

/// One entry in a `LIST_RESP`: a peer currently registered with the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPeerInfo {
    /// The peer's fingerprint.
    pub fingerprint: String,
    /// The peer's claimed static public key.
    pub static_pub: [u8; 32],
    /// The peer's display name.
    pub name: String,
}

/// A parsed relay protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `REGISTER (0x01) | fingerprint(16) | static_pub(32) | name_len(1) | name`
    Register {
        /// The registering client's fingerprint.
        fingerprint: String,
        /// The registering client's static public key.
        static_pub: [u8; 32],
        /// The registering client's display name.
        display_name: String,
    },
    /// `REGISTER_ACK (0x81) | fingerprint(16)`
    RegisterAck {
        /// Echoes the fingerprint that was registered.
        fingerprint: String,
    },
    /// `RELAY (0x02) | dest_fingerprint(16) | opaque_payload`
    Relay {
        /// Who to forward to.
        dest_fingerprint: String,
        /// A full peer-to-peer packet, untouched by the relay.
        payload: Vec<u8>,
    },
    /// `LIST (0x03)` with no body.
    List,
    /// `LIST_RESP (0x83) | count(2) | [fingerprint(16) | static_pub(32) | name_len(1) | name]*`
    ListResp {
        /// All peers currently registered with the relay.
        entries: Vec<RelayPeerInfo>,
    },
    /// `DEREGISTER (0x04) | fingerprint(16)`
    Deregister {
        /// The fingerprint asking to be removed.
        fingerprint: String,
    },
}

fn write_fingerprint(buf: &mut Vec<u8>, fingerprint: &str) -> Result<(), DiscoveryError> {
    let bytes = fingerprint.as_bytes();
    if bytes.len() != FINGERPRINT_SIZE {
        return Err(DiscoveryError::MalformedRelayMessage);
    }
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_fingerprint(data: &[u8]) -> Result<String, DiscoveryError> {
    if data.len() < FINGERPRINT_SIZE {
        return Err(DiscoveryError::MalformedRelayMessage);
    }
    String::from_utf8(data[..FINGERPRINT_SIZE].to_vec())
        .map_err(|_| DiscoveryError::MalformedRelayMessage)
}

impl RelayMessage {
    /// Serialize this message to its wire form.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::MalformedRelayMessage` if a fingerprint is
    /// not exactly 16 bytes, or a name is too long to fit its 1-byte length
    /// prefix.
    pub fn encode(&self) -> Result<Vec<u8>, DiscoveryError> {
        let mut buf = Vec::new();
        match self {
            RelayMessage::Register {
                fingerprint,
                static_pub,
                display_name,
            } => {
                buf.push(RelayOpcode::Register as u8);
                write_fingerprint(&mut buf, fingerprint)?;
                buf.extend_from_slice(static_pub);
                let name_bytes = display_name.as_bytes();
                if name_bytes.len() > u8::MAX as usize {
                    return Err(DiscoveryError::MalformedRelayMessage);
                }
                buf.push(name_bytes.len() as u8);
                buf.extend_from_slice(name_bytes);
            }
            RelayMessage::RegisterAck { fingerprint } => {
                buf.push(RelayOpcode::RegisterAck as u8);
                write_fingerprint(&mut buf, fingerprint)?;
            }
            RelayMessage::Relay {
                dest_fingerprint,
                payload,
            } => {
                buf.push(RelayOpcode::Relay as u8);
                write_fingerprint(&mut buf, dest_fingerprint)?;
                buf.extend_from_slice(payload);
            }
            RelayMessage::List => {
                buf.push(RelayOpcode::List as u8);
            }
            RelayMessage::Deregister { fingerprint } => {
                buf.push(RelayOpcode::Deregister as u8);
                write_fingerprint(&mut buf, fingerprint)?;
            }
            RelayMessage::ListResp { entries } => {
                buf.push(RelayOpcode::ListResp as u8);
                if entries.len() > u16::MAX as usize {
                    return Err(DiscoveryError::MalformedRelayMessage);
                }
                buf.extend_from_slice(&(entries.len() as u16).to_be_bytes());
                for entry in entries {
                    write_fingerprint(&mut buf, &entry.fingerprint)?;
                    buf.extend_from_slice(&entry.static_pub);
                    let name_bytes = entry.name.as_bytes();
                    if name_bytes.len() > u8::MAX as usize {
                        return Err(DiscoveryError::MalformedRelayMessage);
                    }
                    buf.push(name_bytes.len() as u8);
                    buf.extend_from_slice(name_bytes);
                }
            }
        }
        Ok(buf)
    }

    /// Parse a message from its wire form.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::MalformedRelayMessage` if the opcode is
    /// unrecognized or any fixed-width field is truncated.
    pub fn decode(data: &[u8]) -> Result<Self, DiscoveryError> {
        if data.is_empty() {
            return Err(DiscoveryError::MalformedRelayMessage);
        }
        let opcode = RelayOpcode::try_from(data[0])?;
        let body = &data[1..];
        match opcode {
            RelayOpcode::Register => {
                if body.len() < FINGERPRINT_SIZE + STATIC_PUB_SIZE + 1 {
                    return Err(DiscoveryError::MalformedRelayMessage);
                }
                let fingerprint = read_fingerprint(body)?;
                let mut static_pub = [0u8; STATIC_PUB_SIZE];
                static_pub.copy_from_slice(
                    &body[FINGERPRINT_SIZE..FINGERPRINT_SIZE + STATIC_PUB_SIZE],
                );
                let name_len_off = FINGERPRINT_SIZE + STATIC_PUB_SIZE;
                let name_len = body[name_len_off] as usize;
                let name_start = name_len_off + 1;
                if body.len() < name_start + name_len {
                    return Err(DiscoveryError::MalformedRelayMessage);
                }
                let display_name = String::from_utf8(body[name_start..name_start + name_len].to_vec())
                    .map_err(|_| DiscoveryError::MalformedRelayMessage)?;
                Ok(RelayMessage::Register {
                    fingerprint,
                    static_pub,
                    display_name,
                })
            }
            RelayOpcode::RegisterAck => {
                let fingerprint = read_fingerprint(body)?;
                Ok(RelayMessage::RegisterAck { fingerprint })
            }
            RelayOpcode::Relay => {
                if body.len() < FINGERPRINT_SIZE {
                    return Err(DiscoveryError::MalformedRelayMessage);
                }
                let dest_fingerprint = read_fingerprint(body)?;
                let payload = body[FINGERPRINT_SIZE..].to_vec();
                Ok(RelayMessage::Relay {
                    dest_fingerprint,
                    payload,
                })
            }
            RelayOpcode::List => Ok(RelayMessage::List),
            RelayOpcode::Deregister => {
                let fingerprint = read_fingerprint(body)?;
                Ok(RelayMessage::Deregister { fingerprint })
            }
            RelayOpcode::ListResp => {
                if body.len() < 2 {
                    return Err(DiscoveryError::MalformedRelayMessage);
                }
                let count = u16::from_be_bytes([body[0], body[1]]) as usize;
                let mut offset = 2;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    if body.len() < offset + FINGERPRINT_SIZE + STATIC_PUB_SIZE + 1 {
                        return Err(DiscoveryError::MalformedRelayMessage);
                    }
                    let fingerprint = read_fingerprint(&body[offset..])?;
                    offset += FINGERPRINT_SIZE;
                    let mut static_pub = [0u8; STATIC_PUB_SIZE];
                    static_pub.copy_from_slice(&body[offset..offset + STATIC_PUB_SIZE]);
                    offset += STATIC_PUB_SIZE;
                    let name_len = body[offset] as usize;
                    offset += 1;
                    if body.len() < offset + name_len {
                        return Err(DiscoveryError::MalformedRelayMessage);
                    }
                    let name = String::from_utf8(body[offset..offset + name_len].to_vec())
                        .map_err(|_| DiscoveryError::MalformedRelayMessage)?;
                    offset += name_len;
                    entries.push(RelayPeerInfo {
                        fingerprint,
                        static_pub,
                        name,
                    });
                }
                Ok(RelayMessage::ListResp { entries })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_roundtrips() {
        let msg = RelayMessage::Register {
            fingerprint: "abcdef0123456789".to_string(),
            static_pub: [7u8; 32],
            display_name: "Alice".to_string(),
        };
        let wire = msg.encode().unwrap();
        assert_eq!(wire[0], RelayOpcode::Register as u8);
        assert_eq!(RelayMessage::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn register_ack_roundtrips() {
        let msg = RelayMessage::RegisterAck {
            fingerprint: "abcdef0123456789".to_string(),
        };
        let wire = msg.encode().unwrap();
        assert_eq!(wire.len(), 1 + FINGERPRINT_SIZE);
        assert_eq!(RelayMessage::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn relay_carries_opaque_payload_untouched() {
        let msg = RelayMessage::Relay {
            dest_fingerprint: "abcdef0123456789".to_string(),
            payload: vec![1, 2, 3, 4, 5],
        };
        let wire = msg.encode().unwrap();
        match RelayMessage::decode(&wire).unwrap() {
            RelayMessage::Relay { payload, .. } => assert_eq!(payload, vec![1, 2, 3, 4, 5]),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn deregister_roundtrips() {
        let msg = RelayMessage::Deregister {
            fingerprint: "abcdef0123456789".to_string(),
        };
        let wire = msg.encode().unwrap();
        assert_eq!(wire.len(), 1 + FINGERPRINT_SIZE);
        assert_eq!(RelayMessage::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn list_has_no_body() {
        let wire = RelayMessage::List.encode().unwrap();
        assert_eq!(wire, vec![RelayOpcode::List as u8]);
        assert_eq!(RelayMessage::decode(&wire).unwrap(), RelayMessage::List);
    }

    #[test]
    fn list_resp_roundtrips_multiple_entries() {
        let msg = RelayMessage::ListResp {
            entries: vec![
                RelayPeerInfo {
                    fingerprint: "aaaaaaaaaaaaaaaa".to_string(),
                    static_pub: [1u8; 32],
                    name: "Alice".to_string(),
                },
                RelayPeerInfo {
                    fingerprint: "bbbbbbbbbbbbbbbb".to_string(),
                    static_pub: [2u8; 32],
                    name: "Bob".to_string(),
                },
            ],
        };
        let wire = msg.encode().unwrap();
        assert_eq!(RelayMessage::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn list_resp_empty_roundtrips() {
        let msg = RelayMessage::ListResp { entries: vec![] };
        let wire = msg.encode().unwrap();
        assert_eq!(wire, vec![RelayOpcode::ListResp as u8, 0, 0]);
        assert_eq!(RelayMessage::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_unknown_opcode() {
        assert!(RelayMessage::decode(&[0xFF]).is_err());
    }

    #[test]
    fn decode_rejects_truncated_register() {
        assert!(RelayMessage::decode(&[RelayOpcode::Register as u8, 1, 2, 3]).is_err());
    }

    #[test]
    fn decode_rejects_empty_buffer() {
        assert!(RelayMessage::decode(&[]).is_err());
    }

    #[test]
    fn encode_rejects_wrong_length_fingerprint() {
        let msg = RelayMessage::RegisterAck {
            fingerprint: "short".to_string(),
        };
        assert!(msg.encode().is_err());
    }
}
