//! Peer wire protocol
//!
//! JSON frames exchanged between witnesses over a single socket per
//! peer. Field shapes are validated before any cryptography runs:
//! tokens are 32 chars, digests 64 hex chars, signatures 130 hex chars,
//! accounts 3 to 16 chars.

use serde::{Deserialize, Serialize};

use meridian_core::constants::{
    ACCOUNT_MAX_LEN, ACCOUNT_MIN_LEN, AUTH_TOKEN_LEN, DIGEST_HEX_LEN, SIGNATURE_HEX_LEN,
};

/// Transport-assigned socket identifier.
pub type SocketId = u64;

/// Events a transport delivers to the coordinator.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Connected { socket: SocketId, address: String },
    Message { socket: SocketId, message: PeerMessage },
    Disconnected { socket: SocketId },
}

/// A frame on the witness peer protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PeerMessage {
    /// Challenge: a fresh token, self-signed, plus the sender account.
    Handshake(HandshakePayload),
    /// Countersignature over a previously received challenge token.
    HandshakeAck(HandshakeAckPayload),
    /// Round proposal from the scheduled proposer.
    ProposeRound(ProposeRoundPayload),
    /// Verifier reply: an error string or a countersigned proposal.
    ProposeRoundAck(ProposeRoundAckPayload),
}

impl PeerMessage {
    /// Frame name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Handshake(_) => "handshake",
            PeerMessage::HandshakeAck(_) => "handshake_ack",
            PeerMessage::ProposeRound(_) => "propose_round",
            PeerMessage::ProposeRoundAck(_) => "propose_round_ack",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    /// 32 random chars generated by the sender.
    pub auth_token: String,
    /// Signature over `{"authToken": auth_token}` by the sender.
    pub signature: String,
    pub account: String,
}

impl HandshakePayload {
    pub fn is_well_formed(&self) -> bool {
        self.auth_token.len() == AUTH_TOKEN_LEN
            && self.signature.len() == SIGNATURE_HEX_LEN
            && (ACCOUNT_MIN_LEN..=ACCOUNT_MAX_LEN).contains(&self.account.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeAckPayload {
    /// The challenge token being answered.
    pub auth_token: String,
    /// Signature over `{"authToken": auth_token}` by the responder.
    pub signature: String,
    pub account: String,
}

impl HandshakeAckPayload {
    pub fn is_well_formed(&self) -> bool {
        self.auth_token.len() == AUTH_TOKEN_LEN
            && self.signature.len() == SIGNATURE_HEX_LEN
            && (ACCOUNT_MIN_LEN..=ACCOUNT_MAX_LEN).contains(&self.account.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeRoundPayload {
    pub round: u64,
    pub round_hash: String,
    /// Signature over the raw round-hash digest.
    pub signature: String,
}

impl ProposeRoundPayload {
    pub fn is_well_formed(&self) -> bool {
        self.round_hash.len() == DIGEST_HEX_LEN && self.signature.len() == SIGNATURE_HEX_LEN
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeRoundAckPayload {
    pub err: Option<String>,
    pub data: Option<ProposeRoundPayload>,
}

impl ProposeRoundAckPayload {
    pub fn ok(data: ProposeRoundPayload) -> Self {
        Self {
            err: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: Some(message.into()),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_roundtrip_as_json() {
        let frame = PeerMessage::ProposeRound(ProposeRoundPayload {
            round: 9,
            round_hash: "ab".repeat(32),
            signature: "cd".repeat(65),
        });

        let json = serde_json::to_string(&frame).unwrap();
        let restored: PeerMessage = serde_json::from_str(&json).unwrap();
        match restored {
            PeerMessage::ProposeRound(p) => {
                assert_eq!(p.round, 9);
                assert!(p.is_well_formed());
            }
            other => panic!("wrong frame: {}", other.kind()),
        }
    }

    #[test]
    fn malformed_fields_are_detected() {
        let short_hash = ProposeRoundPayload {
            round: 1,
            round_hash: "abcd".to_string(),
            signature: "cd".repeat(65),
        };
        assert!(!short_hash.is_well_formed());

        let short_sig = HandshakePayload {
            auth_token: "a".repeat(32),
            signature: "cd".repeat(10),
            account: "w1w1".to_string(),
        };
        assert!(!short_sig.is_well_formed());

        let bad_account = HandshakePayload {
            auth_token: "a".repeat(32),
            signature: "cd".repeat(65),
            account: "xy".to_string(),
        };
        assert!(!bad_account.is_well_formed());
    }
}
