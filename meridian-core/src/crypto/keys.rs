//! secp256k1 recoverable signatures
//!
//! Signatures follow the anchor chain's compact format: one recovery
//! prefix byte (`31 + recovery_id`) followed by the 64-byte compact
//! signature, hex-encoded to 130 chars. Secret keys are hex-encoded
//! 32-byte scalars; public keys are hex-encoded 33-byte compressed
//! points. Verification recovers the public key from the signature and
//! compares it to the registered one.

use std::sync::OnceLock;

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::Serialize;

use crate::crypto::{canonical, sha256_bytes};
use crate::error::{CoreError, CoreResult};

const RECOVERY_PREFIX: u8 = 31;

fn secp() -> &'static Secp256k1<All> {
    static CTX: OnceLock<Secp256k1<All>> = OnceLock::new();
    CTX.get_or_init(Secp256k1::new)
}

/// A witness signing key pair.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Load a key pair from a hex-encoded 32-byte secret.
    pub fn from_secret_hex(secret_hex: &str) -> CoreResult<Self> {
        let bytes = hex::decode(secret_hex)?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| CoreError::Key(format!("invalid secret key: {e}")))?;
        let public = PublicKey::from_secret_key(secp(), &secret);
        Ok(Self { secret, public })
    }

    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        loop {
            let bytes: [u8; 32] = rand::random();
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                let public = PublicKey::from_secret_key(secp(), &secret);
                return Self { secret, public };
            }
        }
    }

    /// Hex-encoded compressed public key (66 chars).
    pub fn public_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Hex-encoded secret key.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    /// Sign a raw 32-byte digest; returns the 130-char hex signature.
    pub fn sign_digest(&self, digest: [u8; 32]) -> String {
        let message = Message::from_digest(digest);
        let signature = secp().sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut bytes = Vec::with_capacity(65);
        bytes.push(RECOVERY_PREFIX + recovery_id.to_i32() as u8);
        bytes.extend_from_slice(&compact);
        hex::encode(bytes)
    }

    /// Sign the SHA-256 of the canonical JSON form of `value`.
    pub fn sign_json<T: Serialize>(&self, value: &T) -> CoreResult<String> {
        let json = canonical::to_canonical_json(value)?;
        Ok(self.sign_digest(sha256_bytes(json)))
    }

    /// Sign a digest that is already hex-encoded (e.g. a round hash).
    pub fn sign_hex_digest(&self, digest_hex: &str) -> CoreResult<String> {
        Ok(self.sign_digest(decode_digest(digest_hex)?))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_hex())
            .finish_non_exhaustive()
    }
}

fn decode_digest(digest_hex: &str) -> CoreResult<[u8; 32]> {
    let bytes = hex::decode(digest_hex)?;
    bytes
        .try_into()
        .map_err(|_| CoreError::Signature("digest must be 32 bytes".to_string()))
}

fn parse_signature(signature_hex: &str) -> CoreResult<RecoverableSignature> {
    let bytes = hex::decode(signature_hex)?;
    if bytes.len() != 65 {
        return Err(CoreError::Signature(format!(
            "invalid signature length: expected 65 bytes, got {}",
            bytes.len()
        )));
    }
    let recovery_id = RecoveryId::from_i32(bytes[0].wrapping_sub(RECOVERY_PREFIX) as i32)
        .map_err(|e| CoreError::Signature(format!("invalid recovery id: {e}")))?;
    RecoverableSignature::from_compact(&bytes[1..], recovery_id)
        .map_err(|e| CoreError::Signature(format!("invalid signature: {e}")))
}

/// Recover the hex-encoded public key that produced `signature_hex` over
/// a raw digest.
pub fn recover_public(digest: [u8; 32], signature_hex: &str) -> CoreResult<String> {
    let signature = parse_signature(signature_hex)?;
    let message = Message::from_digest(digest);
    let public = secp()
        .recover_ecdsa(&message, &signature)
        .map_err(|e| CoreError::Signature(format!("recovery failed: {e}")))?;
    Ok(hex::encode(public.serialize()))
}

/// Verify a signature over a raw digest against a registered public key.
pub fn verify_digest(digest: [u8; 32], signature_hex: &str, public_hex: &str) -> bool {
    match recover_public(digest, signature_hex) {
        Ok(recovered) => recovered == public_hex,
        Err(_) => false,
    }
}

/// Verify a signature over the canonical JSON form of `value`.
pub fn verify_json<T: Serialize>(value: &T, signature_hex: &str, public_hex: &str) -> bool {
    match canonical::to_canonical_json(value) {
        Ok(json) => verify_digest(sha256_bytes(json), signature_hex, public_hex),
        Err(_) => false,
    }
}

/// Verify a signature over an already hex-encoded digest.
pub fn verify_hex_digest(digest_hex: &str, signature_hex: &str, public_hex: &str) -> bool {
    match decode_digest(digest_hex) {
        Ok(digest) => verify_digest(digest, signature_hex, public_hex),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256_hex;

    #[test]
    fn sign_and_verify_digest() {
        let keys = KeyPair::generate();
        let digest = sha256_bytes("round data");

        let sig = keys.sign_digest(digest);
        assert_eq!(sig.len(), 130);
        assert!(verify_digest(digest, &sig, &keys.public_hex()));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let keys = KeyPair::generate();
        let other = KeyPair::generate();
        let digest = sha256_bytes("round data");

        let sig = keys.sign_digest(digest);
        assert!(!verify_digest(digest, &sig, &other.public_hex()));
    }

    #[test]
    fn verify_rejects_tampered_digest() {
        let keys = KeyPair::generate();
        let sig = keys.sign_digest(sha256_bytes("a"));
        assert!(!verify_digest(sha256_bytes("b"), &sig, &keys.public_hex()));
    }

    #[test]
    fn json_signature_roundtrip() {
        let keys = KeyPair::generate();
        let value = serde_json::json!({ "authToken": "abcd" });

        let sig = keys.sign_json(&value).unwrap();
        assert!(verify_json(&value, &sig, &keys.public_hex()));
        assert!(!verify_json(
            &serde_json::json!({ "authToken": "efgh" }),
            &sig,
            &keys.public_hex()
        ));
    }

    #[test]
    fn hex_digest_signature_roundtrip() {
        let keys = KeyPair::generate();
        let round_hash = sha256_hex("block hashes");

        let sig = keys.sign_hex_digest(&round_hash).unwrap();
        assert!(verify_hex_digest(&round_hash, &sig, &keys.public_hex()));
    }

    #[test]
    fn secret_hex_roundtrip() {
        let keys = KeyPair::generate();
        let restored = KeyPair::from_secret_hex(&keys.secret_hex()).unwrap();
        assert_eq!(keys.public_hex(), restored.public_hex());
    }

    #[test]
    fn malformed_signature_is_rejected() {
        let keys = KeyPair::generate();
        let digest = sha256_bytes("x");
        assert!(!verify_digest(digest, "00", &keys.public_hex()));
        assert!(!verify_digest(digest, "zz", &keys.public_hex()));
    }
}
