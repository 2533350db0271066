//! Ed25519 signature verification.

use crate::domain::{Hash, PublicKey, Signature};
use crate::ports::outbound::SignatureVerifier;
use ed25519_dalek::{Verifier, VerifyingKey};

/// Verifies signatures over the transaction hash with the sender's
/// Ed25519 key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519SignatureVerifier;

impl SignatureVerifier for Ed25519SignatureVerifier {
    fn verify(&self, message: &Hash, signature: &Signature, public_key: &PublicKey) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(signature);
        verifying_key.verify(message, &signature).is_ok()
    }
}
