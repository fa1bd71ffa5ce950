//! Single-key signature check: ECDSA P-256 with SHA-256.
//!
//! Public keys arrive as SPKI (X.509) DER, the encoding the key store
//! persists; signatures are ASN.1 DER as emitted by standard ECDSA
//! signers. A key whose bytes do not parse is reported as malformed
//! rather than as a failed verification so the orchestrator can count
//! the two cases separately; a signature that does not parse simply
//! does not match. Nothing here blocks or returns an error.

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Result of trying one candidate key against one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyVerdict {
    /// The signature was produced by the private key paired with this
    /// public key.
    Match,
    /// Well-formed key, but the signature does not verify under it
    /// (or the signature bytes themselves do not parse).
    NoMatch,
    /// The stored key bytes are not a parseable EC public key.
    MalformedKey,
}

/// Seam between the orchestrator and the cryptography, so the key
/// iteration laws can be tested with a scripted fake.
pub trait KeyedVerifier {
    fn verify(&self, public_key_der: &[u8], message: &[u8], signature: &[u8]) -> KeyVerdict;
}

/// Production primitive: ECDSA-with-SHA-256 over the P-256 curve.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaSha256Verifier;

impl KeyedVerifier for EcdsaSha256Verifier {
    fn verify(&self, public_key_der: &[u8], message: &[u8], signature: &[u8]) -> KeyVerdict {
        let key = match VerifyingKey::from_public_key_der(public_key_der) {
            Ok(key) => key,
            Err(err) => {
                debug!(
                    key = %key_fingerprint(public_key_der),
                    %err,
                    "stored public key is not valid SPKI DER"
                );
                return KeyVerdict::MalformedKey;
            }
        };
        let Ok(signature) = Signature::from_der(signature) else {
            return KeyVerdict::NoMatch;
        };
        match key.verify(message, &signature) {
            Ok(()) => KeyVerdict::Match,
            Err(_) => KeyVerdict::NoMatch,
        }
    }
}

/// `sha256:<hex>` digest of key bytes, for logs and diagnostics.
/// Safe to emit where the raw key material should not appear.
pub fn key_fingerprint(public_key_der: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(public_key_der)))
}
