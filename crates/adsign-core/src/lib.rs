//! Signature verification for signed contextual ads.
//!
//! A buyer ad tech signs its contextual-ads bundle; before the ad
//! auction trusts that bundle, this crate checks the signature against
//! the buyer's enrolled ECDSA P-256 keys:
//!
//! 1. [`canonical`] derives the byte-exact signed message
//! 2. [`keys`] resolves the buyer's candidate keys, soonest-expiring
//!    first
//! 3. [`crypto`] checks one key against the signature
//! 4. [`manager`] orchestrates the pass and classifies the outcome,
//!    with per-call telemetry from [`telemetry`]
//!
//! The public entry point is [`SignatureManager::is_verified`] (or
//! [`SignatureManager::verify`] for the full outcome).

pub mod canonical;
pub mod crypto;
pub mod keys;
pub mod manager;
pub mod telemetry;
pub mod types;

// Convenience re-exports
pub use canonical::canonical_bytes;
pub use crypto::{key_fingerprint, EcdsaSha256Verifier, KeyVerdict, KeyedVerifier};
pub use keys::{
    EnrollmentRecord, EnrollmentStore, InMemoryStore, KeyResolution, KeyResolver, ResolvedKey,
    SigningKeyStore, StoreError, StoreResult, StoredSigningKey,
};
pub use manager::{SignatureManager, VerificationOutcome, MISSING_ENROLLMENT_ID_PLACEHOLDER};
pub use telemetry::{
    FailureReason, SignatureVerificationRecorder, SignatureVerificationStats, VerificationStatus,
};
pub use types::{
    AdData, AdFilters, AdTechIdentifier, AdWithBid, FrequencyCapFilters, KeyedFrequencyCap,
    SignedContextualAds,
};
