//! Verification orchestrator: the public entry point of the crate.
//!
//! One call runs a single synchronous pass: resolve the buyer's keys,
//! encode the payload once, try candidate keys in ascending expiration
//! order, stop at the first match. All data-quality problems come back
//! as a `false` verdict with a classified failure reason; no error
//! escapes `verify` or `is_verified`.

use tracing::{debug, warn};

use crate::canonical::canonical_bytes;
use crate::crypto::{key_fingerprint, EcdsaSha256Verifier, KeyVerdict, KeyedVerifier};
use crate::keys::{
    EnrollmentStore, KeyResolution, KeyResolver, ResolvedKey, SigningKeyStore, StoreResult,
};
use crate::telemetry::{
    FailureReason, SignatureVerificationRecorder, SignatureVerificationStats, VerificationStatus,
};
use crate::types::{AdTechIdentifier, SignedContextualAds};

use serde::Serialize;

/// Stands in for an enrollment id that could not be resolved when
/// attributing a failure.
pub const MISSING_ENROLLMENT_ID_PLACEHOLDER: &str = "unknown";

/// Verdict plus the counters and telemetry of one verification call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub keys_fetched: u32,
    pub keys_malformed: u32,
    pub keys_failed_to_match: u32,
    pub failure_reason: Option<FailureReason>,
    pub stats: SignatureVerificationStats,
}

/// Verifies signed contextual ads against a buyer's enrolled keys.
///
/// Collaborators are injected at construction; the manager holds no
/// mutable state, so one instance can serve concurrent calls.
#[derive(Debug)]
pub struct SignatureManager<E, K, V = EcdsaSha256Verifier> {
    enrollment_store: E,
    signing_key_store: K,
    verifier: V,
}

impl<E, K> SignatureManager<E, K>
where
    E: EnrollmentStore,
    K: SigningKeyStore,
{
    pub fn new(enrollment_store: E, signing_key_store: K) -> Self {
        Self::with_verifier(enrollment_store, signing_key_store, EcdsaSha256Verifier)
    }
}

impl<E, K, V> SignatureManager<E, K, V>
where
    E: EnrollmentStore,
    K: SigningKeyStore,
    V: KeyedVerifier,
{
    /// Swaps the cryptographic primitive, mainly so tests can script
    /// per-key verdicts without real key material.
    pub fn with_verifier(enrollment_store: E, signing_key_store: K, verifier: V) -> Self {
        Self {
            enrollment_store,
            signing_key_store,
            verifier,
        }
    }

    /// Convenience wrapper over [`Self::verify`] for callers that only
    /// need the boolean verdict.
    pub fn is_verified(
        &self,
        buyer: &AdTechIdentifier,
        seller: &AdTechIdentifier,
        caller_package_name: &str,
        ads: &SignedContextualAds,
    ) -> bool {
        self.verify(buyer, seller, caller_package_name, ads).verified
    }

    /// Runs the full verification pass.
    ///
    /// Never returns an error: store failures, missing enrollment,
    /// missing or malformed keys and non-matching signatures all fold
    /// into a `false` verdict with a [`FailureReason`]. The seller is
    /// resolved purely for failure attribution and cannot affect the
    /// verdict.
    pub fn verify(
        &self,
        buyer: &AdTechIdentifier,
        seller: &AdTechIdentifier,
        caller_package_name: &str,
        ads: &SignedContextualAds,
    ) -> VerificationOutcome {
        let mut recorder = SignatureVerificationRecorder::new();
        debug!(%buyer, %seller, "verifying signed contextual ads");

        recorder.start_key_fetch();
        let resolution = self.resolver().resolve(buyer);
        recorder.end_key_fetch();

        let (keys, buyer_enrollment_id, mut failure) = match resolution {
            Ok(KeyResolution::Keys {
                enrollment_id,
                keys,
            }) => (keys, Some(enrollment_id), None),
            Ok(KeyResolution::NoKeys { enrollment_id }) => {
                debug!(%buyer, "no signing keys stored for buyer");
                (
                    Vec::new(),
                    Some(enrollment_id),
                    Some(FailureReason::NoKeysFetchedForBuyer),
                )
            }
            Ok(KeyResolution::NotEnrolled) => {
                debug!(%buyer, "buyer has no enrollment data");
                (Vec::new(), None, Some(FailureReason::NoEnrollmentDataForBuyer))
            }
            Err(err) => {
                warn!(%buyer, %err, "key resolution failed");
                (Vec::new(), None, Some(FailureReason::UnknownError))
            }
        };
        recorder.set_num_keys_fetched(keys.len() as u32);

        // All three phases are bracketed even when an earlier step
        // already decided the outcome; short phases just measure ~0.
        recorder.start_serialization();
        let message = if failure.is_none() {
            Some(canonical_bytes(ads))
        } else {
            None
        };
        recorder.end_serialization();

        recorder.start_signature_check();
        let mut verified = false;
        if let Some(message) = &message {
            if ads.signature.is_empty() {
                debug!(%buyer, "empty signature supplied");
                failure = Some(FailureReason::WrongSignatureFormat);
            } else {
                verified = self.try_keys(&keys, message, &ads.signature, &mut recorder);
                if !verified {
                    failure = Some(FailureReason::VerificationFailed);
                }
            }
        }
        recorder.end_signature_check();

        if let Some(reason) = failure {
            recorder.set_failure_detail(reason);
            recorder.set_failed_buyer_enrollment_id(
                buyer_enrollment_id
                    .as_deref()
                    .unwrap_or(MISSING_ENROLLMENT_ID_PLACEHOLDER),
            );
            recorder.set_failed_seller_enrollment_id(&self.seller_attribution(seller));
            recorder.set_failed_caller_package_name(caller_package_name);
        }

        let status = if verified {
            VerificationStatus::Verified
        } else {
            VerificationStatus::VerificationFailed
        };
        let stats = recorder.close(status);
        VerificationOutcome {
            verified,
            keys_fetched: stats.num_keys_fetched,
            keys_malformed: stats.num_keys_with_wrong_format,
            keys_failed_to_match: stats.num_keys_failed_to_verify,
            failure_reason: stats.failure_reason,
            stats,
        }
    }

    /// Returns the buyer's decoded signing keys, soonest-expiring
    /// first, without running a verification. Diagnostics accessor;
    /// empty when the buyer is unknown or has no keys.
    pub fn fetch_public_keys_for_ad_tech(
        &self,
        ad_tech: &AdTechIdentifier,
    ) -> StoreResult<Vec<Vec<u8>>> {
        match self.resolver().resolve(ad_tech)? {
            KeyResolution::Keys { keys, .. } => {
                Ok(keys.into_iter().map(|key| key.bytes).collect())
            }
            KeyResolution::NotEnrolled | KeyResolution::NoKeys { .. } => Ok(Vec::new()),
        }
    }

    fn resolver(&self) -> KeyResolver<'_, E, K> {
        KeyResolver::new(&self.enrollment_store, &self.signing_key_store)
    }

    /// Candidate loop: stop at the first match. Keys after a match are
    /// never attempted; malformed keys are counted separately and do
    /// not count as failed attempts.
    fn try_keys(
        &self,
        keys: &[ResolvedKey],
        message: &[u8],
        signature: &[u8],
        recorder: &mut SignatureVerificationRecorder,
    ) -> bool {
        for key in keys {
            match self.verifier.verify(&key.bytes, message, signature) {
                KeyVerdict::Match => return true,
                KeyVerdict::NoMatch => recorder.add_key_failed_to_verify(),
                KeyVerdict::MalformedKey => {
                    warn!(key = %key_fingerprint(&key.bytes), "skipping malformed signing key");
                    recorder.add_key_with_wrong_format();
                }
            }
        }
        false
    }

    /// Seller enrollment is resolved independently and only feeds the
    /// failure attribution; lookup problems downgrade to a placeholder
    /// and never gate the verdict.
    fn seller_attribution(&self, seller: &AdTechIdentifier) -> String {
        match self.resolver().enrollment_id_for(seller) {
            Ok(Some(enrollment_id)) => enrollment_id,
            Ok(None) => MISSING_ENROLLMENT_ID_PLACEHOLDER.to_owned(),
            Err(err) => {
                warn!(%seller, %err, "seller enrollment lookup failed");
                MISSING_ENROLLMENT_ID_PLACEHOLDER.to_owned()
            }
        }
    }
}
