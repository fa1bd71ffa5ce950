//! Per-call verification telemetry.
//!
//! Each verification call owns one [`SignatureVerificationRecorder`];
//! nothing is shared between concurrent calls, so counters from
//! different payloads can never interleave. The recorder brackets the
//! three pipeline phases (key fetch, serialization, signature check),
//! accumulates counters and failure details, and collapses into an
//! immutable [`SignatureVerificationStats`] on `close`. The caller
//! forwards the stats to whatever metrics pipeline it uses; this crate
//! never talks to a logging backend directly.
//!
//! Recorder misuse (repeated start, end without start, attribution on
//! a verified run) is logged and ignored rather than escalated; a
//! telemetry bug must not take down a verification.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

/// Terminal status of one verification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    VerificationFailed,
}

/// Why a call failed. Exhaustive and mutually exclusive per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Unexpected error during resolution or encoding.
    UnknownError,
    /// Buyer has no enrollment record (or one without an id).
    NoEnrollmentDataForBuyer,
    /// Buyer is enrolled but the key store returned nothing.
    NoKeysFetchedForBuyer,
    /// The provided signature bytes are structurally invalid, detected
    /// before any key is tried.
    WrongSignatureFormat,
    /// Every well-formed candidate key was tried and none matched.
    VerificationFailed,
}

/// Immutable snapshot produced when a recorder closes. Latencies are
/// present only for phases that were bracketed by both markers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignatureVerificationStats {
    pub status: VerificationStatus,
    pub key_fetch_latency: Option<Duration>,
    pub serialization_latency: Option<Duration>,
    pub verification_latency: Option<Duration>,
    pub num_keys_fetched: u32,
    pub num_keys_with_wrong_format: u32,
    pub num_keys_failed_to_verify: u32,
    pub failure_reason: Option<FailureReason>,
    pub failed_buyer_enrollment_id: Option<String>,
    pub failed_seller_enrollment_id: Option<String>,
    pub failed_caller_package_name: Option<String>,
}

#[derive(Debug)]
struct PhaseSpan {
    name: &'static str,
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl PhaseSpan {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            started: None,
            elapsed: None,
        }
    }

    fn start(&mut self) {
        if self.started.is_some() {
            warn!(phase = self.name, "phase already started");
            return;
        }
        self.started = Some(Instant::now());
    }

    fn end(&mut self) {
        let Some(started) = self.started else {
            warn!(phase = self.name, "phase ended without a start");
            return;
        };
        if self.elapsed.is_some() {
            warn!(phase = self.name, "phase already ended");
            return;
        }
        self.elapsed = Some(started.elapsed());
    }
}

/// Mutable accumulator for one verification call.
#[derive(Debug)]
pub struct SignatureVerificationRecorder {
    key_fetch: PhaseSpan,
    serialization: PhaseSpan,
    signature_check: PhaseSpan,
    num_keys_fetched: u32,
    num_keys_with_wrong_format: u32,
    num_keys_failed_to_verify: u32,
    failure_reason: Option<FailureReason>,
    failed_buyer_enrollment_id: Option<String>,
    failed_seller_enrollment_id: Option<String>,
    failed_caller_package_name: Option<String>,
}

impl Default for SignatureVerificationRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerificationRecorder {
    pub fn new() -> Self {
        Self {
            key_fetch: PhaseSpan::new("key_fetch"),
            serialization: PhaseSpan::new("serialization"),
            signature_check: PhaseSpan::new("signature_check"),
            num_keys_fetched: 0,
            num_keys_with_wrong_format: 0,
            num_keys_failed_to_verify: 0,
            failure_reason: None,
            failed_buyer_enrollment_id: None,
            failed_seller_enrollment_id: None,
            failed_caller_package_name: None,
        }
    }

    pub fn start_key_fetch(&mut self) {
        self.key_fetch.start();
    }

    pub fn end_key_fetch(&mut self) {
        self.key_fetch.end();
    }

    pub fn start_serialization(&mut self) {
        self.serialization.start();
    }

    pub fn end_serialization(&mut self) {
        self.serialization.end();
    }

    pub fn start_signature_check(&mut self) {
        self.signature_check.start();
    }

    pub fn end_signature_check(&mut self) {
        self.signature_check.end();
    }

    pub fn set_num_keys_fetched(&mut self, count: u32) {
        self.num_keys_fetched = count;
    }

    pub fn add_key_with_wrong_format(&mut self) {
        self.num_keys_with_wrong_format += 1;
    }

    pub fn add_key_failed_to_verify(&mut self) {
        self.num_keys_failed_to_verify += 1;
    }

    /// First reason wins; later calls with a different reason are a
    /// caller bug and only logged.
    pub fn set_failure_detail(&mut self, reason: FailureReason) {
        if let Some(existing) = self.failure_reason {
            if existing != reason {
                warn!(?existing, ?reason, "failure detail already recorded");
            }
            return;
        }
        self.failure_reason = Some(reason);
    }

    pub fn set_failed_buyer_enrollment_id(&mut self, enrollment_id: &str) {
        self.failed_buyer_enrollment_id = Some(enrollment_id.to_owned());
    }

    pub fn set_failed_seller_enrollment_id(&mut self, enrollment_id: &str) {
        self.failed_seller_enrollment_id = Some(enrollment_id.to_owned());
    }

    pub fn set_failed_caller_package_name(&mut self, package_name: &str) {
        self.failed_caller_package_name = Some(package_name.to_owned());
    }

    /// Terminal call. Attribution is only meaningful for failed runs;
    /// anything recorded on a verified run is purged before the stats
    /// leave the recorder.
    pub fn close(mut self, status: VerificationStatus) -> SignatureVerificationStats {
        if status == VerificationStatus::Verified && self.any_attribution_set() {
            warn!("attribution recorded on a verified run; purging");
            self.failed_buyer_enrollment_id = None;
            self.failed_seller_enrollment_id = None;
            self.failed_caller_package_name = None;
        }
        SignatureVerificationStats {
            status,
            key_fetch_latency: self.key_fetch.elapsed,
            serialization_latency: self.serialization.elapsed,
            verification_latency: self.signature_check.elapsed,
            num_keys_fetched: self.num_keys_fetched,
            num_keys_with_wrong_format: self.num_keys_with_wrong_format,
            num_keys_failed_to_verify: self.num_keys_failed_to_verify,
            failure_reason: self.failure_reason,
            failed_buyer_enrollment_id: self.failed_buyer_enrollment_id,
            failed_seller_enrollment_id: self.failed_seller_enrollment_id,
            failed_caller_package_name: self.failed_caller_package_name,
        }
    }

    fn any_attribution_set(&self) -> bool {
        self.failed_buyer_enrollment_id.is_some()
            || self.failed_seller_enrollment_id.is_some()
            || self.failed_caller_package_name.is_some()
    }
}
