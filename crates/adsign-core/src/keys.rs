//! Enrollment and signing-key resolution.
//!
//! The verifier does not own key material. It reads two external
//! stores: an enrollment registry binding an ad tech identifier to an
//! enrollment id, and a key store holding base64-encoded signing keys
//! per enrollment id. [`KeyResolver`] composes the two reads and hands
//! back candidate keys sorted ascending by expiration, so rotation
//! tries the soonest-expiring key first.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::AdTechIdentifier;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the external enrollment/key stores.
///
/// These never escape the public verification entry points; the
/// orchestrator folds them into the `UnknownError` classification.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend could not be reached or read.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// A record was read but could not be decoded.
    #[error("corrupt record for '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// External registration binding an ad tech to its enrollment id.
/// A record may exist without an id; callers treat that the same as
/// no record at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<String>,
}

/// A signing key as persisted by the key-management system: base64
/// body plus expiration. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSigningKey {
    pub body: String,
    #[serde(default = "unix_epoch")]
    pub expiration: DateTime<Utc>,
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Enrollment lookup collaborator.
pub trait EnrollmentStore {
    fn enrollment_for_ad_tech(
        &self,
        ad_tech: &AdTechIdentifier,
    ) -> StoreResult<Option<EnrollmentRecord>>;
}

/// Signing-key lookup collaborator, keyed by enrollment id.
pub trait SigningKeyStore {
    fn signing_keys(&self, enrollment_id: &str) -> StoreResult<Vec<StoredSigningKey>>;
}

/// A candidate key after decoding, ready for the signature primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub bytes: Vec<u8>,
    pub expiration: DateTime<Utc>,
}

/// Outcome of resolving a buyer's keys. The three empty-result causes
/// stay distinct here so the orchestrator can classify them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResolution {
    /// No enrollment record, or a record without an enrollment id.
    NotEnrolled,
    /// Enrolled, but the key store has no signing keys for it.
    NoKeys { enrollment_id: String },
    /// Enrolled with at least one key, ascending by expiration.
    Keys {
        enrollment_id: String,
        keys: Vec<ResolvedKey>,
    },
}

/// Read-through composition of the two store lookups. Stateless and
/// cache-free; every call hits the stores.
#[derive(Debug)]
pub struct KeyResolver<'a, E, K> {
    enrollment_store: &'a E,
    signing_key_store: &'a K,
}

impl<'a, E: EnrollmentStore, K: SigningKeyStore> KeyResolver<'a, E, K> {
    pub fn new(enrollment_store: &'a E, signing_key_store: &'a K) -> Self {
        Self {
            enrollment_store,
            signing_key_store,
        }
    }

    /// Resolves `ad_tech`'s enrollment id, if any. Used on its own for
    /// failure attribution of the seller side.
    pub fn enrollment_id_for(&self, ad_tech: &AdTechIdentifier) -> StoreResult<Option<String>> {
        let record = self.enrollment_store.enrollment_for_ad_tech(ad_tech)?;
        Ok(record
            .and_then(|r| r.enrollment_id)
            .filter(|id| !id.is_empty()))
    }

    /// Resolves `ad_tech`'s signing keys, soonest-expiring first.
    ///
    /// A key body that is not valid base64 is kept as its raw bytes;
    /// the signature primitive will classify it as malformed, which
    /// keeps a single bad record from hiding the buyer's good keys.
    pub fn resolve(&self, ad_tech: &AdTechIdentifier) -> StoreResult<KeyResolution> {
        let Some(enrollment_id) = self.enrollment_id_for(ad_tech)? else {
            return Ok(KeyResolution::NotEnrolled);
        };

        let mut stored = self.signing_key_store.signing_keys(&enrollment_id)?;
        if stored.is_empty() {
            return Ok(KeyResolution::NoKeys { enrollment_id });
        }
        // Stable sort: ties keep store order.
        stored.sort_by_key(|key| key.expiration);

        let keys = stored
            .into_iter()
            .map(|key| {
                let bytes = match BASE64.decode(&key.body) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(%enrollment_id, %err, "stored key body is not valid base64");
                        key.body.into_bytes()
                    }
                };
                ResolvedKey {
                    bytes,
                    expiration: key.expiration,
                }
            })
            .collect();

        Ok(KeyResolution::Keys {
            enrollment_id,
            keys,
        })
    }
}

/// Map-backed store for tests and the diagnostics CLI. Implements
/// both collaborator traits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    enrollments: HashMap<AdTechIdentifier, EnrollmentRecord>,
    keys: HashMap<String, Vec<StoredSigningKey>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_enrollment(
        &mut self,
        ad_tech: impl Into<AdTechIdentifier>,
        record: EnrollmentRecord,
    ) {
        self.enrollments.insert(ad_tech.into(), record);
    }

    pub fn insert_key(&mut self, enrollment_id: impl Into<String>, key: StoredSigningKey) {
        self.keys.entry(enrollment_id.into()).or_default().push(key);
    }

    pub fn set_keys(&mut self, enrollment_id: impl Into<String>, keys: Vec<StoredSigningKey>) {
        self.keys.insert(enrollment_id.into(), keys);
    }
}

impl EnrollmentStore for InMemoryStore {
    fn enrollment_for_ad_tech(
        &self,
        ad_tech: &AdTechIdentifier,
    ) -> StoreResult<Option<EnrollmentRecord>> {
        Ok(self.enrollments.get(ad_tech).cloned())
    }
}

impl SigningKeyStore for InMemoryStore {
    fn signing_keys(&self, enrollment_id: &str) -> StoreResult<Vec<StoredSigningKey>> {
        Ok(self.keys.get(enrollment_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const BUYER: &str = "buyer.example.com";
    const ENROLLMENT_ID: &str = "enrollment-1";

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn stored_key(raw: &[u8], expiration: DateTime<Utc>) -> StoredSigningKey {
        StoredSigningKey {
            body: BASE64.encode(raw),
            expiration,
        }
    }

    fn enrolled_store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.insert_enrollment(
            BUYER,
            EnrollmentRecord {
                enrollment_id: Some(ENROLLMENT_ID.into()),
            },
        );
        store
    }

    #[test]
    fn missing_record_is_not_enrolled() {
        let store = InMemoryStore::new();
        let resolver = KeyResolver::new(&store, &store);
        let resolution = resolver.resolve(&BUYER.into()).unwrap();
        assert_eq!(resolution, KeyResolution::NotEnrolled);
    }

    #[test]
    fn record_without_id_is_not_enrolled() {
        let mut store = InMemoryStore::new();
        store.insert_enrollment(BUYER, EnrollmentRecord::default());
        let resolver = KeyResolver::new(&store, &store);
        assert_eq!(
            resolver.resolve(&BUYER.into()).unwrap(),
            KeyResolution::NotEnrolled
        );
    }

    #[test]
    fn enrolled_without_keys_is_no_keys() {
        let store = enrolled_store();
        let resolver = KeyResolver::new(&store, &store);
        assert_eq!(
            resolver.resolve(&BUYER.into()).unwrap(),
            KeyResolution::NoKeys {
                enrollment_id: ENROLLMENT_ID.into()
            }
        );
    }

    #[test]
    fn keys_come_back_ascending_by_expiration() {
        let mut store = enrolled_store();
        // Persisted newest-first; resolution must not care.
        store.set_keys(
            ENROLLMENT_ID,
            vec![
                stored_key(&[6, 7, 8, 9, 10], at(1)),
                stored_key(&[1, 2, 3, 4, 5], at(0)),
            ],
        );
        let resolver = KeyResolver::new(&store, &store);

        let KeyResolution::Keys { keys, .. } = resolver.resolve(&BUYER.into()).unwrap() else {
            panic!("expected keys");
        };
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].bytes, vec![1, 2, 3, 4, 5]);
        assert_eq!(keys[1].bytes, vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn invalid_base64_body_falls_back_to_raw_bytes() {
        let mut store = enrolled_store();
        store.insert_key(
            ENROLLMENT_ID,
            StoredSigningKey {
                body: "!!not-base64!!".into(),
                expiration: at(0),
            },
        );
        let resolver = KeyResolver::new(&store, &store);

        let KeyResolution::Keys { keys, .. } = resolver.resolve(&BUYER.into()).unwrap() else {
            panic!("expected keys");
        };
        assert_eq!(keys[0].bytes, b"!!not-base64!!".to_vec());
    }

    #[test]
    fn seller_attribution_lookup_is_independent() {
        let store = enrolled_store();
        let resolver = KeyResolver::new(&store, &store);
        assert_eq!(
            resolver.enrollment_id_for(&BUYER.into()).unwrap(),
            Some(ENROLLMENT_ID.to_owned())
        );
        assert_eq!(
            resolver.enrollment_id_for(&"seller.example.com".into()).unwrap(),
            None
        );
    }
}
