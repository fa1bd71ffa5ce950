//! JSON key-store file consumed by the diagnostics commands.
//!
//! Shape:
//!
//! ```json
//! {
//!   "enrollments": { "buyer.example.com": "enrollment-1" },
//!   "keys": {
//!     "enrollment-1": [
//!       { "body": "<base64 SPKI>", "expiration": "2026-01-01T00:00:00Z" }
//!     ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use adsign_core::{EnrollmentRecord, InMemoryStore, StoredSigningKey};
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct KeyStoreFile {
    #[serde(default)]
    pub enrollments: BTreeMap<String, String>,
    #[serde(default)]
    pub keys: BTreeMap<String, Vec<StoredSigningKey>>,
}

pub fn load(path: &Path) -> Result<InMemoryStore> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading key store {}", path.display()))?;
    let file: KeyStoreFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing key store {}", path.display()))?;

    let mut store = InMemoryStore::new();
    for (ad_tech, enrollment_id) in file.enrollments {
        store.insert_enrollment(
            ad_tech,
            EnrollmentRecord {
                enrollment_id: Some(enrollment_id),
            },
        );
    }
    for (enrollment_id, keys) in file.keys {
        store.set_keys(enrollment_id, keys);
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use adsign_core::{EnrollmentStore, SigningKeyStore};
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    use super::*;

    #[test]
    fn loads_enrollments_and_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "enrollments": {{ "buyer.example.com": "enrollment-1" }},
                "keys": {{
                    "enrollment-1": [
                        {{ "body": "AQIDBAU=", "expiration": "1970-01-01T00:00:01Z" }}
                    ]
                }}
            }}"#
        )
        .unwrap();

        let store = load(file.path()).unwrap();

        let record = store
            .enrollment_for_ad_tech(&"buyer.example.com".into())
            .unwrap()
            .unwrap();
        assert_eq!(record.enrollment_id.as_deref(), Some("enrollment-1"));

        let keys = store.signing_keys("enrollment-1").unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].body, "AQIDBAU=");
        assert_eq!(keys[0].expiration, Utc.timestamp_opt(1, 0).unwrap());
    }

    #[test]
    fn missing_expiration_defaults_to_epoch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "keys": {{ "enrollment-1": [ {{ "body": "AQID" }} ] }} }}"#
        )
        .unwrap();

        let store = load(file.path()).unwrap();
        let keys = store.signing_keys("enrollment-1").unwrap();
        assert_eq!(keys[0].expiration, chrono::DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(load(Path::new("/nonexistent/keys.json")).is_err());
    }
}
