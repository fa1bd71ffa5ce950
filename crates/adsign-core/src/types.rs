//! Data model for signed contextual ads.
//!
//! A [`SignedContextualAds`] bundle is produced and signed by a buyer
//! ad tech; everything except the `signature` field is covered by the
//! canonical encoding (see [`crate::canonical`]). Sets are modeled as
//! `BTreeSet` so canonical ordering is structural rather than a
//! property of whoever built the value.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for an ad tech (buyer or seller), e.g. a domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdTechIdentifier(String);

impl AdTechIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdTechIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdTechIdentifier {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for AdTechIdentifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Frequency cap for one ad counter key.
///
/// `interval_ms` is the cap interval in milliseconds; it is rendered
/// as a plain integer in the canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedFrequencyCap {
    pub ad_counter_key: i32,
    pub max_count: i32,
    pub interval_ms: i64,
}

/// Per-event frequency cap lists, in canonical emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyCapFilters {
    #[serde(default)]
    pub click_events: Vec<KeyedFrequencyCap>,
    #[serde(default)]
    pub win_events: Vec<KeyedFrequencyCap>,
    #[serde(default)]
    pub impression_events: Vec<KeyedFrequencyCap>,
    #[serde(default)]
    pub view_events: Vec<KeyedFrequencyCap>,
}

/// Optional targeting filters attached to an ad.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdFilters {
    /// Package names for app-install filtering. Absent means the ad
    /// carries no app-install filter at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_install_package_names: Option<BTreeSet<String>>,
    #[serde(default)]
    pub frequency_caps: FrequencyCapFilters,
}

/// A single ad: buyer metadata plus where to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdData {
    pub metadata: String,
    pub render_uri: String,
    /// Structurally required; an empty set still appears in the
    /// canonical encoding as an empty value.
    #[serde(default)]
    pub ad_counter_keys: BTreeSet<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_render_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_filters: Option<AdFilters>,
}

/// An ad paired with the buyer's bid for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdWithBid {
    pub ad_data: AdData,
    pub bid: f64,
}

/// One buyer's signed contextual-ads bundle.
///
/// The `signature` bytes are supplied alongside the signed fields and
/// are never part of the canonical encoding. In JSON they travel as
/// standard base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedContextualAds {
    pub buyer: AdTechIdentifier,
    pub decision_logic_uri: String,
    pub ads_with_bid: Vec<AdWithBid>,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignedContextualAds {
    /// Returns a copy carrying `signature` instead of the current one.
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_ads() -> SignedContextualAds {
        SignedContextualAds {
            buyer: "buyer.example.com".into(),
            decision_logic_uri: "https://buyer.example.com/decision".into(),
            ads_with_bid: vec![AdWithBid {
                ad_data: AdData {
                    metadata: r#"{"seat":1}"#.into(),
                    render_uri: "https://buyer.example.com/render/1".into(),
                    ad_counter_keys: BTreeSet::from([2, 1]),
                    ad_render_id: None,
                    ad_filters: None,
                },
                bid: 1.5,
            }],
            signature: vec![0xde, 0xad],
        }
    }

    #[test]
    fn signature_roundtrips_as_base64_json() {
        let ads = minimal_ads();
        let json = serde_json::to_string(&ads).unwrap();
        assert!(json.contains("\"signature\":\"3q0=\""));

        let back: SignedContextualAds = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ads);
    }

    #[test]
    fn absent_optionals_are_omitted_from_json() {
        let json = serde_json::to_string(&minimal_ads()).unwrap();
        assert!(!json.contains("ad_render_id"));
        assert!(!json.contains("ad_filters"));
    }

    #[test]
    fn counter_keys_deduplicate_and_sort() {
        let json = r#"{
            "buyer": "b.com",
            "decision_logic_uri": "https://b.com/d",
            "ads_with_bid": [{
                "ad_data": {
                    "metadata": "",
                    "render_uri": "https://b.com/r",
                    "ad_counter_keys": [3, 1, 3, 2]
                },
                "bid": 0.5
            }],
            "signature": ""
        }"#;
        let ads: SignedContextualAds = serde_json::from_str(json).unwrap();
        let keys: Vec<i32> = ads.ads_with_bid[0]
            .ad_data
            .ad_counter_keys
            .iter()
            .copied()
            .collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }
}
