use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::correlator::EventKind;

type HmacSha256 = Hmac<Sha256>;

/// Everything needed to render one event's payloads. Built once per
/// dispatch; the resulting bytes are identical across retries.
#[derive(Debug, Clone)]
pub struct PayloadInput<'a> {
    pub kind: EventKind,
    pub event_id: Uuid,
    pub pairing_id: &'a str,
    pub duration_sec: u32,
    pub server_time_ms: i64,
    pub offset_ms: i64,
}

impl PayloadInput<'_> {
    pub fn ends_at_ms(&self) -> i64 {
        self.server_time_ms + i64::from(self.duration_sec) * 1000
    }
}

/// Canonical signing form: minified UTF-8 JSON with sorted keys, every
/// value a string. Both ends must produce these exact bytes for the HMAC
/// to agree.
pub fn canonical_payload(input: &PayloadInput) -> Result<String> {
    let mut fields: BTreeMap<&str, String> = BTreeMap::new();
    fields.insert("schema", "1".into());
    fields.insert("type", input.kind.as_str().into());
    fields.insert("event", input.kind.as_str().into());
    fields.insert("pairing_id", input.pairing_id.into());
    fields.insert("eventId", input.event_id.to_string());
    fields.insert("start_time", input.server_time_ms.to_string());
    fields.insert("endsAt", input.ends_at_ms().to_string());
    fields.insert("duration", input.duration_sec.to_string());
    fields.insert("sentAtMs", input.server_time_ms.to_string());
    fields.insert("desktopOffset", input.offset_ms.to_string());

    serde_json::to_string(&fields).context("canonical payload serialization failed")
}

/// Mirror-store document. Numeric timestamps, unsigned; the mirror is
/// best-effort and read back by the mobile app directly.
pub fn mirror_payload(input: &PayloadInput, updated_at_ms: i64) -> serde_json::Value {
    serde_json::json!({
        "schema": "1",
        "type": input.kind.as_str(),
        "eventId": input.event_id.to_string(),
        "endsAt": input.ends_at_ms(),
        "timestamp": input.server_time_ms,
        "updatedAt": updated_at_ms,
    })
}

/// Lowercase hex HMAC-SHA256 of the canonical payload.
pub fn sign(secret: &str, canonical: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(canonical.as_bytes());

    let digest = mac.finalize().into_bytes();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PayloadInput<'static> {
        PayloadInput {
            kind: EventKind::Pop,
            event_id: Uuid::nil(),
            pairing_id: "pair:1",
            duration_sec: 37,
            server_time_ms: 1_700_000_000_000,
            offset_ms: 120,
        }
    }

    #[test]
    fn canonical_payload_is_sorted_and_minified() {
        let json = canonical_payload(&input()).expect("payload");
        assert!(!json.contains(' '), "no whitespace: {json}");

        // Keys must appear in byte order so both ends sign identical bytes.
        let keys = [
            "desktopOffset",
            "duration",
            "endsAt",
            "event",
            "eventId",
            "pairing_id",
            "schema",
            "sentAtMs",
            "start_time",
            "type",
        ];
        let positions: Vec<usize> = keys
            .iter()
            .map(|k| json.find(&format!("\"{k}\":")).expect("key present"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
    }

    #[test]
    fn ends_at_is_server_time_plus_duration() {
        let json = canonical_payload(&input()).expect("payload");
        assert!(json.contains("\"endsAt\":\"1700000037000\""));
        assert!(json.contains("\"duration\":\"37\""));
        assert!(json.contains("\"type\":\"arena_pop\""));
    }

    #[test]
    fn signing_is_deterministic() {
        let json = canonical_payload(&input()).expect("payload");
        assert_eq!(sign("secret", &json), sign("secret", &json));
        assert_eq!(sign("secret", &json).len(), 64);
        assert!(sign("secret", &json).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn any_field_change_changes_the_signature() {
        let base = canonical_payload(&input()).expect("payload");

        let mut stopped = input();
        stopped.kind = EventKind::Stop;
        stopped.duration_sec = 0;
        let changed = canonical_payload(&stopped).expect("payload");

        assert_ne!(sign("secret", &base), sign("secret", &changed));
        assert_ne!(sign("secret", &base), sign("other-secret", &base));
    }

    #[test]
    fn known_vector_matches_reference_implementation() {
        // hmac-sha256("key", "message"), cross-checked against the cloud
        // function's verifier.
        assert_eq!(
            sign("key", "message"),
            "6e9ef29b75fffc5b7abae527d58fdadb2fe42e7219011976917343065f58ed4a"
        );
    }
}
