use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::services::ids::IdGenerator;

/// Metafield coordinates of the settings blob on the shop owner.
pub const METAFIELD_NAMESPACE: &str = "scheduled_bar";
pub const METAFIELD_KEY: &str = "settings";

pub const DEFAULT_BACKGROUND_COLOR: &str = "#000000";
pub const DEFAULT_TEXT_COLOR: &str = "#ffffff";

/// One announcement bar as stored in the shop metafield.
///
/// Date strings are kept exactly as stored and only interpreted by
/// [`BarRecord::window`]. `updated_at` is bumped on every content edit so the
/// storefront can reset a visitor's "dismissed" state. Records written before
/// the stamp existed decode with `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarRecord {
    pub id: String,
    pub text: String,
    pub background_color: String,
    pub text_color: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub enabled: bool,
    pub dismissible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("bars payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("bars payload must be a JSON array")]
    NotAnArray,
}

impl BarRecord {
    /// Decode one stored entry. Never fails: every field falls back to its
    /// default when missing or of the wrong type.
    pub fn decode(raw: &Value, ids: &impl IdGenerator) -> Self {
        Self {
            id: string_field(raw, "id").unwrap_or_else(|| ids.next_id()),
            text: string_field(raw, "text").unwrap_or_default(),
            background_color: string_field(raw, "backgroundColor")
                .unwrap_or_else(|| DEFAULT_BACKGROUND_COLOR.into()),
            text_color: string_field(raw, "textColor")
                .unwrap_or_else(|| DEFAULT_TEXT_COLOR.into()),
            start_date: string_field(raw, "startDate"),
            end_date: string_field(raw, "endDate"),
            enabled: bool_field(raw, "enabled").unwrap_or(true),
            dismissible: bool_field(raw, "dismissible").unwrap_or(true),
            updated_at: string_field(raw, "updatedAt"),
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Whether both dates are filled in. Empty strings count as missing.
    pub fn has_dates(&self) -> bool {
        let filled = |date: &Option<String>| date.as_deref().is_some_and(|d| !d.trim().is_empty());
        filled(&self.start_date) && filled(&self.end_date)
    }

    /// The scheduling window, when both dates are present and readable.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = parse_instant(self.start_date.as_deref()?)?;
        let end = parse_instant(self.end_date.as_deref()?)?;
        Some((start, end))
    }
}

/// Decode the stored settings blob into the valid bar collection.
///
/// Absent, blank, unparseable or non-array input yields an empty collection.
pub fn decode_collection(raw: Option<&str>, ids: &impl IdGenerator) -> Vec<BarRecord> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Vec::new();
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => decode_items(&items, ids),
        Ok(_) => {
            tracing::warn!("stored bar settings are not an array, ignoring them");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("stored bar settings are not valid JSON, ignoring them: {e}");
            Vec::new()
        }
    }
}

/// Strict variant for submitted payloads: the top level must be a JSON array,
/// elements follow the same rules as [`decode_collection`].
pub fn parse_submission(raw: &str, ids: &impl IdGenerator) -> Result<Vec<BarRecord>, DecodeError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) => Ok(decode_items(&items, ids)),
        _ => Err(DecodeError::NotAnArray),
    }
}

pub fn encode_collection(bars: &[BarRecord]) -> serde_json::Result<String> {
    serde_json::to_string(bars)
}

fn decode_items(items: &[Value], ids: &impl IdGenerator) -> Vec<BarRecord> {
    let mut seen = HashSet::new();
    let mut bars = Vec::with_capacity(items.len());

    for item in items {
        let mut bar = BarRecord::decode(item, ids);
        if !bar.has_text() {
            continue;
        }
        // Repeated ids would make edits ambiguous
        if !seen.insert(bar.id.clone()) {
            bar.id = ids.next_id();
            seen.insert(bar.id.clone());
        }
        bars.push(bar);
    }

    bars
}

fn string_field(raw: &Value, name: &str) -> Option<String> {
    raw.get(name)?.as_str().map(str::to_owned)
}

fn bool_field(raw: &Value, name: &str) -> Option<bool> {
    raw.get(name)?.as_bool()
}

/// RFC 3339 instants, zone-less `datetime-local` values and bare dates.
/// Values without an offset are read as UTC.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// ISO 8601 with millisecond precision, e.g. `2024-01-02T09:00:00.000Z`.
pub fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ids::SequentialIds;
    use serde_json::json;

    fn instant(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    #[test]
    fn decode_applies_defaults_for_missing_fields() {
        let ids = SequentialIds::new("gen");
        let bar = BarRecord::decode(&json!({ "text": "Hello" }), &ids);

        assert_eq!(bar.id, "gen-1");
        assert_eq!(bar.text, "Hello");
        assert_eq!(bar.background_color, "#000000");
        assert_eq!(bar.text_color, "#ffffff");
        assert_eq!(bar.start_date, None);
        assert_eq!(bar.end_date, None);
        assert!(bar.enabled);
        assert!(bar.dismissible);
        assert_eq!(bar.updated_at, None);
    }

    #[test]
    fn decode_replaces_wrong_typed_fields() {
        let ids = SequentialIds::new("gen");
        let bar = BarRecord::decode(
            &json!({
                "id": 42,
                "text": ["nope"],
                "backgroundColor": false,
                "textColor": 7,
                "startDate": 1700000000,
                "endDate": "not a date",
                "enabled": "yes",
                "dismissible": null,
                "extra": "dropped"
            }),
            &ids,
        );

        assert_eq!(bar.id, "gen-1");
        assert_eq!(bar.text, "");
        assert_eq!(bar.background_color, DEFAULT_BACKGROUND_COLOR);
        assert_eq!(bar.text_color, DEFAULT_TEXT_COLOR);
        assert_eq!(bar.start_date, None);
        assert_eq!(bar.end_date.as_deref(), Some("not a date"));
        assert_eq!(bar.window(), None);
        assert!(bar.enabled);
        assert!(bar.dismissible);
    }

    #[test]
    fn decode_keeps_well_typed_fields() {
        let ids = SequentialIds::new("gen");
        let bar = BarRecord::decode(
            &json!({
                "id": "abc",
                "text": "  Sale  ",
                "backgroundColor": "red",
                "textColor": "#123456",
                "startDate": "2024-01-01T00:00:00.000Z",
                "endDate": "2024-01-31T00:00:00Z",
                "enabled": false,
                "dismissible": false,
                "updatedAt": "2024-01-02T10:00:00Z"
            }),
            &ids,
        );

        assert_eq!(bar.id, "abc");
        assert_eq!(bar.text, "  Sale  ");
        assert_eq!(bar.background_color, "red");
        assert_eq!(bar.text_color, "#123456");
        assert_eq!(bar.start_date.as_deref(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(bar.end_date.as_deref(), Some("2024-01-31T00:00:00Z"));
        assert!(!bar.enabled);
        assert!(!bar.dismissible);
        assert_eq!(bar.updated_at.as_deref(), Some("2024-01-02T10:00:00Z"));
        assert_eq!(
            bar.window(),
            Some((instant("2024-01-01T00:00:00Z"), instant("2024-01-31T00:00:00Z")))
        );
    }

    #[test]
    fn stored_date_strings_survive_a_rewrite() {
        let ids = SequentialIds::new("gen");
        let raw = json!([
            {
                "id": "a",
                "text": "Sale",
                "startDate": "2024-01-01",
                "endDate": "2024-01-31T00:00:00Z"
            },
            { "id": "b", "text": "Odd date", "startDate": "next tuesday", "endDate": "" }
        ])
        .to_string();

        let bars = decode_collection(Some(&raw), &ids);
        let encoded = encode_collection(&bars).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(value[0]["startDate"], "2024-01-01");
        assert_eq!(value[0]["endDate"], "2024-01-31T00:00:00Z");
        assert_eq!(value[1]["startDate"], "next tuesday");
        assert_eq!(value[1]["endDate"], "");
        assert_eq!(
            bars[0].window(),
            Some((instant("2024-01-01T00:00:00Z"), instant("2024-01-31T00:00:00Z")))
        );
        assert!(!bars[1].has_dates());
    }

    #[test]
    fn decode_collection_never_fails_on_garbage() {
        let ids = SequentialIds::new("gen");
        for raw in [
            "",
            "   ",
            "garbage",
            "[{\"text\": \"trunc",
            "{\"text\": \"object\"}",
            "42",
            "null",
            "\"[]\"",
        ] {
            assert!(decode_collection(Some(raw), &ids).is_empty(), "input {raw:?}");
        }
        assert!(decode_collection(None, &ids).is_empty());
    }

    #[test]
    fn decode_collection_drops_blank_text() {
        let ids = SequentialIds::new("gen");
        let raw = json!([
            { "id": "a", "text": "Keep me" },
            { "id": "b", "text": "   " },
            { "id": "c" },
            "not an object",
            { "id": "d", "text": "Also kept" }
        ])
        .to_string();

        let bars = decode_collection(Some(&raw), &ids);
        let kept: Vec<&str> = bars.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(kept, ["a", "d"]);
        assert!(bars.iter().all(BarRecord::has_text));
    }

    #[test]
    fn decode_collection_makes_ids_unique() {
        let ids = SequentialIds::new("gen");
        let raw = json!([
            { "id": "same", "text": "first" },
            { "id": "same", "text": "second" }
        ])
        .to_string();

        let bars = decode_collection(Some(&raw), &ids);
        assert_eq!(bars[0].id, "same");
        assert_eq!(bars[1].id, "gen-1");
    }

    #[test]
    fn collection_round_trips_through_encoding() {
        let ids = SequentialIds::new("gen");
        let raw = json!([
            {
                "id": "a",
                "text": "Sale ends soon",
                "backgroundColor": "#ff0000",
                "textColor": "#ffffff",
                "startDate": "2024-01-01T00:00:00Z",
                "endDate": "2024-01-31T00:00:00Z",
                "enabled": true,
                "dismissible": false,
                "updatedAt": "2023-12-31T12:00:00Z"
            },
            { "id": "b", "text": "Legacy bar without stamp" }
        ])
        .to_string();

        let bars = decode_collection(Some(&raw), &ids);
        let encoded = encode_collection(&bars).unwrap();
        assert_eq!(decode_collection(Some(&encoded), &ids), bars);

        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value[0]["startDate"], "2024-01-01T00:00:00Z");
        assert!(value[1].get("updatedAt").is_none());
        assert_eq!(value[1]["startDate"], Value::Null);
    }

    #[test]
    fn parse_submission_rejects_non_arrays() {
        let ids = SequentialIds::new("gen");
        assert!(matches!(
            parse_submission("{}", &ids),
            Err(DecodeError::NotAnArray)
        ));
        assert!(matches!(
            parse_submission("[{", &ids),
            Err(DecodeError::Malformed(_))
        ));
        let bars = parse_submission(r#"[{"text":"ok"},{"text":""}]"#, &ids).unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn parse_instant_accepts_datetime_local_values() {
        assert_eq!(
            parse_instant("2024-03-05T08:30"),
            Some(instant("2024-03-05T08:30:00Z"))
        );
        assert_eq!(
            parse_instant("2024-03-05T10:30:00+02:00"),
            Some(instant("2024-03-05T08:30:00Z"))
        );
        assert_eq!(parse_instant("2024-03-05"), Some(instant("2024-03-05T00:00:00Z")));
        assert_eq!(parse_instant("yesterday"), None);
    }

    #[test]
    fn format_instant_uses_milliseconds() {
        assert_eq!(
            format_instant(instant("2024-01-02T09:00:00Z")),
            "2024-01-02T09:00:00.000Z"
        );
    }
}
