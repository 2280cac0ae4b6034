//! Turns a Sopbilen search response into fractions and the earliest pickup.

use chrono::format::{self, Parsed, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::{debug, error};

use sopbilen_core::model::{Fraction, ParseResult};

const EXECUTION_DATE: &str = "ExecutionDate";
const WEEKDAY: &str = "Weekday";
const FETCH_FREQUENCY: &str = "FetchFrequency";

// ISO-8601 date-times with a UTC offset; `%z` takes the offset with or without a colon.
const ISO_OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%z",
];
// ISO-8601 date-times without offset, with `T` or a space between date and time.
const ISO_LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];
// Hour-only times; the minute is filled in as zero.
const ISO_HOUR_FORMATS: [&str; 2] = ["%Y-%m-%dT%H", "%Y-%m-%d %H"];
const ISO_BASIC_DATE_FORMAT: &str = "%Y%m%d";
const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The service answers with either an object keyed by fraction name or a plain list.
enum TopLevel<'a> {
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
    Other(&'a Value),
}

impl<'a> From<&'a Value> for TopLevel<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => TopLevel::Object(map),
            Value::Array(items) => TopLevel::Array(items),
            other => TopLevel::Other(other),
        }
    }
}

/// Extract each category's first entry and the minimum parseable execution date.
///
/// Unexpected shapes never fail the whole document: a category whose first
/// entry is not a record is skipped, a date that cannot be parsed only keeps
/// that category out of the minimum.
#[must_use]
pub fn parse_document(document: &Value) -> ParseResult {
    let categories: Vec<(String, &Value)> = match TopLevel::from(document) {
        TopLevel::Object(map) => map
            .iter()
            .map(|(name, entries)| (name.clone(), entries))
            .collect(),
        TopLevel::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, entries)| (index.to_string(), entries))
            .collect(),
        TopLevel::Other(value) => {
            error!(kind = json_kind(value), "Unexpected JSON top-level type");
            return ParseResult::default();
        }
    };

    let mut result = ParseResult::default();
    let mut earliest: Option<NaiveDateTime> = None;

    for (name, entries) in categories {
        let Some(record) = entries
            .as_array()
            .and_then(|list| list.first())
            .and_then(Value::as_object)
        else {
            continue;
        };

        let fraction = Fraction {
            execution_date: record.get(EXECUTION_DATE).and_then(date_text),
            weekday: passthrough(record.get(WEEKDAY)),
            frequency: passthrough(record.get(FETCH_FREQUENCY)),
        };

        if let Some(raw) = fraction.execution_date.as_deref().filter(|raw| !raw.is_empty()) {
            match parse_execution_date(raw) {
                Some(parsed) => {
                    earliest = Some(earliest.map_or(parsed, |current| current.min(parsed)));
                }
                None => debug!(fraction = %name, raw, "Could not parse ExecutionDate"),
            }
        }

        result.fractions.insert(name, fraction);
    }

    result.earliest_date = earliest.map(|moment| moment.date());
    result
}

/// Parse an execution date: ISO-8601 first, then `YYYY-MM-DD`, then `YYYY-MM-DD HH:MM:SS`.
///
/// The ISO-8601 step takes offsets with or without a colon, minute or hour
/// precision times, and the basic `YYYYMMDD` date.
///
/// Offsets are dropped; the local wall-clock time is kept.
#[must_use]
pub fn parse_execution_date(raw: &str) -> Option<NaiveDateTime> {
    parse_iso8601(raw)
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .or_else(|| NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT).ok())
}

fn parse_iso8601(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_local());
    }
    ISO_OFFSET_FORMATS
        .iter()
        .find_map(|pattern| DateTime::parse_from_str(raw, pattern).ok())
        .map(|with_offset| with_offset.naive_local())
        .or_else(|| {
            ISO_LOCAL_FORMATS
                .iter()
                .find_map(|pattern| NaiveDateTime::parse_from_str(raw, pattern).ok())
        })
        .or_else(|| ISO_HOUR_FORMATS.iter().find_map(|pattern| parse_hour_only(raw, pattern)))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, ISO_BASIC_DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn parse_hour_only(raw: &str, pattern: &str) -> Option<NaiveDateTime> {
    let mut parsed = Parsed::default();
    format::parse(&mut parsed, raw, StrftimeItems::new(pattern)).ok()?;
    parsed.set_minute(0).ok()?;
    parsed.to_naive_datetime_with_offset(0).ok()
}

// Strings are kept as-is, other scalars by their JSON text so they still show up.
fn date_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn passthrough(value: Option<&Value>) -> Option<Value> {
    value.filter(|inner| !inner.is_null()).cloned()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, month, day)
    }

    #[test]
    fn empty_object_and_array_yield_nothing() {
        for document in [json!({}), json!([])] {
            let result = parse_document(&document);

            assert!(result.is_empty());
            assert_eq!(result.earliest_date, None);
        }
    }

    #[test]
    fn scalar_top_level_yields_nothing() {
        for document in [json!("oops"), json!(42), json!(null)] {
            assert_eq!(parse_document(&document), ParseResult::default());
        }
    }

    #[test]
    fn earliest_date_across_fractions() {
        let document = json!({
            "paper": [{"ExecutionDate": "2024-03-10", "Weekday": "Sun", "FetchFrequency": "2w"}],
            "food": [{"ExecutionDate": "2024-03-05"}],
        });

        let result = parse_document(&document);

        assert_eq!(result.earliest_date, date(2024, 3, 5));
        assert_eq!(result.fractions.len(), 2);
        let paper = result.fractions.get("paper").expect("paper fraction");
        assert_eq!(paper.execution_date.as_deref(), Some("2024-03-10"));
        assert_eq!(paper.weekday, Some(json!("Sun")));
        assert_eq!(paper.frequency, Some(json!("2w")));
    }

    #[test]
    fn order_of_categories_does_not_matter() {
        let forward = json!([
            [{"ExecutionDate": "2024-05-01"}],
            [{"ExecutionDate": "2024-04-01T06:30:00"}],
            [{"ExecutionDate": "2024-06-01 07:00:00"}],
        ]);
        let backward = json!([
            [{"ExecutionDate": "2024-06-01 07:00:00"}],
            [{"ExecutionDate": "2024-04-01T06:30:00"}],
            [{"ExecutionDate": "2024-05-01"}],
        ]);

        assert_eq!(parse_document(&forward).earliest_date, date(2024, 4, 1));
        assert_eq!(parse_document(&backward).earliest_date, date(2024, 4, 1));
    }

    #[test]
    fn array_categories_are_keyed_by_index() {
        let document = json!([[{"ExecutionDate": "2024-03-05"}], [], [{"Weekday": 3}]]);

        let result = parse_document(&document);

        let names: Vec<&str> = result.fractions.keys().map(String::as_str).collect();
        assert_eq!(names, ["0", "2"]);
        assert_eq!(result.fractions.get("2").and_then(|fraction| fraction.weekday.clone()), Some(json!(3)));
    }

    #[test]
    fn missing_date_is_kept_but_excluded() {
        let document = json!({
            "garden": [{"Weekday": "Mon"}],
            "food": [{"ExecutionDate": "2024-03-05"}],
        });

        let result = parse_document(&document);

        let garden = result.fractions.get("garden").expect("garden fraction");
        assert_eq!(garden.execution_date, None);
        assert_eq!(result.earliest_date, date(2024, 3, 5));
    }

    #[test]
    fn unparseable_date_is_kept_but_excluded() {
        let document = json!({
            "paper": [{"ExecutionDate": "tomorrow"}],
            "food": [{"ExecutionDate": "2024-03-05"}],
        });

        let result = parse_document(&document);

        assert_eq!(
            result.fractions.get("paper").and_then(|fraction| fraction.execution_date.as_deref()),
            Some("tomorrow")
        );
        assert_eq!(result.earliest_date, date(2024, 3, 5));
    }

    #[test]
    fn only_unparseable_dates_leave_earliest_empty() {
        let document = json!({"paper": [{"ExecutionDate": "tomorrow"}], "glass": [{"ExecutionDate": ""}]});

        let result = parse_document(&document);

        assert_eq!(result.fractions.len(), 2);
        assert_eq!(result.earliest_date, None);
    }

    #[test]
    fn non_record_and_non_list_categories_are_skipped() {
        let document = json!({
            "text": "2024-03-01",
            "empty": [],
            "numbers": [1, 2],
            "food": [{"ExecutionDate": "2024-03-05"}, {"ExecutionDate": "2024-03-01"}],
        });

        let result = parse_document(&document);

        let names: Vec<&str> = result.fractions.keys().map(String::as_str).collect();
        assert_eq!(names, ["food"]);
        // only the first entry of a list counts
        assert_eq!(result.earliest_date, date(2024, 3, 5));
    }

    #[test]
    fn execution_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).and_then(|day| day.and_hms_opt(6, 0, 0));

        assert_eq!(parse_execution_date("2024-03-05T06:00:00"), expected);
        assert_eq!(parse_execution_date("2024-03-05T06:00:00+01:00"), expected);
        assert_eq!(parse_execution_date("2024-03-05T06:00"), expected);
        assert_eq!(parse_execution_date("2024-03-05 06:00:00"), expected);
        assert_eq!(
            parse_execution_date("2024-03-05").map(|moment| moment.date()),
            date(2024, 3, 5)
        );
        assert_eq!(
            parse_execution_date("2024-03-05T07:00:00.250-01:00").map(|moment| moment.date()),
            date(2024, 3, 5)
        );
        assert_eq!(parse_execution_date("2024-03-05T06:00:00Z"), expected);
        assert_eq!(parse_execution_date("tomorrow"), None);
        assert_eq!(parse_execution_date("05/03/2024"), None);
    }

    #[test]
    fn iso_offsets_keep_local_wall_clock() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).and_then(|day| day.and_hms_opt(6, 0, 0));

        for raw in [
            "2024-03-05T06:00+01:00",
            "2024-03-05T06:00:00+0100",
            "2024-03-05T06:00+0100",
            "2024-03-05 06:00+01:00",
            "2024-03-05 06:00:00-0500",
        ] {
            assert_eq!(parse_execution_date(raw), expected, "{raw}");
        }
    }

    #[test]
    fn iso_basic_date_and_hour_only_time() {
        assert_eq!(
            parse_execution_date("20240305"),
            NaiveDate::from_ymd_opt(2024, 3, 5).and_then(|day| day.and_hms_opt(0, 0, 0))
        );
        assert_eq!(
            parse_execution_date("2024-03-05T06"),
            NaiveDate::from_ymd_opt(2024, 3, 5).and_then(|day| day.and_hms_opt(6, 0, 0))
        );
        assert_eq!(parse_execution_date("2024-03-05T25"), None);
        assert_eq!(parse_execution_date("2024030"), None);
    }

    #[test]
    fn iso_only_dates_still_count_towards_earliest() {
        let document = json!({
            "paper": [{"ExecutionDate": "2024-03-10T06:00+01:00"}],
            "food": [{"ExecutionDate": "20240307"}],
        });

        assert_eq!(parse_document(&document).earliest_date, date(2024, 3, 7));
    }

    #[test]
    fn fraction_mapping_survives_reencoding() {
        let body = r#"{
            "paper": [{"ExecutionDate": "2024-03-10", "Weekday": "Sun", "FetchFrequency": "2w"}],
            "food": [{"ExecutionDate": "2024-03-05", "Weekday": 2, "FetchFrequency": null}]
        }"#;
        let document: Value = serde_json::from_str(body).expect("valid body");
        let parsed = parse_document(&document);

        let encoded = serde_json::to_string(&parsed.fractions).expect("encode");
        let decoded: sopbilen_core::model::Fractions =
            serde_json::from_str(&encoded).expect("decode");

        assert_eq!(decoded, parsed.fractions);
        let food = decoded.get("food").expect("food fraction");
        assert_eq!(food.execution_date.as_deref(), Some("2024-03-05"));
        assert_eq!(food.weekday, Some(json!(2)));
        assert_eq!(food.frequency, None);
    }
}
