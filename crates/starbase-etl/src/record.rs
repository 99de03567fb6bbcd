//! Tolerant accessors over loosely-shaped JSON records.
//!
//! Source records omit keys freely, use `null` for "unknown" and spell the
//! same list differently across endpoints. Every accessor here returns
//! `None` (or an empty slice) rather than failing.

use chrono::NaiveDate;
use serde_json::Value;

/// A non-blank string field.
pub fn text<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// An integer field, also accepting all-digit strings such as `"2381"`.
pub fn integer(record: &Value, key: &str) -> Option<i64> {
    match record.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// A boolean flag; anything but `true` is false.
pub fn flag(record: &Value, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// An ISO `YYYY-MM-DD` date field.
pub fn date(record: &Value, key: &str) -> Option<NaiveDate> {
    text(record, key).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

/// The `name` of a nested object, e.g. `homeworld.name`.
pub fn nested_name<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record.get(key).and_then(|v| text(v, "name"))
}

/// The first list found under any of `keys`.
pub fn list<'a>(record: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|k| record.get(*k).and_then(Value::as_array))
        .map_or(&[], Vec::as_slice)
}

/// The `name` of the first entry of a list, e.g. `occupations[0].name`.
pub fn first_name_in<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    list(record, &[key]).iter().find_map(|v| text(v, "name"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_and_null_keys() {
        let record = json!({"name": "Odo", "gender": null, "homeworld": null, "blank": "  "});
        assert_eq!(text(&record, "name"), Some("Odo"));
        assert_eq!(text(&record, "gender"), None);
        assert_eq!(text(&record, "blank"), None);
        assert_eq!(nested_name(&record, "homeworld"), None);
        assert!(list(&record, &["performers"]).is_empty());
        assert!(!flag(&record, "missing"));
    }

    #[test]
    fn test_integer_accepts_digit_strings_only() {
        let record = json!({"a": 2381, "b": "2381", "c": "29th century", "d": 1.5});
        assert_eq!(integer(&record, "a"), Some(2381));
        assert_eq!(integer(&record, "b"), Some(2381));
        assert_eq!(integer(&record, "c"), None);
        assert_eq!(integer(&record, "d"), None);
    }

    #[test]
    fn test_list_takes_first_present_key() {
        let record = json!({"organizations": [{"name": "Starfleet"}]});
        let orgs = list(&record, &["characterOrganizations", "organizations"]);
        assert_eq!(orgs.len(), 1);
        assert_eq!(first_name_in(&record, "organizations"), Some("Starfleet"));
    }

    #[test]
    fn test_date() {
        let record = json!({"birthDate": "1949-07-13", "bad": "July 1949"});
        assert_eq!(
            date(&record, "birthDate"),
            NaiveDate::from_ymd_opt(1949, 7, 13)
        );
        assert_eq!(date(&record, "bad"), None);
    }
}
