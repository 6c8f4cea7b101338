//! Explicit JSON encode/decode helpers shared by the persisted learning types.
//!
//! Counts are stored as JSON integers, scores as floats, timestamps as RFC 3339 strings.
//! A missing field decodes to its empty value; a field with the wrong shape is an error.

use std::collections::HashMap;
use std::hash::Hash;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub type CountMap = HashMap<String, u64>;
pub type NestedCountMap<K> = HashMap<K, CountMap>;

pub type DecodeResult<T> = std::result::Result<T, String>;

pub fn as_object<'a>(value: &'a Value, what: &str) -> DecodeResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| format!("{what}: expected object"))
}

pub fn encode_counts(map: &CountMap) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect(),
    )
}

pub fn encode_nested<K: ToString>(map: &NestedCountMap<K>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, inner)| (k.to_string(), encode_counts(inner)))
            .collect(),
    )
}

pub fn encode_keyed_counts<K: ToString>(map: &HashMap<K, u64>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect(),
    )
}

pub fn encode_scores(map: &HashMap<String, f64>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect(),
    )
}

pub fn encode_timestamps(map: &HashMap<String, DateTime<Utc>>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::from(encode_time(v))))
            .collect(),
    )
}

pub fn encode_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Persisted timestamps carry millisecond precision; truncate before storing in state.
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

pub fn decode_time(raw: &str, what: &str) -> DecodeResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("{what}: bad timestamp {raw:?}: {e}"))
}

pub fn decode_counts(value: Option<&Value>, what: &str) -> DecodeResult<CountMap> {
    let Some(value) = value else {
        return Ok(HashMap::new());
    };
    let obj = as_object(value, what)?;
    let mut out = HashMap::with_capacity(obj.len());
    for (k, v) in obj {
        let count = v
            .as_u64()
            .ok_or_else(|| format!("{what}.{k}: expected non-negative integer"))?;
        out.insert(k.clone(), count);
    }
    Ok(out)
}

pub fn decode_nested<K>(value: Option<&Value>, what: &str) -> DecodeResult<NestedCountMap<K>>
where
    K: FromStr + Eq + Hash,
{
    let Some(value) = value else {
        return Ok(HashMap::new());
    };
    let obj = as_object(value, what)?;
    let mut out = HashMap::with_capacity(obj.len());
    for (k, inner) in obj {
        let key = k
            .parse::<K>()
            .map_err(|_| format!("{what}: bad key {k:?}"))?;
        out.insert(key, decode_counts(Some(inner), what)?);
    }
    Ok(out)
}

pub fn decode_keyed_counts<K>(value: Option<&Value>, what: &str) -> DecodeResult<HashMap<K, u64>>
where
    K: FromStr + Eq + Hash,
{
    let counts = decode_counts(value, what)?;
    counts
        .into_iter()
        .map(|(k, v)| {
            k.parse::<K>()
                .map(|key| (key, v))
                .map_err(|_| format!("{what}: bad key {k:?}"))
        })
        .collect()
}

pub fn decode_scores(value: Option<&Value>, what: &str) -> DecodeResult<HashMap<String, f64>> {
    let Some(value) = value else {
        return Ok(HashMap::new());
    };
    let obj = as_object(value, what)?;
    let mut out = HashMap::with_capacity(obj.len());
    for (k, v) in obj {
        let score = v
            .as_f64()
            .ok_or_else(|| format!("{what}.{k}: expected number"))?;
        out.insert(k.clone(), score);
    }
    Ok(out)
}

pub fn decode_timestamps(
    value: Option<&Value>,
    what: &str,
) -> DecodeResult<HashMap<String, DateTime<Utc>>> {
    let Some(value) = value else {
        return Ok(HashMap::new());
    };
    let obj = as_object(value, what)?;
    let mut out = HashMap::with_capacity(obj.len());
    for (k, v) in obj {
        let raw = v
            .as_str()
            .ok_or_else(|| format!("{what}.{k}: expected timestamp string"))?;
        out.insert(k.clone(), decode_time(raw, what)?);
    }
    Ok(out)
}

pub fn get_u64(obj: &Map<String, Value>, key: &str) -> DecodeResult<u64> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| format!("{key}: expected non-negative integer")),
    }
}

pub fn get_f64(obj: &Map<String, Value>, key: &str, default: f64) -> DecodeResult<f64> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_f64().ok_or_else(|| format!("{key}: expected number")),
    }
}

pub fn get_bool(obj: &Map<String, Value>, key: &str, default: bool) -> DecodeResult<bool> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| format!("{key}: expected boolean")),
    }
}

pub fn get_time(obj: &Map<String, Value>, key: &str) -> DecodeResult<Option<DateTime<Utc>>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => decode_time(raw, key).map(Some),
        Some(_) => Err(format!("{key}: expected timestamp string")),
    }
}

/// Increment `map[key]`, inserting the entry first when absent.
pub fn bump(map: &mut CountMap, key: &str) {
    if let Some(count) = map.get_mut(key) {
        *count = count.saturating_add(1);
    } else {
        map.insert(key.to_string(), 1);
    }
}

pub fn bump_nested<K: Eq + Hash>(map: &mut NestedCountMap<K>, outer: K, inner: &str) {
    bump(map.entry(outer).or_default(), inner);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_round_trip() {
        let mut map = CountMap::new();
        bump(&mut map, "abandon");
        bump(&mut map, "abandon");
        bump(&mut map, "zoo");
        let restored = decode_counts(Some(&encode_counts(&map)), "t").unwrap();
        assert_eq!(map, restored);
    }

    #[test]
    fn test_negative_count_rejected() {
        let value = serde_json::json!({ "abandon": -1 });
        assert!(decode_counts(Some(&value), "t").is_err());
    }

    #[test]
    fn test_nested_usize_keys() {
        let mut map: NestedCountMap<usize> = HashMap::new();
        bump_nested(&mut map, 3, "able");
        let restored: NestedCountMap<usize> =
            decode_nested(Some(&encode_nested(&map)), "t").unwrap();
        assert_eq!(restored.get(&3).and_then(|m| m.get("able")), Some(&1));
    }

    #[test]
    fn test_time_round_trip_keeps_millis() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(decode_time(&encode_time(&ts), "t").unwrap(), ts);
    }
}
