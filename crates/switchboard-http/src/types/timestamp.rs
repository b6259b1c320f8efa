//! Lenient timestamp (de)serialization.
//!
//! The backend emits `created_at` either as unix seconds (integer or float)
//! or as an RFC 3339 string depending on the endpoint. Serialization always
//! writes RFC 3339.

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Int(i64),
    Float(f64),
    Text(String),
}

fn from_raw<E: de::Error>(raw: Raw) -> Result<DateTime<Utc>, E> {
    match raw {
        Raw::Int(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| E::custom(format!("timestamp out of range: {}", secs))),
        Raw::Float(secs) => {
            let millis = (secs * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| E::custom(format!("timestamp out of range: {}", secs)))
        }
        Raw::Text(text) => DateTime::parse_from_rfc3339(text.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| E::custom(format!("invalid timestamp {:?}: {}", text, e))),
    }
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    from_raw(Raw::deserialize(deserializer)?)
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            Some(raw) => from_raw(raw).map(Some),
            None => Ok(None),
        }
    }
}
