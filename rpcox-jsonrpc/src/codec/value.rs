use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde_json::Value as JsonValue;

use super::BigInt;

/// The non-finite floating point values, which JSON numbers cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonFinite {
    NaN,
    Infinity,
    NegInfinity,
}

impl NonFinite {
    /// Classify a float, returning `None` if it is finite.
    pub fn of(value: f64) -> Option<Self> {
        if value.is_nan() {
            Some(NonFinite::NaN)
        } else if value == f64::INFINITY {
            Some(NonFinite::Infinity)
        } else if value == f64::NEG_INFINITY {
            Some(NonFinite::NegInfinity)
        } else {
            None
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            NonFinite::NaN => f64::NAN,
            NonFinite::Infinity => f64::INFINITY,
            NonFinite::NegInfinity => f64::NEG_INFINITY,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            NonFinite::NaN => "NaN",
            NonFinite::Infinity => "Infinity",
            NonFinite::NegInfinity => "-Infinity",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "NaN" => Some(NonFinite::NaN),
            "Infinity" => Some(NonFinite::Infinity),
            "-Infinity" => Some(NonFinite::NegInfinity),
            _ => None,
        }
    }
}

/// A value that can be passed to or returned from a remote method.
///
/// This is a superset of JSON: in addition to the JSON types it can hold the values that a
/// JavaScript peer can pass which have no native JSON representation.  The codec in
/// [`crate::codec`] turns these into plain JSON plus metadata describing how to rebuild them.
///
/// `Set` and `Map` keep their insertion order, the way their JavaScript counterparts do.  Neither
/// enforces uniqueness; that is up to whoever builds them.
#[derive(Debug, Clone, PartialEq)]
pub enum RichValue {
    /// Explicit absence, distinct from `Null`
    Undefined,
    Null,
    Bool(bool),
    Number(serde_json::Number),
    NonFinite(NonFinite),
    String(String),
    Array(Vec<RichValue>),
    Object(BTreeMap<String, RichValue>),
    /// Timestamp with millisecond precision; anything finer is lost on the wire
    Date(DateTime<Utc>),
    Set(Vec<RichValue>),
    Map(Vec<(RichValue, RichValue)>),
    RegExp {
        source: String,
        flags: String,
    },
    Error {
        name: String,
        message: String,
    },
    BigInt(BigInt),
}

impl RichValue {
    /// A short name for the kind of value this is, for use in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RichValue::Undefined => "undefined",
            RichValue::Null => "null",
            RichValue::Bool(_) => "boolean",
            RichValue::Number(_) | RichValue::NonFinite(_) => "number",
            RichValue::String(_) => "string",
            RichValue::Array(_) => "array",
            RichValue::Object(_) => "object",
            RichValue::Date(_) => "Date",
            RichValue::Set(_) => "Set",
            RichValue::Map(_) => "Map",
            RichValue::RegExp { .. } => "RegExp",
            RichValue::Error { .. } => "Error",
            RichValue::BigInt(_) => "bigint",
        }
    }

    /// A number from a float, falling back to [`RichValue::NonFinite`] for NaN and the infinities.
    pub fn from_f64(value: f64) -> Self {
        match serde_json::Number::from_f64(value) {
            Some(number) => RichValue::Number(number),
            None => match NonFinite::of(value) {
                Some(non_finite) => RichValue::NonFinite(non_finite),
                None => RichValue::Null,
            },
        }
    }

    /// A date, truncated to the millisecond precision the wire format can carry.
    pub fn date(value: DateTime<Utc>) -> Self {
        RichValue::Date(value.trunc_subsecs(3))
    }

    /// A date from milliseconds since the Unix epoch, the way JavaScript counts time.
    pub fn date_from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(RichValue::Date)
    }

    pub fn regexp(source: impl Into<String>, flags: impl Into<String>) -> Self {
        RichValue::RegExp {
            source: source.into(),
            flags: flags.into(),
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        RichValue::Error {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, RichValue::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RichValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The JSON this value is written as on the wire, without the metadata needed to restore the
    /// types JSON lacks.
    pub fn to_plain_json(&self) -> JsonValue {
        super::encode(self).json
    }
}

/// Plain JSON is always a valid rich value
impl From<JsonValue> for RichValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => RichValue::Null,
            JsonValue::Bool(b) => RichValue::Bool(b),
            JsonValue::Number(number) => RichValue::Number(number),
            JsonValue::String(s) => RichValue::String(s),
            JsonValue::Array(items) => RichValue::Array(items.into_iter().map(RichValue::from).collect()),
            JsonValue::Object(map) => RichValue::Object(
                map.into_iter()
                    .map(|(key, value)| (key, RichValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for RichValue {
    fn from(value: &str) -> Self {
        RichValue::String(value.to_string())
    }
}

impl From<String> for RichValue {
    fn from(value: String) -> Self {
        RichValue::String(value)
    }
}

impl From<bool> for RichValue {
    fn from(value: bool) -> Self {
        RichValue::Bool(value)
    }
}

impl From<i64> for RichValue {
    fn from(value: i64) -> Self {
        RichValue::Number(value.into())
    }
}

impl From<f64> for RichValue {
    fn from(value: f64) -> Self {
        RichValue::from_f64(value)
    }
}

impl From<BigInt> for RichValue {
    fn from(value: BigInt) -> Self {
        RichValue::BigInt(value)
    }
}

impl From<DateTime<Utc>> for RichValue {
    fn from(value: DateTime<Utc>) -> Self {
        RichValue::date(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_conversion_is_structural() {
        let value = RichValue::from(json!({"a": [1, "two", null, true], "b": {}}));
        let expected = RichValue::Object(BTreeMap::from([
            (
                "a".to_string(),
                RichValue::Array(vec![
                    RichValue::from(1i64),
                    RichValue::from("two"),
                    RichValue::Null,
                    RichValue::Bool(true),
                ]),
            ),
            ("b".to_string(), RichValue::Object(BTreeMap::new())),
        ]));
        assert_eq!(value, expected);
    }

    #[test]
    fn floats_fall_back_to_non_finite() {
        assert_eq!(RichValue::from_f64(f64::NAN), RichValue::NonFinite(NonFinite::NaN));
        assert_eq!(
            RichValue::from_f64(f64::NEG_INFINITY),
            RichValue::NonFinite(NonFinite::NegInfinity)
        );
        assert_eq!(RichValue::from_f64(1.5).kind(), "number");
    }

    #[test]
    fn dates_are_truncated_to_millis() {
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let RichValue::Date(date) = RichValue::date(precise) else {
            panic!("expected a date");
        };
        assert_eq!(date.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(RichValue::date_from_millis(1_700_000_000_123), Some(RichValue::Date(date)));
    }
}
