//! Conversions between Rust types and [`RichValue`].
//!
//! These play the part that `Serialize`/`Deserialize` play for plain JSON, for the handful of
//! types that have a natural rich-value form.  Arbitrary serde types can still be passed through
//! as plain JSON with the `Json` wrapper in [`crate::handler`].
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::{BigInt, RichValue};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    #[error("Expected {expected}, found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Value {value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("Parameter {position}: {source}")]
    Param {
        position: usize,
        source: Box<ConversionError>,
    },
}

impl ConversionError {
    fn mismatch(expected: &'static str, found: &RichValue) -> Self {
        ConversionError::Mismatch {
            expected,
            found: found.kind(),
        }
    }

    pub(crate) fn at_param(self, position: usize) -> Self {
        ConversionError::Param {
            position,
            source: Box::new(self),
        }
    }
}

pub trait IntoRichValue {
    fn into_rich_value(self) -> RichValue;

    /// The value when passed as a positional call parameter.  Only differs for `Option`, where a
    /// missing value is `undefined` so that it reads as an omitted argument.
    fn into_param(self) -> RichValue
    where
        Self: Sized,
    {
        self.into_rich_value()
    }
}

pub trait FromRichValue: Sized {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError>;
}

impl IntoRichValue for RichValue {
    fn into_rich_value(self) -> RichValue {
        self
    }
}

impl FromRichValue for RichValue {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl IntoRichValue for JsonValue {
    fn into_rich_value(self) -> RichValue {
        RichValue::from(self)
    }
}

/// Lossy: anything JSON can't represent is replaced by its wire form.
impl FromRichValue for JsonValue {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        Ok(value.to_plain_json())
    }
}

impl IntoRichValue for () {
    fn into_rich_value(self) -> RichValue {
        RichValue::Undefined
    }
}

impl FromRichValue for () {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::Undefined | RichValue::Null => Ok(()),
            other => Err(ConversionError::mismatch("undefined", &other)),
        }
    }
}

impl IntoRichValue for String {
    fn into_rich_value(self) -> RichValue {
        RichValue::String(self)
    }
}

impl IntoRichValue for &str {
    fn into_rich_value(self) -> RichValue {
        RichValue::String(self.to_string())
    }
}

impl FromRichValue for String {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::String(s) => Ok(s),
            other => Err(ConversionError::mismatch("string", &other)),
        }
    }
}

impl IntoRichValue for bool {
    fn into_rich_value(self) -> RichValue {
        RichValue::Bool(self)
    }
}

impl FromRichValue for bool {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::Bool(b) => Ok(b),
            other => Err(ConversionError::mismatch("boolean", &other)),
        }
    }
}

/// JavaScript has only one number type, so a whole number may arrive in float form (`3.0`).
/// That is accepted as long as it converts exactly.
macro_rules! rich_value_int {
    ($($ty:ty),*) => {
        $(
            impl IntoRichValue for $ty {
                fn into_rich_value(self) -> RichValue {
                    RichValue::Number(self.into())
                }
            }

            impl FromRichValue for $ty {
                fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
                    let out_of_range = |value: String| ConversionError::OutOfRange {
                        value,
                        target: stringify!($ty),
                    };

                    match value {
                        RichValue::Number(number) => {
                            if let Some(n) = number.as_i64() {
                                <$ty>::try_from(n).map_err(|_| out_of_range(number.to_string()))
                            } else if let Some(n) = number.as_u64() {
                                <$ty>::try_from(n).map_err(|_| out_of_range(number.to_string()))
                            } else {
                                match number.as_f64() {
                                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                                        <$ty>::try_from(f as i64).map_err(|_| out_of_range(number.to_string()))
                                    }
                                    _ => Err(out_of_range(number.to_string())),
                                }
                            }
                        }
                        RichValue::BigInt(bigint) => i128::try_from(&bigint)
                            .ok()
                            .and_then(|n| <$ty>::try_from(n).ok())
                            .ok_or_else(|| out_of_range(bigint.to_string())),
                        other => Err(ConversionError::mismatch("number", &other)),
                    }
                }
            }
        )*
    };
}

rich_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl IntoRichValue for f64 {
    fn into_rich_value(self) -> RichValue {
        RichValue::from_f64(self)
    }
}

impl FromRichValue for f64 {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::Number(number) => number.as_f64().ok_or_else(|| ConversionError::OutOfRange {
                value: number.to_string(),
                target: "f64",
            }),
            RichValue::NonFinite(non_finite) => Ok(non_finite.as_f64()),
            other => Err(ConversionError::mismatch("number", &other)),
        }
    }
}

impl IntoRichValue for f32 {
    fn into_rich_value(self) -> RichValue {
        RichValue::from_f64(f64::from(self))
    }
}

impl FromRichValue for f32 {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        f64::from_rich_value(value).map(|f| f as f32)
    }
}

impl IntoRichValue for DateTime<Utc> {
    fn into_rich_value(self) -> RichValue {
        RichValue::date(self)
    }
}

impl FromRichValue for DateTime<Utc> {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::Date(date) => Ok(date),
            other => Err(ConversionError::mismatch("Date", &other)),
        }
    }
}

impl IntoRichValue for BigInt {
    fn into_rich_value(self) -> RichValue {
        RichValue::BigInt(self)
    }
}

impl FromRichValue for BigInt {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::BigInt(bigint) => Ok(bigint),
            RichValue::Number(number) => match (number.as_i64(), number.as_u64()) {
                (Some(n), _) => Ok(n.into()),
                (None, Some(n)) => Ok(n.into()),
                _ => Err(ConversionError::OutOfRange {
                    value: number.to_string(),
                    target: "bigint",
                }),
            },
            other => Err(ConversionError::mismatch("bigint", &other)),
        }
    }
}

/// `None` becomes `null`; both `null` and `undefined` convert back to `None`.
impl<T: IntoRichValue> IntoRichValue for Option<T> {
    fn into_rich_value(self) -> RichValue {
        match self {
            Some(value) => value.into_rich_value(),
            None => RichValue::Null,
        }
    }

    fn into_param(self) -> RichValue {
        match self {
            Some(value) => value.into_rich_value(),
            None => RichValue::Undefined,
        }
    }
}

impl<T: FromRichValue> FromRichValue for Option<T> {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::Undefined | RichValue::Null => Ok(None),
            other => T::from_rich_value(other).map(Some),
        }
    }
}

impl<T: IntoRichValue> IntoRichValue for Vec<T> {
    fn into_rich_value(self) -> RichValue {
        RichValue::Array(self.into_iter().map(IntoRichValue::into_rich_value).collect())
    }
}

impl<T: FromRichValue> FromRichValue for Vec<T> {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::Array(items) | RichValue::Set(items) => items.into_iter().map(T::from_rich_value).collect(),
            other => Err(ConversionError::mismatch("array", &other)),
        }
    }
}

impl<T: IntoRichValue> IntoRichValue for BTreeSet<T> {
    fn into_rich_value(self) -> RichValue {
        RichValue::Set(self.into_iter().map(IntoRichValue::into_rich_value).collect())
    }
}

impl<T: FromRichValue + Ord> FromRichValue for BTreeSet<T> {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::Set(items) | RichValue::Array(items) => items.into_iter().map(T::from_rich_value).collect(),
            other => Err(ConversionError::mismatch("Set", &other)),
        }
    }
}

impl<T: IntoRichValue> IntoRichValue for HashSet<T> {
    fn into_rich_value(self) -> RichValue {
        RichValue::Set(self.into_iter().map(IntoRichValue::into_rich_value).collect())
    }
}

impl<T: FromRichValue + Eq + Hash> FromRichValue for HashSet<T> {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        match value {
            RichValue::Set(items) | RichValue::Array(items) => items.into_iter().map(T::from_rich_value).collect(),
            other => Err(ConversionError::mismatch("Set", &other)),
        }
    }
}

fn map_entries<K, V>(value: RichValue) -> Result<Vec<(K, V)>, ConversionError>
where
    K: FromRichValue,
    V: FromRichValue,
{
    match value {
        RichValue::Map(entries) => entries
            .into_iter()
            .map(|(key, value)| Ok((K::from_rich_value(key)?, V::from_rich_value(value)?)))
            .collect(),
        // A plain object is a map with string keys
        RichValue::Object(fields) => fields
            .into_iter()
            .map(|(key, value)| {
                Ok((
                    K::from_rich_value(RichValue::String(key))?,
                    V::from_rich_value(value)?,
                ))
            })
            .collect(),
        other => Err(ConversionError::mismatch("Map", &other)),
    }
}

impl<K: IntoRichValue, V: IntoRichValue> IntoRichValue for BTreeMap<K, V> {
    fn into_rich_value(self) -> RichValue {
        RichValue::Map(
            self.into_iter()
                .map(|(key, value)| (key.into_rich_value(), value.into_rich_value()))
                .collect(),
        )
    }
}

impl<K: FromRichValue + Ord, V: FromRichValue> FromRichValue for BTreeMap<K, V> {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        map_entries(value).map(|entries| entries.into_iter().collect())
    }
}

impl<K: IntoRichValue, V: IntoRichValue> IntoRichValue for HashMap<K, V> {
    fn into_rich_value(self) -> RichValue {
        RichValue::Map(
            self.into_iter()
                .map(|(key, value)| (key.into_rich_value(), value.into_rich_value()))
                .collect(),
        )
    }
}

impl<K: FromRichValue + Eq + Hash, V: FromRichValue> FromRichValue for HashMap<K, V> {
    fn from_rich_value(value: RichValue) -> Result<Self, ConversionError> {
        map_entries(value).map(|entries| entries.into_iter().collect())
    }
}
