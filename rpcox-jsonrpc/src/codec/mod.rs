//! The rich-value codec.
//!
//! Values exchanged with a remote method may include things plain JSON cannot express: dates,
//! sets, maps, regular expressions, errors, big integers, `undefined`, and the non-finite numbers.
//! [`encode`] turns a [`RichValue`] into plain JSON plus an optional metadata object recording
//! which positions were transformed; [`decode`] reverses it.  The metadata format is the one the
//! `superjson` JavaScript library uses, so a browser peer can read and write it directly.
//!
//! When a value contains nothing JSON can't express, there is no metadata at all, and the JSON
//! is exactly what a plain serializer would produce.
mod annotations;
mod bigint;
mod convert;
mod value;

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use annotations::{Annotation, Tag, escape_key};

pub use bigint::{BigInt, ParseBigIntError};
pub use convert::{ConversionError, FromRichValue, IntoRichValue};
pub use value::{NonFinite, RichValue};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed codec metadata: {reason}")]
    MalformedMeta { reason: String },

    #[error("Unsupported value transformation '{tag}'")]
    UnsupportedTag { tag: String },

    #[error("Codec metadata refers to path '{path}' which does not exist in the value")]
    PathNotFound { path: String },

    #[error("Value tagged '{tag}' is malformed: {reason}")]
    Malformed { tag: &'static str, reason: String },

    #[error("Error serializing {type_name} to JSON")]
    Serialize {
        type_name: &'static str,
        source: serde_json::Error,
    },
}

/// The wire form of a [`RichValue`]: plain JSON and, if anything needed transforming, the
/// metadata describing how to restore it.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecEnvelope {
    pub json: JsonValue,
    pub meta: Option<JsonValue>,
}

/// Encode a rich value as JSON plus metadata.
pub fn encode(value: &RichValue) -> CodecEnvelope {
    let (json, annotation) = walk(value);
    CodecEnvelope {
        json,
        meta: annotation.map(into_meta),
    }
}

/// Encode a list of positional parameters.
///
/// Trailing [`RichValue::Undefined`] parameters are dropped first, so that a call which leaves
/// its optional parameters out looks the same on the wire as one that passes them as undefined.
pub fn encode_params(mut params: Vec<RichValue>) -> (Vec<JsonValue>, Option<JsonValue>) {
    while params.last().is_some_and(RichValue::is_undefined) {
        params.pop();
    }

    let (json, annotation) = walk_sequence(&params, None);
    (json, annotation.map(into_meta))
}

/// Decode JSON with its (optional) metadata back into a rich value.
pub fn decode(json: JsonValue, meta: Option<&JsonValue>) -> Result<RichValue, CodecError> {
    let mut value = RichValue::from(json);

    let Some(annotation) = parse_meta(meta)? else {
        return Ok(value);
    };

    annotation.visit(&[], &mut |tag, path| {
        let slot = navigate(&mut value, path).ok_or_else(|| CodecError::PathNotFound {
            path: path.join("."),
        })?;
        let transformed = std::mem::replace(slot, RichValue::Undefined);
        *slot = untransform(tag, transformed)?;
        Ok(())
    })?;

    Ok(value)
}

/// Decode the positional parameters of a request.
pub fn decode_params(params: Vec<JsonValue>, meta: Option<&JsonValue>) -> Result<Vec<RichValue>, CodecError> {
    match decode(JsonValue::Array(params), meta)? {
        RichValue::Array(params) => Ok(params),
        other => Err(CodecError::MalformedMeta {
            reason: format!("parameters must decode to an array, not {}", other.kind()),
        }),
    }
}

fn into_meta(annotation: Annotation) -> JsonValue {
    serde_json::json!({ "values": annotation.to_json() })
}

fn parse_meta(meta: Option<&JsonValue>) -> Result<Option<Annotation>, CodecError> {
    match meta {
        None | Some(JsonValue::Null) => Ok(None),
        // `v` and `referentialEqualities` may also be present; identity of shared references has
        // no meaning for owned values so they are ignored.
        Some(JsonValue::Object(meta)) => match meta.get("values") {
            None | Some(JsonValue::Null) => Ok(None),
            Some(values) => Annotation::from_json(values).map(Some),
        },
        Some(other) => Err(CodecError::MalformedMeta {
            reason: format!("metadata must be an object, got {other}"),
        }),
    }
}

fn walk(value: &RichValue) -> (JsonValue, Option<Annotation>) {
    match value {
        RichValue::Undefined => (JsonValue::Null, Some(Annotation::leaf(Tag::Undefined))),
        RichValue::Null => (JsonValue::Null, None),
        RichValue::Bool(b) => (JsonValue::Bool(*b), None),
        RichValue::Number(number) => (JsonValue::Number(number.clone()), None),
        RichValue::String(s) => (JsonValue::String(s.clone()), None),
        RichValue::NonFinite(non_finite) => (
            JsonValue::from(non_finite.as_str()),
            Some(Annotation::leaf(Tag::Number)),
        ),
        RichValue::Date(date) => (
            JsonValue::String(format_date(date)),
            Some(Annotation::leaf(Tag::Date)),
        ),
        RichValue::RegExp { source, flags } => (
            JsonValue::String(format!("/{source}/{flags}")),
            Some(Annotation::leaf(Tag::RegExp)),
        ),
        RichValue::Error { name, message } => (
            serde_json::json!({ "name": name, "message": message }),
            Some(Annotation::leaf(Tag::Error)),
        ),
        RichValue::BigInt(bigint) => (
            JsonValue::String(bigint.to_string()),
            Some(Annotation::leaf(Tag::BigInt)),
        ),
        RichValue::Array(items) => {
            let (json, annotation) = walk_sequence(items, None);
            (JsonValue::Array(json), annotation)
        }
        RichValue::Set(items) => {
            let (json, annotation) = walk_sequence(items, Some(Tag::Set));
            (JsonValue::Array(json), annotation)
        }
        RichValue::Object(map) => {
            let mut json = serde_json::Map::with_capacity(map.len());
            let mut inner = BTreeMap::new();
            for (key, child) in map {
                let (child_json, child_annotation) = walk(child);
                add_child(&mut inner, escape_key(key), child_annotation);
                json.insert(key.clone(), child_json);
            }
            (JsonValue::Object(json), finish(None, inner))
        }
        RichValue::Map(entries) => {
            // A map goes over the wire as an array of `[key, value]` pairs, so annotations
            // inside an entry have paths like `3.0` (key of entry 3) or `3.1` (its value).
            let mut json = Vec::with_capacity(entries.len());
            let mut inner = BTreeMap::new();
            for (index, (key, value)) in entries.iter().enumerate() {
                let (key_json, key_annotation) = walk(key);
                let (value_json, value_annotation) = walk(value);

                let mut pair = BTreeMap::new();
                add_child(&mut pair, "0".to_string(), key_annotation);
                add_child(&mut pair, "1".to_string(), value_annotation);

                add_child(&mut inner, index.to_string(), finish(None, pair));
                json.push(JsonValue::Array(vec![key_json, value_json]));
            }
            (JsonValue::Array(json), finish(Some(Tag::Map), inner))
        }
    }
}

fn walk_sequence(items: &[RichValue], tag: Option<Tag>) -> (Vec<JsonValue>, Option<Annotation>) {
    let mut json = Vec::with_capacity(items.len());
    let mut inner = BTreeMap::new();
    for (index, child) in items.iter().enumerate() {
        let (child_json, child_annotation) = walk(child);
        add_child(&mut inner, index.to_string(), child_annotation);
        json.push(child_json);
    }
    (json, finish(tag, inner))
}

/// Record a child's annotation in its parent.  A child that was not itself transformed but has
/// transformed descendants is flattened into the parent, prefixing each of its paths.
fn add_child(inner: &mut BTreeMap<String, Annotation>, key: String, annotation: Option<Annotation>) {
    match annotation {
        None => {}
        Some(node @ Annotation::Node { .. }) => {
            inner.insert(key, node);
        }
        Some(Annotation::Inner(children)) => {
            for (path, child) in children {
                inner.insert(format!("{key}.{path}"), child);
            }
        }
    }
}

fn finish(tag: Option<Tag>, inner: BTreeMap<String, Annotation>) -> Option<Annotation> {
    match tag {
        Some(tag) => Some(Annotation::Node { tag, children: inner }),
        None if inner.is_empty() => None,
        None => Some(Annotation::Inner(inner)),
    }
}

fn navigate<'a>(value: &'a mut RichValue, path: &[String]) -> Option<&'a mut RichValue> {
    let Some((segment, rest)) = path.split_first() else {
        return Some(value);
    };

    match value {
        RichValue::Array(items) | RichValue::Set(items) => {
            let index = segment.parse::<usize>().ok()?;
            navigate(items.get_mut(index)?, rest)
        }
        RichValue::Object(map) => navigate(map.get_mut(segment)?, rest),
        RichValue::Map(entries) => {
            let index = segment.parse::<usize>().ok()?;
            let (key, value) = entries.get_mut(index)?;
            let (side, rest) = rest.split_first()?;
            match side.as_str() {
                "0" => navigate(key, rest),
                "1" => navigate(value, rest),
                _ => None,
            }
        }
        _ => None,
    }
}

fn untransform(tag: Tag, value: RichValue) -> Result<RichValue, CodecError> {
    let malformed = |reason: String| CodecError::Malformed {
        tag: tag.as_str(),
        reason,
    };
    let unexpected = |value: &RichValue| malformed(format!("unexpected {}", value.kind()));

    match (tag, value) {
        (Tag::Undefined, _) => Ok(RichValue::Undefined),
        (Tag::Number, RichValue::String(s)) => match NonFinite::parse(&s) {
            Some(non_finite) => Ok(RichValue::NonFinite(non_finite)),
            None if s == "-0" => Ok(RichValue::from_f64(-0.0)),
            None => Err(malformed(format!("'{s}' is not a special number"))),
        },
        (Tag::Date, RichValue::String(s)) => parse_date(&s)
            .map(RichValue::Date)
            .ok_or_else(|| malformed(format!("'{s}' is not a valid date"))),
        (Tag::RegExp, RichValue::String(s)) => match (s.strip_prefix('/'), s.rfind('/')) {
            (Some(_), Some(end)) if end > 0 => Ok(RichValue::regexp(&s[1..end], &s[end + 1..])),
            _ => Err(malformed(format!("'{s}' is not a regular expression literal"))),
        },
        (Tag::Error, RichValue::Object(mut fields)) => {
            let mut field = |name: &str, default: &str| match fields.remove(name) {
                None | Some(RichValue::Undefined) => Ok(default.to_string()),
                Some(RichValue::String(s)) => Ok(s),
                Some(other) => Err(malformed(format!("error {name} must be a string, not {}", other.kind()))),
            };
            let name = field("name", "Error")?;
            let message = field("message", "")?;
            Ok(RichValue::Error { name, message })
        }
        (Tag::BigInt, RichValue::String(s)) => s
            .parse()
            .map(RichValue::BigInt)
            .map_err(|e: ParseBigIntError| malformed(e.to_string())),
        (Tag::BigInt, RichValue::Number(number)) => match (number.as_i64(), number.as_u64()) {
            (Some(n), _) => Ok(RichValue::BigInt(n.into())),
            (None, Some(n)) => Ok(RichValue::BigInt(n.into())),
            _ => Err(malformed(format!("{number} is not an integer"))),
        },
        (Tag::Set, RichValue::Array(items)) => Ok(RichValue::Set(items)),
        (Tag::Map, RichValue::Array(items)) => items
            .into_iter()
            .map(|entry| match entry {
                RichValue::Array(pair) if pair.len() == 2 => {
                    let mut pair = pair.into_iter();
                    match (pair.next(), pair.next()) {
                        (Some(key), Some(value)) => Ok((key, value)),
                        _ => Err(malformed("map entry must be a [key, value] pair".to_string())),
                    }
                }
                other => Err(malformed(format!(
                    "map entry must be a [key, value] pair, not {}",
                    other.kind()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RichValue::Map),
        (_, other) => Err(unexpected(&other)),
    }
}

/// Dates are written the way JavaScript's `Date.prototype.toISOString` writes them: RFC 3339 for
/// years 0000 through 9999, and a signed six-digit year outside that range.
fn format_date(date: &DateTime<Utc>) -> String {
    let year = date.year();
    if (0..=9999).contains(&year) {
        return date.to_rfc3339_opts(SecondsFormat::Millis, true);
    }

    let sign = if year < 0 { '-' } else { '+' };
    format!(
        "{sign}{:06}{}",
        year.unsigned_abs(),
        date.format("-%m-%dT%H:%M:%S%.3fZ")
    )
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }

    // Extended years: `+YYYYYY` or `-YYYYYY`, always in UTC
    let negative = match s.as_bytes().first()? {
        b'+' => false,
        b'-' => true,
        _ => return None,
    };
    let digits = s.get(1..7)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = digits.parse().ok()?;
    let year = if negative { -year } else { year };

    // Parse the rest against a leap year so Feb 29 survives until the real year is applied
    let rest = s.get(7..)?;
    let date = NaiveDateTime::parse_from_str(&format!("2000{rest}"), "%Y-%m-%dT%H:%M:%S%.fZ").ok()?;
    Some(date.with_year(year)?.and_utc())
}
