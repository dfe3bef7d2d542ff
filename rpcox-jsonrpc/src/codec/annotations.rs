//! The metadata tree that says which parts of a JSON document were transformed, and how.
//!
//! This is the same structure the `superjson` JavaScript library produces under the `values` key
//! of its `meta` object, so that either side of a connection can be a browser:
//!
//! - `["Date"]` is a leaf: the value at this position was transformed with the `Date` rule.
//! - `["set", {"0": ["bigint"]}]` is a node: the value here is a set, and the element at path `0`
//!   beneath it is a bigint.  Children are restored before their parent.
//! - `{"a.b": ["Date"], "c": ["undefined"]}` is only valid at the root, when the root value itself
//!   needed no transformation.
//!
//! Paths are object keys or array indexes joined with `.`.  A `.` or `\` inside a key is escaped
//! with a `\`.
use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use super::CodecError;

/// How a single value was transformed to fit in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tag {
    Date,
    Set,
    Map,
    RegExp,
    Error,
    BigInt,
    Undefined,
    Number,
}

impl Tag {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Tag::Date => "Date",
            Tag::Set => "set",
            Tag::Map => "map",
            Tag::RegExp => "regexp",
            Tag::Error => "Error",
            Tag::BigInt => "bigint",
            Tag::Undefined => "undefined",
            Tag::Number => "number",
        }
    }

    fn from_json(value: &JsonValue) -> Result<Self, CodecError> {
        match value {
            JsonValue::String(tag) => match tag.as_str() {
                "Date" => Ok(Tag::Date),
                "set" => Ok(Tag::Set),
                "map" => Ok(Tag::Map),
                "regexp" => Ok(Tag::RegExp),
                "Error" => Ok(Tag::Error),
                "bigint" => Ok(Tag::BigInt),
                "undefined" => Ok(Tag::Undefined),
                "number" => Ok(Tag::Number),
                _ => Err(CodecError::UnsupportedTag { tag: tag.clone() }),
            },
            // Class, symbol and custom transformations are written as `[kind, identifier]`;
            // none of them mean anything outside of the JavaScript process that wrote them.
            other => Err(CodecError::UnsupportedTag { tag: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Annotation {
    Node {
        tag: Tag,
        children: BTreeMap<String, Annotation>,
    },
    Inner(BTreeMap<String, Annotation>),
}

impl Annotation {
    pub(crate) fn leaf(tag: Tag) -> Self {
        Annotation::Node {
            tag,
            children: BTreeMap::new(),
        }
    }

    pub(crate) fn to_json(&self) -> JsonValue {
        match self {
            Annotation::Node { tag, children } if children.is_empty() => {
                JsonValue::Array(vec![JsonValue::from(tag.as_str())])
            }
            Annotation::Node { tag, children } => JsonValue::Array(vec![
                JsonValue::from(tag.as_str()),
                Self::children_to_json(children),
            ]),
            Annotation::Inner(children) => Self::children_to_json(children),
        }
    }

    fn children_to_json(children: &BTreeMap<String, Annotation>) -> JsonValue {
        JsonValue::Object(
            children
                .iter()
                .map(|(path, child)| (path.clone(), child.to_json()))
                .collect(),
        )
    }

    pub(crate) fn from_json(value: &JsonValue) -> Result<Self, CodecError> {
        match value {
            JsonValue::Array(items) => match items.as_slice() {
                [tag] => Ok(Self::leaf(Tag::from_json(tag)?)),
                [tag, JsonValue::Object(children)] => Ok(Annotation::Node {
                    tag: Tag::from_json(tag)?,
                    children: Self::children_from_json(children)?,
                }),
                _ => Err(CodecError::MalformedMeta {
                    reason: format!("annotation node must be [tag] or [tag, {{children}}], got {value}"),
                }),
            },
            JsonValue::Object(children) => Ok(Annotation::Inner(Self::children_from_json(children)?)),
            other => Err(CodecError::MalformedMeta {
                reason: format!("annotation must be an array or an object, got {other}"),
            }),
        }
    }

    fn children_from_json(
        children: &serde_json::Map<String, JsonValue>,
    ) -> Result<BTreeMap<String, Annotation>, CodecError> {
        children
            .iter()
            .map(|(path, child)| Ok((path.clone(), Self::from_json(child)?)))
            .collect()
    }

    /// Visit every transformation in this tree in the order they must be undone: children before
    /// the node that contains them.  Each visit gets the full path of the value to transform.
    pub(crate) fn visit<F>(&self, origin: &[String], visitor: &mut F) -> Result<(), CodecError>
    where
        F: FnMut(Tag, &[String]) -> Result<(), CodecError>,
    {
        match self {
            Annotation::Node { tag, children } => {
                Self::visit_children(children, origin, visitor)?;
                visitor(*tag, origin)
            }
            Annotation::Inner(children) => Self::visit_children(children, origin, visitor),
        }
    }

    fn visit_children<F>(
        children: &BTreeMap<String, Annotation>,
        origin: &[String],
        visitor: &mut F,
    ) -> Result<(), CodecError>
    where
        F: FnMut(Tag, &[String]) -> Result<(), CodecError>,
    {
        for (path, child) in children {
            let mut full_path = origin.to_vec();
            full_path.extend(parse_path(path));
            child.visit(&full_path, visitor)?;
        }
        Ok(())
    }
}

pub(crate) fn escape_key(key: &str) -> String {
    key.replace('\\', "\\\\").replace('.', "\\.")
}

pub(crate) fn parse_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut segment = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('\\') | Some('.')) => {
                if let Some(escaped) = chars.next() {
                    segment.push(escaped);
                }
            }
            '.' => segments.push(std::mem::take(&mut segment)),
            c => segment.push(c),
        }
    }
    segments.push(segment);

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn escaped_keys_parse_back() {
        for key in ["plain", "a.b", "back\\slash", "both\\.", ""] {
            assert_eq!(parse_path(&escape_key(key)), vec![key.to_string()]);
        }

        let joined = format!("{}.{}", escape_key("a.b"), escape_key("c"));
        assert_eq!(parse_path(&joined), vec!["a.b", "c"]);
        assert_eq!(parse_path("0.1.2"), vec!["0", "1", "2"]);
    }

    #[test]
    fn trees_survive_json() {
        let tree = json!({"0": ["Date"], "1": ["set", {"0": ["bigint"]}], "2.a": ["undefined"]});
        let annotation = Annotation::from_json(&tree).unwrap();
        assert_eq!(annotation.to_json(), tree);
    }

    #[test]
    fn children_are_visited_before_parents() {
        let tree = json!(["map", {"0.0": ["Date"], "0.1": ["set", {"0": ["bigint"]}]}]);
        let annotation = Annotation::from_json(&tree).unwrap();

        let mut visited = Vec::new();
        annotation
            .visit(&[], &mut |tag, path| {
                visited.push((tag.as_str(), path.join("/")));
                Ok(())
            })
            .unwrap();

        assert_eq!(
            visited,
            vec![
                ("Date", "0/0".to_string()),
                ("bigint", "0/1/0".to_string()),
                ("set", "0/1".to_string()),
                ("map", "".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_unknown_and_malformed_annotations() {
        assert_matches!(
            Annotation::from_json(&json!(["symbol"])),
            Err(CodecError::UnsupportedTag { tag }) if tag == "symbol"
        );
        assert_matches!(
            Annotation::from_json(&json!([["class", "Foo"]])),
            Err(CodecError::UnsupportedTag { .. })
        );
        assert_matches!(Annotation::from_json(&json!([])), Err(CodecError::MalformedMeta { .. }));
        assert_matches!(Annotation::from_json(&json!("Date")), Err(CodecError::MalformedMeta { .. }));
        assert_matches!(
            Annotation::from_json(&json!(["set", ["Date"]])),
            Err(CodecError::MalformedMeta { .. })
        );
    }
}
