//! Task input: a tagged union over the three payload shapes a handler accepts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Discriminant for the payload shape of a [`TaskInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputKind {
    /// Ordered list of values.
    List,
    /// Key-value mapping.
    Map,
    /// A single opaque value.
    Single,
}

/// Borrowed payload returned by [`TaskInput::get`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputPayload<'a> {
    List(&'a [Value]),
    Map(&'a BTreeMap<String, Value>),
    Single(&'a Value),
}

/// Input for a single sub-operation.
///
/// Exactly one payload shape is populated and it is fixed at construction.
/// There are no mutating methods: handlers receive `&TaskInput`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum TaskInput {
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Single(Value),
}

impl TaskInput {
    /// Builds a list-shaped input.
    #[must_use]
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        TaskInput::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds a map-shaped input.
    #[must_use]
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        TaskInput::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds a single-value input.
    #[must_use]
    pub fn single(value: impl Into<Value>) -> Self {
        TaskInput::Single(value.into())
    }

    /// The tag this input was constructed with.
    #[must_use]
    pub fn kind(&self) -> InputKind {
        match self {
            TaskInput::List(_) => InputKind::List,
            TaskInput::Map(_) => InputKind::Map,
            TaskInput::Single(_) => InputKind::Single,
        }
    }

    /// Requests the payload by tag. A mismatched tag yields `None`.
    #[must_use]
    pub fn get(&self, kind: InputKind) -> Option<InputPayload<'_>> {
        match (self, kind) {
            (TaskInput::List(items), InputKind::List) => Some(InputPayload::List(items)),
            (TaskInput::Map(entries), InputKind::Map) => Some(InputPayload::Map(entries)),
            (TaskInput::Single(value), InputKind::Single) => Some(InputPayload::Single(value)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self.get(InputKind::List)? {
            InputPayload::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self.get(InputKind::Map)? {
            InputPayload::Map(entries) => Some(entries),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_single(&self) -> Option<&Value> {
        match self.get(InputKind::Single)? {
            InputPayload::Single(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for TaskInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskInput::List(items) => write!(f, "TaskInput[list={}]", Value::Array(items.clone())),
            TaskInput::Map(entries) => write!(f, "TaskInput[map={}]", Value::Map(entries.clone())),
            TaskInput::Single(value) => write!(f, "TaskInput[single={value}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_fixed_by_constructor() {
        assert_eq!(TaskInput::list(["a", "b"]).kind(), InputKind::List);
        assert_eq!(TaskInput::map([("k", 1)]).kind(), InputKind::Map);
        assert_eq!(TaskInput::single("x").kind(), InputKind::Single);
    }

    #[test]
    fn mismatched_tag_yields_none() {
        let input = TaskInput::single("");
        assert!(input.get(InputKind::List).is_none());
        assert!(input.get(InputKind::Map).is_none());
        assert!(input.as_list().is_none());
        assert!(input.as_map().is_none());
        assert_eq!(input.as_single(), Some(&Value::String(String::new())));
    }

    #[test]
    fn matching_tag_returns_payload() {
        let input = TaskInput::List(vec![Value::from("a"), Value::from("b"), Value::from(1)]);
        let items = input.as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2], Value::Int(1));
        assert!(matches!(
            input.get(InputKind::List),
            Some(InputPayload::List(slice)) if slice.len() == 3
        ));
    }

    #[test]
    fn map_payload_is_key_addressable() {
        let input = TaskInput::map([("user", Value::from("alice")), ("age", Value::from(30))]);
        let map = input.as_map().unwrap();
        assert_eq!(map.get("user"), Some(&Value::from("alice")));
        assert_eq!(map.get("age").and_then(Value::as_int), Some(30));
    }

    #[test]
    fn display_names_the_shape() {
        assert_eq!(TaskInput::list([1, 2]).to_string(), "TaskInput[list=[1, 2]]");
        assert_eq!(TaskInput::single("v").to_string(), "TaskInput[single=v]");
    }

    #[test]
    fn serde_uses_kind_and_payload() {
        let json = serde_json::to_value(TaskInput::single(true)).unwrap();
        assert_eq!(json["kind"], "single");
        assert_eq!(json["payload"]["Bool"], true);
    }
}
