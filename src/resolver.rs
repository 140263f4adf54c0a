// MIT License
// Copyright 2023--present optirpc developers

//! Reference expansion for display and introspection.
//!
//! Stored messages point at each other through foreign-key fields: a field
//! ending in `_guid` holds one key, a field ending in `_guids` holds a list.
//! [`Resolver::expand`] returns a self-contained tree where each such field
//! is replaced by the referenced entities, recursively:
//!
//! ```text
//! { "name": "Mirror", "sop_guids": ["k1"] }
//!   => { "name": "Mirror", "sops": [{ "name": "Mirror_90", "mirror": { ... } }] }
//! ```
//!
//! Empty keys mean "unset" and are left alone. Expansion never writes to the
//! database. A key that is reached again while it is still being expanded
//! is replaced by a cycle marker `{ "$cycle": "<key>" }`, or fails with
//! [`Error::CycleDetected`] under [`CyclePolicy::Fail`].

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{Error, Result};
use crate::link::Link;
use crate::messages::Message;
use crate::registry::KeyResolver;

pub const GUID_SUFFIX: &str = "_guid";
pub const GUIDS_SUFFIX: &str = "_guids";
pub const PROPERTIES_SUFFIX: &str = "_properties";
/// Field name of the cycle marker object.
pub const CYCLE_MARKER: &str = "$cycle";

/// What to do when expansion re-enters a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Leave `{ "$cycle": key }` in place of the repeated entity.
    #[default]
    Mark,
    Fail,
}

/// Expands foreign keys through a [`KeyResolver`].
pub struct Resolver<'r> {
    keys: &'r dyn KeyResolver,
    policy: CyclePolicy,
    ignored: HashSet<String>,
}

/// State of one expansion call.
#[derive(Default)]
struct Pass {
    expanding: HashSet<String>,
    memo: HashMap<String, Value>,
    marks: usize,
}

impl<'r> Resolver<'r> {
    pub fn new(keys: &'r dyn KeyResolver) -> Self {
        Self {
            keys,
            policy: CyclePolicy::default(),
            ignored: HashSet::new(),
        }
    }

    pub fn with_policy(mut self, policy: CyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Leave `field` as stored wherever it appears.
    pub fn ignoring(mut self, field: impl Into<String>) -> Self {
        self.ignored.insert(field.into());
        self
    }

    pub fn expand(&self, value: &Value) -> Result<Value> {
        self.expand_value(value, &mut Pass::default())
    }

    pub fn expand_message<M: Message>(&self, message: &M) -> Result<Value> {
        self.expand(&serde_json::to_value(message)?)
    }

    /// Expand the stored entity behind `link`. The link's own key counts as
    /// being expanded, so a reference back to it is a cycle.
    pub fn expand_link<M: Message>(&self, link: &Link<M>) -> Result<Value> {
        let value = serde_json::to_value(link.get()?)?;
        self.expand_root(link.key(), &value)
    }

    /// Expand the entity stored under `key`, whatever its kind.
    pub fn expand_key(&self, key: &str) -> Result<Value> {
        let (_, value) = self.keys.fetch(key)?;
        self.expand_root(key, &value)
    }

    fn expand_root(&self, key: &str, value: &Value) -> Result<Value> {
        let mut pass = Pass::default();
        pass.expanding.insert(key.to_string());
        self.expand_value(value, &mut pass)
    }

    fn expand_value(&self, value: &Value, pass: &mut Pass) -> Result<Value> {
        match value {
            Value::Object(map) => self.expand_object(map, pass).map(Value::Object),
            Value::Array(items) => items
                .iter()
                .map(|item| self.expand_value(item, pass))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn expand_object(&self, map: &Map<String, Value>, pass: &mut Pass) -> Result<Map<String, Value>> {
        let mut out = Map::with_capacity(map.len());
        for (field, value) in map {
            if self.ignored.contains(field) {
                out.insert(field.clone(), value.clone());
                continue;
            }
            if let Some(stem) = field.strip_suffix(GUIDS_SUFFIX) {
                if let Some(keys) = non_empty_keys(value) {
                    let mut expanded = Vec::with_capacity(keys.len());
                    for key in keys {
                        expanded.push(self.expand_ref(key, pass)?);
                    }
                    out.insert(format!("{stem}s"), Value::Array(expanded));
                    continue;
                }
            } else if let Some(stem) = field.strip_suffix(GUID_SUFFIX) {
                if let Some(key) = value.as_str().filter(|k| !k.is_empty()) {
                    let expanded = self.expand_ref(key, pass)?;
                    out.insert(stem.to_string(), expanded);
                    continue;
                }
            }
            out.insert(field.clone(), self.expand_value(value, pass)?);
        }
        Ok(out)
    }

    fn expand_ref(&self, key: &str, pass: &mut Pass) -> Result<Value> {
        if pass.expanding.contains(key) {
            trace!(key = %key, "reference cycle");
            return match self.policy {
                CyclePolicy::Mark => {
                    pass.marks += 1;
                    Ok(cycle_marker(key))
                }
                CyclePolicy::Fail => Err(Error::CycleDetected {
                    key: key.to_string(),
                }),
            };
        }
        if let Some(done) = pass.memo.get(key) {
            return Ok(done.clone());
        }

        let (_, stored) = self.keys.fetch(key)?;
        let marks_before = pass.marks;
        pass.expanding.insert(key.to_string());
        let expanded = self.expand_value(&stored, pass);
        pass.expanding.remove(key);
        let expanded = expanded?;

        // A marked tree depends on where it was reached from.
        if pass.marks == marks_before {
            pass.memo.insert(key.to_string(), expanded.clone());
        }
        Ok(expanded)
    }
}

/// Non-empty keys of a `_guids` field, or `None` when there is nothing to
/// expand.
fn non_empty_keys(value: &Value) -> Option<Vec<&str>> {
    let keys: Vec<&str> = value
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .filter(|k| !k.is_empty())
        .collect();
    (!keys.is_empty()).then_some(keys)
}

pub fn cycle_marker(key: &str) -> Value {
    let mut map = Map::new();
    map.insert(CYCLE_MARKER.to_string(), Value::String(key.to_string()));
    Value::Object(map)
}

/// `true` for a value produced by [`cycle_marker`].
pub fn is_cycle_marker(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| m.len() == 1 && m.get(CYCLE_MARKER).is_some_and(Value::is_string))
}

/// Fold instance properties into the object they describe.
///
/// Each field `p_properties` holding an object is merged into the first
/// object-valued field named `p` found in the same object or below it
/// (breadth first), then removed. Entries of the properties object whose
/// names end in `_properties` are not copied. A properties field with no
/// matching target stays where it is. Children are collapsed before their
/// parents.
pub fn collapse_properties(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(collapse_properties).collect()),
        Value::Object(map) => {
            let mut map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, collapse_properties(v)))
                .collect();
            let fields: Vec<String> = map
                .iter()
                .filter(|(k, v)| k.len() > PROPERTIES_SUFFIX.len() && k.ends_with(PROPERTIES_SUFFIX) && v.is_object())
                .map(|(k, _)| k.clone())
                .collect();
            for field in fields {
                let target = &field[..field.len() - PROPERTIES_SUFFIX.len()];
                let Some(Value::Object(props)) = map.remove(&field) else {
                    continue;
                };
                match find_object_mut(&mut map, target) {
                    Some(dest) => {
                        for (k, v) in props {
                            if !k.ends_with(PROPERTIES_SUFFIX) {
                                dest.insert(k, v);
                            }
                        }
                    }
                    None => {
                        map.insert(field, Value::Object(props));
                    }
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn find_object_mut<'a>(map: &'a mut Map<String, Value>, name: &str) -> Option<&'a mut Map<String, Value>> {
    let path = find_object_path(map, name)?;
    let mut current = map;
    let (last, parents) = path.split_last()?;
    for step in parents {
        current = current.get_mut(step)?.as_object_mut()?;
    }
    current.get_mut(last)?.as_object_mut()
}

fn find_object_path(map: &Map<String, Value>, name: &str) -> Option<Vec<String>> {
    let mut queue: VecDeque<(Vec<String>, &Map<String, Value>)> = VecDeque::new();
    queue.push_back((Vec::new(), map));
    while let Some((path, current)) = queue.pop_front() {
        if current.get(name).is_some_and(Value::is_object) {
            let mut found = path;
            found.push(name.to_string());
            return Some(found);
        }
        for (k, v) in current {
            if let Value::Object(child) = v {
                let mut next = path.clone();
                next.push(k.clone());
                queue.push_back((next, child));
            }
        }
    }
    None
}

/// Every occurrence of field `key`, with its x-path.
///
/// Objects are walked depth first. Array items are addressed by their
/// `name` field when they have one (`.sops[.name='Mirror']`), by index
/// otherwise (`.layers[0]`). A matching field is not searched further.
pub fn find_by_key(value: &Value, key: &str) -> Vec<(String, Value)> {
    let mut found = Vec::new();
    collect_by_key(value, key, String::new(), &mut found);
    found
}

fn collect_by_key(value: &Value, key: &str, path: String, found: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let here = format!("{path}.{k}");
                if k == key {
                    found.push((here, v.clone()));
                } else {
                    collect_by_key(v, key, here, found);
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if !item.is_object() {
                    continue;
                }
                let index = match item.get("name").and_then(Value::as_str) {
                    Some(name) => format!("[.name='{name}']"),
                    None => format!("[{i}]"),
                };
                collect_by_key(item, key, format!("{path}{index}"), found);
            }
        }
        _ => {}
    }
}

/// Four-space indented JSON.
pub fn to_pretty_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    // serde_json only emits UTF-8
    Ok(String::from_utf8_lossy(&out).into_owned())
}
