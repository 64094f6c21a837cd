//! Flat submissions and the flatten/unflatten codec.
//!
//! A form produces one value per schema leaf, keyed by the leaf's dot-joined
//! path (`options.backgroundColor`). [`unflatten`] rebuilds the nested payload
//! from those keys; [`flatten`] goes the other way.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::binary::BinaryUpload;
use crate::error::SubmitError;
use crate::types::{join_path, FieldSchema, PATH_SEPARATOR};

/// Reserved form key carrying the chosen HTTP method.
pub const METHOD_KEY: &str = "$method";

/// Reserved form key carrying the endpoint template.
pub const ENDPOINT_KEY: &str = "$endpoint";

/// Raw value collected for one form control.
#[derive(Debug)]
pub enum FlatValue {
    Text(String),
    Binary(BinaryUpload),
}

impl FlatValue {
    /// Text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FlatValue::Text(text) => Some(text),
            FlatValue::Binary(_) => None,
        }
    }
}

impl From<&str> for FlatValue {
    fn from(text: &str) -> Self {
        FlatValue::Text(text.to_string())
    }
}

impl From<String> for FlatValue {
    fn from(text: String) -> Self {
        FlatValue::Text(text)
    }
}

impl From<BinaryUpload> for FlatValue {
    fn from(upload: BinaryUpload) -> Self {
        FlatValue::Binary(upload)
    }
}

/// One-level map from dot-joined paths to raw values.
///
/// Consumed by a single pipeline run.
#[derive(Debug, Default)]
pub struct FlatSubmission {
    entries: BTreeMap<String, FlatValue>,
}

impl FlatSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous value for the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FlatValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder form of [`FlatSubmission::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FlatValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Remove and return the value for `key`.
    pub fn take(&mut self, key: &str) -> Option<FlatValue> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&FlatValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Strip the reserved `$method`/`$endpoint` keys and return their text.
    ///
    /// Both keys are removed even when one of them is missing.
    pub fn take_route(&mut self) -> Result<(String, String), SubmitError> {
        let method = self.take(METHOD_KEY);
        let endpoint = self.take(ENDPOINT_KEY);
        let method = reserved_text(method, METHOD_KEY)?;
        let endpoint = reserved_text(endpoint, ENDPOINT_KEY)?;
        Ok((method, endpoint))
    }
}

fn reserved_text(value: Option<FlatValue>, key: &'static str) -> Result<String, SubmitError> {
    match value {
        Some(FlatValue::Text(text)) if !text.is_empty() => Ok(text),
        _ => Err(SubmitError::MissingRoute { key }),
    }
}

impl<K, V> FromIterator<(K, V)> for FlatSubmission
where
    K: Into<String>,
    V: Into<FlatValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut submission = FlatSubmission::new();
        for (key, value) in iter {
            submission.insert(key, value);
        }
        submission
    }
}

impl IntoIterator for FlatSubmission {
    type Item = (String, FlatValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FlatValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Whether a value counts as "not provided".
pub fn is_omitted(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Rebuild a nested payload from dot-keyed entries.
///
/// Empty strings and nulls are dropped, so a node whose leaves are all empty
/// never appears. The result does not depend on iteration order.
///
/// # Errors
///
/// Returns `SubmitError::PathConflict` when a populated key is a prefix of
/// another populated key (`options` and `options.backgroundColor`).
pub fn unflatten<I, K>(entries: I) -> Result<Map<String, Value>, SubmitError>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let populated: BTreeMap<String, Value> = entries
        .into_iter()
        .map(|(key, value)| (key.into(), value))
        .filter(|(_, value)| !is_omitted(value))
        .collect();

    check_conflicts(populated.keys())?;

    let mut payload = Map::new();
    for (key, value) in populated {
        insert_nested(&mut payload, &key, value);
    }
    Ok(payload)
}

/// Reject any populated key that is an ancestor of another populated key.
fn check_conflicts<'a>(keys: impl Iterator<Item = &'a String> + Clone) -> Result<(), SubmitError> {
    let all: BTreeSet<&str> = keys.clone().map(String::as_str).collect();
    for key in keys {
        let mut end = 0;
        while let Some(offset) = key[end..].find(PATH_SEPARATOR) {
            end += offset;
            let ancestor = &key[..end];
            if all.contains(ancestor) {
                return Err(SubmitError::PathConflict {
                    parent: ancestor.to_string(),
                    child: key.clone(),
                });
            }
            end += PATH_SEPARATOR.len_utf8();
        }
    }
    Ok(())
}

/// Write `value` at a dot path, creating intermediate objects.
///
/// Callers guarantee no ancestor of `path` holds a non-object value.
fn insert_nested(obj: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    let Some(last) = segments.pop() else {
        return;
    };

    let mut current = obj;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

/// Dot-keyed leaf entries of a payload, in payload order.
///
/// Only objects sitting at a schema node are walked. The value of a schema
/// leaf is emitted whole, even when it is itself an object (a `json` field),
/// and so is anything the schema does not describe. The keys are the flat
/// submission keys of the populated leaves, and
/// `unflatten(flatten(p, s)) == p` for every payload `p` built by [`unflatten`].
pub fn flatten(payload: &Map<String, Value>, schema: &FieldSchema) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    flatten_into(payload, schema, "", &mut out);
    out
}

fn flatten_into(
    map: &Map<String, Value>,
    schema: &FieldSchema,
    prefix: &str,
    out: &mut Vec<(String, Value)>,
) {
    for (key, value) in map {
        let path = join_path(prefix, key);
        match (schema.child(key), value) {
            (Some(node @ FieldSchema::Node(_)), Value::Object(child)) if !child.is_empty() => {
                flatten_into(child, node, &path, out)
            }
            (_, other) => out.push((path, other.clone())),
        }
    }
}
