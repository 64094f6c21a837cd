//! Core types: field schemas, HTTP methods, operations, and client options.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CatalogError;
use crate::template::placeholders;

/// Separator between segments of a flat submission key.
pub const PATH_SEPARATOR: char = '.';

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coercion kind of a schema leaf.
///
/// Also decides which control a form renderer shows for the leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Single-line text, sent verbatim.
    Text,
    /// Multi-line text, sent verbatim.
    MultilineText,
    /// Text parsed as a JSON document before sending.
    StructuredText,
    /// File upload, sent as a `data:` URL.
    Binary {
        /// Declared media type; `None` falls back to the upload's own type.
        media_type: Option<String>,
    },
}

impl FieldKind {
    /// Parse a catalog tag (`input`, `textarea`, `json`, `file`, `file:<type>`).
    ///
    /// Returns `None` for unknown tags (caller should error).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "input" => Some(FieldKind::Text),
            "textarea" => Some(FieldKind::MultilineText),
            "json" => Some(FieldKind::StructuredText),
            "file" => Some(FieldKind::Binary { media_type: None }),
            _ => {
                let media_type = tag.strip_prefix("file:")?;
                if media_type.contains('/') && !media_type.contains(char::is_whitespace) {
                    Some(FieldKind::Binary {
                        media_type: Some(media_type.to_string()),
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Catalog tag for this kind (inverse of [`FieldKind::parse`]).
    pub fn tag(&self) -> String {
        match self {
            FieldKind::Text => "input".to_string(),
            FieldKind::MultilineText => "textarea".to_string(),
            FieldKind::StructuredText => "json".to_string(),
            FieldKind::Binary { media_type: None } => "file".to_string(),
            FieldKind::Binary {
                media_type: Some(media_type),
            } => format!("file:{}", media_type),
        }
    }

    /// Whether a value of this kind can fill an endpoint placeholder.
    pub fn is_text(&self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::MultilineText)
    }
}

/// Named child of a [`FieldSchema::Node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub schema: FieldSchema,
}

/// Recursive description of an operation's input shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSchema {
    Leaf(FieldKind),
    /// Children in display order. Names are unique within a node.
    Node(Vec<Field>),
}

/// A leaf together with its flat submission key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafField<'a> {
    /// Dot-joined path from the schema root.
    pub path: String,
    /// Nesting depth; top-level leaves are at depth 0.
    pub depth: usize,
    pub kind: &'a FieldKind,
}

impl FieldSchema {
    /// Build a schema from its catalog JSON form.
    ///
    /// Strings are leaf tags, objects are nodes. `path` is used in error messages.
    pub fn from_value(value: &Value, path: &str) -> Result<Self, CatalogError> {
        match value {
            Value::String(tag) => {
                FieldKind::parse(tag)
                    .map(FieldSchema::Leaf)
                    .ok_or_else(|| CatalogError::InvalidField {
                        path: path.to_string(),
                        message: format!(
                            "unknown field type \"{}\": expected input, textarea, json, file, or file:<media type>",
                            tag
                        ),
                    })
            }
            Value::Object(map) => {
                let mut children = Vec::with_capacity(map.len());
                for (name, child) in map {
                    let child_path = join_path(path, name);
                    if name.is_empty() || name.contains(PATH_SEPARATOR) {
                        return Err(CatalogError::InvalidField {
                            path: child_path,
                            message: "field names must be non-empty and must not contain '.'"
                                .to_string(),
                        });
                    }
                    children.push(Field {
                        name: name.clone(),
                        schema: FieldSchema::from_value(child, &child_path)?,
                    });
                }
                Ok(FieldSchema::Node(children))
            }
            other => Err(CatalogError::InvalidField {
                path: path.to_string(),
                message: format!(
                    "expected string or object, got {}",
                    json_type_name(other)
                ),
            }),
        }
    }

    /// Catalog JSON form of this schema.
    pub fn to_value(&self) -> Value {
        match self {
            FieldSchema::Leaf(kind) => Value::String(kind.tag()),
            FieldSchema::Node(children) => {
                let map: Map<String, Value> = children
                    .iter()
                    .map(|field| (field.name.clone(), field.schema.to_value()))
                    .collect();
                Value::Object(map)
            }
        }
    }

    /// Direct child by name. Always `None` on a leaf.
    pub fn child(&self, name: &str) -> Option<&FieldSchema> {
        match self {
            FieldSchema::Leaf(_) => None,
            FieldSchema::Node(children) => children
                .iter()
                .find(|field| field.name == name)
                .map(|field| &field.schema),
        }
    }

    /// Leaf kind at a dot-joined path, or `None` if the path does not end on a leaf.
    pub fn lookup(&self, path: &str) -> Option<&FieldKind> {
        let mut current = self;
        for segment in path.split(PATH_SEPARATOR) {
            current = current.child(segment)?;
        }
        match current {
            FieldSchema::Leaf(kind) => Some(kind),
            FieldSchema::Node(_) => None,
        }
    }

    /// Every leaf with its flat submission key, in display order.
    pub fn leaves(&self) -> Vec<LeafField<'_>> {
        let mut out = Vec::new();
        collect_leaves(self, "", 0, &mut out);
        out
    }
}

fn collect_leaves<'a>(
    schema: &'a FieldSchema,
    prefix: &str,
    depth: usize,
    out: &mut Vec<LeafField<'a>>,
) {
    let FieldSchema::Node(children) = schema else {
        return;
    };
    for field in children {
        let path = join_path(prefix, &field.name);
        match &field.schema {
            FieldSchema::Leaf(kind) => out.push(LeafField { path, depth, kind }),
            node @ FieldSchema::Node(_) => collect_leaves(node, &path, depth + 1, out),
        }
    }
}

/// Join a parent path and a segment with the path separator.
pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", prefix, PATH_SEPARATOR, name)
    }
}

/// HTTP verb of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }

    /// Whether the payload travels as a JSON body (false means query string).
    pub fn carries_body(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            _ => Err(CatalogError::UnknownMethod {
                value: s.to_string(),
            }),
        }
    }
}

/// One registered API action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Unique display label.
    pub name: String,
    /// Path template with zero or more `:placeholder` segments.
    pub endpoint: String,
    pub method: Method,
    /// Top-level node describing the form.
    pub fields: FieldSchema,
    /// Response body is a list of posts whose photo should be previewed.
    pub rich_response: bool,
}

impl Operation {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        method: Method,
        fields: FieldSchema,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            method,
            fields,
            rich_response: false,
        }
    }

    /// Set the rich response capability.
    pub fn rich_response(mut self, rich_response: bool) -> Self {
        self.rich_response = rich_response;
        self
    }

    /// Placeholder names in the endpoint template, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        placeholders(&self.endpoint)
    }
}

/// Options for the HTTP transport.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Scheme, host, and optional port prepended to every resolved path.
    pub base_url: String,
    /// Whole-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    /// Create options without a timeout.
    ///
    /// A trailing slash on the base URL is dropped since resolved paths start with one.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: None,
        }
    }

    /// Set a whole-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
