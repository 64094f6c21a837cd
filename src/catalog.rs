//! Operation catalog: loading, validation, registration, and lookup.
//!
//! A catalog document is a JSON array of operations:
//!
//! ```json
//! [
//!   {
//!     "name": "Update Post",
//!     "endpoint": "/api/posts/:id",
//!     "method": "PATCH",
//!     "fields": { "id": "input", "content": "input", "options": { "backgroundColor": "input" } }
//!   }
//! ]
//! ```
//!
//! Documents are checked against an embedded JSON Schema before they are
//! turned into typed [`Operation`]s, and every operation is checked again
//! when it is registered.

use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::codec::FlatSubmission;
use crate::error::{CatalogError, CatalogIssue, SubmitError};
use crate::types::{FieldKind, FieldSchema, Method, Operation, PATH_SEPARATOR};

const CATALOG_SCHEMA: &str = include_str!("catalog.schema.json");
const BUILTIN_CATALOG: &str = include_str!("builtin_catalog.json");

/// Wire form of one catalog entry.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOperation {
    name: String,
    endpoint: String,
    method: Method,
    fields: Value,
    #[serde(default, rename = "richResponse")]
    rich_response: bool,
}

/// Read-only registry of operations, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    operations: Vec<Operation>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog bundled with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::load_str(BUILTIN_CATALOG)
    }

    /// Load a catalog from a file path.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::FileNotFound` if the file doesn't exist,
    /// `CatalogError::InvalidJson` if it isn't JSON, or a validation error.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        Self::load_str(&content)
    }

    /// Load a catalog from a JSON string.
    pub fn load_str(content: &str) -> Result<Self, CatalogError> {
        let value: Value =
            serde_json::from_str(content).map_err(|source| CatalogError::InvalidJson { source })?;
        Self::from_value(&value)
    }

    /// Build a catalog from a parsed catalog document.
    pub fn from_value(document: &Value) -> Result<Self, CatalogError> {
        validate_document(document)?;

        let mut catalog = Catalog::new();
        let entries = document.as_array().map(Vec::as_slice).unwrap_or_default();
        for (index, entry) in entries.iter().enumerate() {
            catalog.register(operation_from_value(entry, index)?)?;
        }

        tracing::debug!(operations = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Add an operation after checking it against the catalog rules.
    ///
    /// # Errors
    ///
    /// - `RootNotNode` if the fields are a single leaf
    /// - `DuplicateOperation` if the name is taken
    /// - `UnboundPlaceholder` if an endpoint placeholder has no top-level text field
    /// - `BinaryTargetCollision` if a nested file field's bare name is taken by a
    ///   top-level field that is not itself a file
    pub fn register(&mut self, operation: Operation) -> Result<(), CatalogError> {
        if !matches!(operation.fields, FieldSchema::Node(_)) {
            return Err(CatalogError::RootNotNode {
                operation: operation.name,
            });
        }

        if self.get(&operation.name).is_some() {
            return Err(CatalogError::DuplicateOperation {
                name: operation.name,
            });
        }

        for placeholder in operation.placeholders() {
            let bound = match operation.fields.child(placeholder) {
                Some(FieldSchema::Leaf(kind)) => kind.is_text(),
                _ => false,
            };
            if !bound {
                return Err(CatalogError::UnboundPlaceholder {
                    operation: operation.name.clone(),
                    placeholder: placeholder.to_string(),
                });
            }
        }

        // Uploads land at the top level under their bare name
        for leaf in operation.fields.leaves() {
            if leaf.depth == 0 || !matches!(leaf.kind, FieldKind::Binary { .. }) {
                continue;
            }
            let name = leaf
                .path
                .rsplit(PATH_SEPARATOR)
                .next()
                .unwrap_or(leaf.path.as_str());
            let clashes = match operation.fields.child(name) {
                None | Some(FieldSchema::Leaf(FieldKind::Binary { .. })) => false,
                Some(_) => true,
            };
            if clashes {
                return Err(CatalogError::BinaryTargetCollision {
                    operation: operation.name.clone(),
                    field: leaf.path.clone(),
                    name: name.to_string(),
                });
            }
        }

        self.operations.push(operation);
        Ok(())
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operation by exact name.
    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Operation by exact name, case-insensitive name, or 1-based position.
    pub fn select(&self, query: &str) -> Result<&Operation, CatalogError> {
        if let Some(op) = self.get(query) {
            return Ok(op);
        }

        let lowered = query.to_lowercase();
        if let Some(op) = self
            .operations
            .iter()
            .find(|op| op.name.to_lowercase() == lowered)
        {
            return Ok(op);
        }

        query
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| self.operations.get(index))
            .ok_or_else(|| CatalogError::UnknownOperation {
                query: query.to_string(),
            })
    }

    /// First operation registered for a method and endpoint template.
    pub fn find_route(&self, method: Method, endpoint: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.method == method && op.endpoint == endpoint)
    }

    /// Strip the reserved route keys from a form and find its operation.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::MissingRoute` if a reserved key is absent, or
    /// `SubmitError::UnknownRoute` if no operation matches.
    pub fn route_form(&self, submission: &mut FlatSubmission) -> Result<&Operation, SubmitError> {
        let (method, endpoint) = submission.take_route()?;
        let unknown = || SubmitError::UnknownRoute {
            method: method.clone(),
            endpoint: endpoint.clone(),
        };
        let parsed: Method = method.parse().map_err(|_| unknown())?;
        self.find_route(parsed, &endpoint).ok_or_else(unknown)
    }

    /// Catalog document form, as accepted by [`Catalog::from_value`].
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.operations
                .iter()
                .map(|op| {
                    let mut entry = json!({
                        "name": op.name,
                        "endpoint": op.endpoint,
                        "method": op.method,
                        "fields": op.fields.to_value(),
                    });
                    if op.rich_response {
                        entry["richResponse"] = Value::Bool(true);
                    }
                    entry
                })
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Check a catalog document against the embedded catalog schema.
///
/// # Errors
///
/// Returns `CatalogError::Invalid` with every violation found.
pub fn validate_document(document: &Value) -> Result<(), CatalogError> {
    let schema: Value = serde_json::from_str(CATALOG_SCHEMA)
        .map_err(|source| CatalogError::InvalidJson { source })?;
    let validator = jsonschema::validator_for(&schema).map_err(|e| CatalogError::Invalid {
        issues: vec![CatalogIssue {
            path: String::new(),
            message: format!("catalog schema is unusable: {}", e),
        }],
    })?;

    let issues: Vec<CatalogIssue> = validator
        .iter_errors(document)
        .map(|e| CatalogIssue {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if issues.is_empty() {
        Ok(())
    } else {
        Err(CatalogError::Invalid { issues })
    }
}

fn operation_from_value(value: &Value, index: usize) -> Result<Operation, CatalogError> {
    let raw: RawOperation = serde_json::from_value(value.clone())
        .map_err(|source| CatalogError::InvalidJson { source })?;
    let fields = FieldSchema::from_value(&raw.fields, &format!("/{}/fields", index))?;

    Ok(Operation::new(raw.name, raw.endpoint, raw.method, fields).rich_response(raw.rich_response))
}
