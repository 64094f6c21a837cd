//! Per-leaf value coercion.

use serde_json::Value;

use crate::binary::PendingBinary;
use crate::codec::{FlatSubmission, FlatValue};
use crate::error::SubmitError;
use crate::types::{FieldKind, FieldSchema};

/// A submission split into coerced text values and uploads awaiting encoding.
#[derive(Debug, Default)]
pub struct Coerced {
    /// Populated entries keyed by their flat path.
    pub values: Vec<(String, Value)>,
    pub binaries: Vec<PendingBinary>,
}

/// Coerce every populated entry according to the schema leaf at its path.
///
/// Empty text is "not provided" and skipped without being parsed, so partial
/// updates only send what was filled in.
///
/// # Errors
///
/// Returns `SubmitError::InvalidStructuredText` if a `json` field does not parse.
pub fn coerce(schema: &FieldSchema, submission: FlatSubmission) -> Result<Coerced, SubmitError> {
    let mut coerced = Coerced::default();

    for (path, value) in submission {
        let kind = schema.lookup(&path);
        match value {
            FlatValue::Binary(upload) => {
                let leaf_media_type = match kind {
                    Some(FieldKind::Binary { media_type }) => media_type.clone(),
                    _ => None,
                };
                coerced.binaries.push(PendingBinary {
                    path,
                    upload,
                    leaf_media_type,
                });
            }
            FlatValue::Text(text) if text.is_empty() => {}
            FlatValue::Text(text) => {
                let value = coerce_text(kind, &path, text)?;
                coerced.values.push((path, value));
            }
        }
    }

    Ok(coerced)
}

/// Coerce one non-empty text value.
pub fn coerce_text(
    kind: Option<&FieldKind>,
    path: &str,
    text: String,
) -> Result<Value, SubmitError> {
    match kind {
        Some(FieldKind::Text | FieldKind::MultilineText) => Ok(Value::String(text)),
        Some(FieldKind::StructuredText) => {
            serde_json::from_str(&text).map_err(|source| SubmitError::InvalidStructuredText {
                path: path.to_string(),
                source,
            })
        }
        Some(FieldKind::Binary { .. }) => {
            tracing::warn!(field = path, "text given for a file field, sending as text");
            Ok(Value::String(text))
        }
        None => {
            tracing::debug!(field = path, "key is not a schema leaf, sending as text");
            Ok(Value::String(text))
        }
    }
}
