//! Binary uploads and their `data:` URL encoding.
//!
//! A file travels inside the JSON body as a single self-describing string,
//! `data:<media type>;base64,<payload>`, so no multipart transport is needed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::error::SubmitError;
use crate::types::PATH_SEPARATOR;

/// Media type assumed when neither the field nor the upload declares one.
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64";

#[derive(Debug)]
enum BinarySource {
    File(PathBuf),
    Memory(Vec<u8>),
}

/// A binary value collected for a file control.
///
/// Owned by one submission and consumed when it is encoded.
#[derive(Debug)]
pub struct BinaryUpload {
    source: BinarySource,
    media_type: Option<String>,
}

impl BinaryUpload {
    /// Upload read from disk at encoding time.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: BinarySource::File(path.into()),
            media_type: None,
        }
    }

    /// Upload already held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            source: BinarySource::Memory(bytes),
            media_type: None,
        }
    }

    /// Set the upload's own media type.
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn declared_media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// File path, for uploads read from disk.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            BinarySource::File(path) => Some(path),
            BinarySource::Memory(_) => None,
        }
    }

    /// Read the whole content into memory.
    pub fn read(self) -> std::io::Result<Vec<u8>> {
        match self.source {
            BinarySource::File(path) => std::fs::read(path),
            BinarySource::Memory(bytes) => Ok(bytes),
        }
    }
}

/// A binary value set aside during coercion, waiting to be encoded.
#[derive(Debug)]
pub struct PendingBinary {
    /// Flat submission key of the file control.
    pub path: String,
    pub upload: BinaryUpload,
    /// Media type declared on the schema leaf, if any.
    pub leaf_media_type: Option<String>,
}

impl PendingBinary {
    /// Payload key the encoded value is stored under: the last path segment.
    pub fn target(&self) -> &str {
        self.path
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or(self.path.as_str())
    }
}

/// Encode bytes as `data:<media type>;base64,<payload>`.
pub fn to_data_url(media_type: &str, bytes: &[u8]) -> String {
    format!(
        "{}{}{},{}",
        DATA_URL_PREFIX,
        media_type,
        BASE64_MARKER,
        STANDARD.encode(bytes)
    )
}

/// Read and encode one pending upload.
///
/// Media type precedence: schema leaf, then the upload itself, then
/// [`DEFAULT_MEDIA_TYPE`]. Returns `None` for an empty upload.
///
/// # Errors
///
/// Returns `SubmitError::BinaryRead` if the upload cannot be read.
pub fn encode_pending(pending: PendingBinary) -> Result<Option<String>, SubmitError> {
    let PendingBinary {
        path,
        upload,
        leaf_media_type,
    } = pending;

    let media_type = leaf_media_type
        .or_else(|| upload.media_type.clone())
        .unwrap_or_else(|| {
            tracing::debug!(field = %path, "no media type declared, assuming {}", DEFAULT_MEDIA_TYPE);
            DEFAULT_MEDIA_TYPE.to_string()
        });

    let bytes = upload
        .read()
        .map_err(|source| SubmitError::BinaryRead {
            path: path.clone(),
            source,
        })?;

    if bytes.is_empty() {
        tracing::debug!(field = %path, "empty upload treated as not provided");
        return Ok(None);
    }

    tracing::debug!(field = %path, media_type = %media_type, size = bytes.len(), "encoded upload");
    Ok(Some(to_data_url(&media_type, &bytes)))
}

/// Encode every pending upload into `payload`, each under its bare field name.
///
/// All uploads are read before anything is inserted. Empty uploads drop out
/// first, so only the files actually provided compete for a key.
///
/// # Errors
///
/// Returns `SubmitError::BinaryRead` if any upload cannot be read,
/// `SubmitError::DuplicateBinaryTarget` if two provided uploads share a bare
/// name, or `SubmitError::BinaryTargetTaken` if the bare name already holds a
/// payload value. `payload` is left untouched on error.
pub fn encode_into(
    pending: Vec<PendingBinary>,
    payload: &mut Map<String, Value>,
) -> Result<(), SubmitError> {
    let mut encoded = Vec::with_capacity(pending.len());
    for item in pending {
        let path = item.path.clone();
        let target = item.target().to_string();
        if let Some(value) = encode_pending(item)? {
            encoded.push((path, target, value));
        }
    }

    let mut targets = BTreeSet::new();
    for (path, target, _) in &encoded {
        if !targets.insert(target.as_str()) {
            return Err(SubmitError::DuplicateBinaryTarget {
                name: target.clone(),
            });
        }
        if payload.contains_key(target) {
            return Err(SubmitError::BinaryTargetTaken {
                path: path.clone(),
                name: target.clone(),
            });
        }
    }

    for (_, target, value) in encoded {
        payload.insert(target, Value::String(value));
    }
    Ok(())
}

/// Content of a decoded `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedData {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Decode a `data:` URL produced by [`to_data_url`].
///
/// A bare base64 string without the preamble is read as [`DEFAULT_MEDIA_TYPE`].
/// Returns `None` when the text is not base64 data.
pub fn decode_data_url(text: &str) -> Option<DecodedData> {
    let (media_type, encoded) = match text.strip_prefix(DATA_URL_PREFIX) {
        Some(rest) => {
            let (header, encoded) = rest.split_once(',')?;
            let media_type = header.strip_suffix(BASE64_MARKER)?;
            let media_type = if media_type.is_empty() {
                DEFAULT_MEDIA_TYPE
            } else {
                media_type
            };
            (media_type, encoded)
        }
        None => (DEFAULT_MEDIA_TYPE, text),
    };

    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    Some(DecodedData {
        media_type: media_type.to_string(),
        bytes,
    })
}
