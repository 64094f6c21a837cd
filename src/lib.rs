//! formcast
//!
//! Schema-driven request forms for manual API testing.
//!
//! A small catalog of operations (name, endpoint template, method, field
//! schema) is enough to describe every form. A filled-in form arrives as a
//! flat map keyed by dot paths; this crate turns it into the nested JSON
//! payload, fills the endpoint's `:placeholders`, encodes uploads as `data:`
//! URLs, and dispatches the request.
//!
//! # Example
//!
//! ```
//! use formcast::{prepare, Catalog, FlatSubmission};
//! use serde_json::json;
//!
//! let catalog = Catalog::builtin().unwrap();
//! let op = catalog.get("Update Post").unwrap();
//!
//! let submission = FlatSubmission::new()
//!     .with("id", "7")
//!     .with("content", "new text")
//!     .with("options.backgroundColor", "");
//!
//! let request = prepare(op, submission).unwrap();
//!
//! // The placeholder is consumed by the path; the empty node is pruned
//! assert_eq!(request.path, "/api/posts/7");
//! assert_eq!(request.body, Some(json!({ "content": "new text" })));
//! ```
//!
//! # Field Types
//!
//! | Catalog tag | Kind | Sent as |
//! |-------------|------|---------|
//! | `"input"` | `Text` | string, verbatim |
//! | `"textarea"` | `MultilineText` | string, verbatim |
//! | `"json"` | `StructuredText` | parsed JSON value |
//! | `"file"` / `"file:<type>"` | `Binary` | `data:<type>;base64,...` under the bare field name |
//! | object | node | nested object |
//!
//! Empty values are never sent, so any subset of fields can be filled in.

mod binary;
mod catalog;
mod codec;
mod coerce;
mod dispatch;
mod error;
mod pipeline;
mod template;
mod types;

pub use binary::{
    decode_data_url, encode_into, encode_pending, to_data_url, BinaryUpload, DecodedData,
    PendingBinary, DEFAULT_MEDIA_TYPE,
};
pub use catalog::{validate_document, Catalog};
pub use codec::{
    flatten, is_omitted, unflatten, FlatSubmission, FlatValue, ENDPOINT_KEY, METHOD_KEY,
};
pub use coerce::{coerce, coerce_text, Coerced};
pub use dispatch::{
    encode_query, DispatchResult, Dispatcher, PreparedRequest, RawResponse, ResponseStatus,
    Session, Transport, FAILURE_MESSAGE, JSON_CONTENT_TYPE,
};
pub use error::{CatalogError, CatalogIssue, SubmitError, TransportError};
pub use pipeline::{prepare, run, run_form};
pub use template::{placeholders, resolve_endpoint};
pub use types::{
    json_type_name, ClientOptions, Field, FieldKind, FieldSchema, LeafField, Method, Operation,
    PATH_SEPARATOR,
};

#[cfg(feature = "remote")]
pub use dispatch::HttpTransport;
