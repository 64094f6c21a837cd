//! Endpoint templating: `:name` placeholders filled from the submission.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::codec::{FlatSubmission, FlatValue};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\w+)").expect("placeholder pattern compiles"));

/// Placeholder names in an endpoint template, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Substitute every placeholder with the same-named top-level submission value.
///
/// Each consumed key is removed from `submission`, so a path parameter never
/// reaches the body or query. Values are percent-encoded. A missing, empty,
/// or binary value resolves to an empty segment.
pub fn resolve_endpoint(template: &str, submission: &mut FlatSubmission) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match submission.take(name) {
                Some(FlatValue::Text(text)) => urlencoding::encode(&text).into_owned(),
                Some(FlatValue::Binary(_)) => {
                    tracing::warn!(placeholder = name, "file value cannot fill a path segment");
                    String::new()
                }
                None => {
                    tracing::debug!(placeholder = name, "placeholder has no value");
                    String::new()
                }
            }
        })
        .into_owned()
}
