//! The submission pipeline: template, coerce, unflatten, encode, dispatch.

use crate::binary::encode_into;
use crate::catalog::Catalog;
use crate::codec::{unflatten, FlatSubmission};
use crate::coerce::{coerce, Coerced};
use crate::dispatch::{DispatchResult, Dispatcher, PreparedRequest, Session, Transport};
use crate::error::SubmitError;
use crate::template::resolve_endpoint;
use crate::types::Operation;

/// Turn a flat submission into a request for `operation`.
///
/// Placeholder keys are consumed by the path and never reach the payload.
/// Uploads are read only after every text value has been coerced.
///
/// # Errors
///
/// Returns `SubmitError` for malformed `json` fields, parent/child key
/// conflicts, and unreadable or clashing uploads.
pub fn prepare(
    operation: &Operation,
    mut submission: FlatSubmission,
) -> Result<PreparedRequest, SubmitError> {
    let path = resolve_endpoint(&operation.endpoint, &mut submission);
    let Coerced { values, binaries } = coerce(&operation.fields, submission)?;
    let mut payload = unflatten(values)?;
    encode_into(binaries, &mut payload)?;

    tracing::debug!(
        operation = %operation.name,
        path = %path,
        fields = payload.len(),
        "submission prepared"
    );
    Ok(PreparedRequest::new(operation.method, path, payload))
}

/// Run one submission end to end. Never fails.
///
/// A submission rejected before dispatch yields an `Unavailable` result and
/// nothing is sent.
pub fn run<T: Transport>(
    dispatcher: &Dispatcher<T>,
    operation: &Operation,
    submission: FlatSubmission,
    session: &mut Session,
) -> DispatchResult {
    match prepare(operation, submission) {
        Ok(request) => dispatcher.dispatch(&request, session),
        Err(e) => {
            tracing::warn!(operation = %operation.name, error = %e, "submission rejected");
            DispatchResult::failed(&e)
        }
    }
}

/// Run a form carrying the reserved `$method`/`$endpoint` keys.
pub fn run_form<T: Transport>(
    dispatcher: &Dispatcher<T>,
    catalog: &Catalog,
    mut form: FlatSubmission,
    session: &mut Session,
) -> DispatchResult {
    match catalog.route_form(&mut form) {
        Ok(operation) => run(dispatcher, operation, form, session),
        Err(e) => {
            tracing::warn!(error = %e, "form not routed");
            DispatchResult::failed(&e)
        }
    }
}
