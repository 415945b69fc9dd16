use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{Error, Result};
use crate::logic::scope::{apply_scope, merge_unscoped, scoped_id_filter};
use crate::model::{Document, MethodFn, MethodResponse, ModelDescriptor, RequestContext, ID_FIELD};
use crate::store::DocumentStore;

/// Run `method` on `document`, turning failures and panics into `error` answers.
pub fn call(method: &MethodFn, document: &mut Document, ctx: &RequestContext) -> MethodResponse {
    match catch_unwind(AssertUnwindSafe(|| method(document, ctx))) {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => MethodResponse::error(err.to_string()),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "method panicked".to_string());
            MethodResponse::error(message)
        }
    }
}

/// Load the scoped document `id`, apply the request body, run the named
/// method and persist the result unless the method answered with an error.
///
/// Unknown or non-invokable names are rejected before anything is loaded.
pub async fn invoke_method<S: DocumentStore + ?Sized>(
    store: &S,
    descriptor: &ModelDescriptor,
    id: &str,
    name: &str,
    ctx: &RequestContext,
) -> Result<MethodResponse> {
    let method = descriptor.invokable(name).ok_or(Error::NotFound)?;
    if !store.is_valid_id(id) {
        return Err(Error::NotFound);
    }

    let filter = scoped_id_filter(id, &ctx.scope);
    let mut document = store
        .find_one(&descriptor.name, &filter, &[])
        .await?
        .ok_or(Error::NotFound)?;
    merge_unscoped(&mut document, &ctx.body, &ctx.scope);

    let stored_id = document.get(ID_FIELD).cloned().unwrap_or(Value::Null);
    let response = call(method, &mut document, ctx);
    if response.is_error() {
        log::debug!("{}.{} on {} answered with an error", descriptor.name, name, id);
        return Ok(response);
    }

    document.insert(ID_FIELD.to_string(), stored_id);
    apply_scope(&mut document, &ctx.scope);
    if let Err(err) = store.save(&descriptor.name, &document).await {
        log::warn!("Failed to save {} {} after {}: {}", descriptor.name, id, name, err);
        return Ok(MethodResponse::error(err.to_string()));
    }
    Ok(response)
}
