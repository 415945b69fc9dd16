use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::api::context::parse_body;
use crate::api::routes::Resource;
use crate::api::subdoc_handlers;
use crate::error::{Error, Result};
use crate::logic::{
    apply_scope, invoke_method, merge_unscoped, on_create, on_delete, parse_populate,
    scoped_id_filter, translate, POPULATE_PARAM,
};
use crate::model::{Id, RequestContext};
use crate::store::DocumentStore;

pub type AppState<S> = Arc<Resource<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET base`: filtered search, or `[count]` with `__count`.
pub async fn search<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    mut ctx: RequestContext,
) -> Result<Json<Value>> {
    resource.enter(&mut ctx);
    let descriptor = &resource.descriptor;
    let mut query = translate(&ctx.query, descriptor.geo_field.as_deref())?;
    apply_scope(&mut query.filter, &ctx.scope);

    if query.count {
        let count = resource.store.count(&descriptor.name, &query.filter).await?;
        return Ok(Json(Value::Array(vec![Value::from(count)])));
    }

    let documents = resource
        .store
        .find(&descriptor.name, &query.filter, &query.options)
        .await?;
    log::debug!("{} search matched {} document(s)", descriptor.name, documents.len());
    Ok(Json(Value::Array(
        documents.into_iter().map(Value::Object).collect(),
    )))
}

/// `POST base`: insert the scoped body, or hand out a blank record when empty.
pub async fn create<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    mut ctx: RequestContext,
    body: Bytes,
) -> Result<Response> {
    ctx.body = parse_body(&body)?;
    resource.enter(&mut ctx);
    let descriptor = &resource.descriptor;

    if ctx.body.is_empty() {
        return Ok(Json(descriptor.blank()).into_response());
    }

    let mut document = ctx.body.clone();
    apply_scope(&mut document, &ctx.scope);
    let created = resource
        .store
        .insert(&descriptor.name, document)
        .await
        .map_err(Error::write_rejected)?;

    let tasks = on_create(&descriptor.relationships, &created);
    if !tasks.is_empty() {
        drop(resource.relations.schedule(tasks));
    }
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// `GET base/:id`: the scoped document with every declared field present.
pub async fn read<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    Path(id): Path<Id>,
    mut ctx: RequestContext,
) -> Result<Json<Value>> {
    resource.enter(&mut ctx);
    let descriptor = &resource.descriptor;
    if !resource.store.is_valid_id(&id) {
        return Err(Error::NotFound);
    }

    let populate = ctx
        .query
        .get(POPULATE_PARAM)
        .map(|raw| parse_populate(raw))
        .unwrap_or_default();
    let mut document = resource
        .store
        .find_one(&descriptor.name, &scoped_id_filter(&id, &ctx.scope), &populate)
        .await?
        .ok_or(Error::NotFound)?;
    descriptor.fill_missing(&mut document);
    Ok(Json(Value::Object(document)))
}

/// `POST base/:id`: merge the body into the scoped document and save it.
pub async fn update<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    Path(id): Path<Id>,
    mut ctx: RequestContext,
    body: Bytes,
) -> Result<StatusCode> {
    ctx.body = parse_body(&body)?;
    resource.enter(&mut ctx);
    let descriptor = &resource.descriptor;
    if !resource.store.is_valid_id(&id) {
        return Err(Error::NotFound);
    }

    let mut document = resource
        .store
        .find_one(&descriptor.name, &scoped_id_filter(&id, &ctx.scope), &[])
        .await?
        .ok_or(Error::NotFound)?;
    merge_unscoped(&mut document, &ctx.body, &ctx.scope);
    resource
        .store
        .save(&descriptor.name, &document)
        .await
        .map_err(Error::write_rejected)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE base/:id`: remove the scoped document and unlink its references.
pub async fn delete<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    Path(id): Path<Id>,
    mut ctx: RequestContext,
) -> Result<StatusCode> {
    resource.enter(&mut ctx);
    let descriptor = &resource.descriptor;
    if !resource.store.is_valid_id(&id) {
        return Err(Error::NotFound);
    }

    let removed = resource
        .store
        .find_one_and_remove(&descriptor.name, &scoped_id_filter(&id, &ctx.scope))
        .await?
        .ok_or(Error::NotFound)?;

    let tasks = on_delete(&descriptor.relationships, &removed);
    if !tasks.is_empty() {
        drop(resource.relations.schedule(tasks));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET base/:id/:member`: list a sub-document field.
pub async fn member_get<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    Path((id, member)): Path<(Id, String)>,
    mut ctx: RequestContext,
) -> Result<Json<Value>> {
    resource.enter(&mut ctx);
    subdoc_handlers::list_elements(&resource, &id, &member, &ctx).await
}

/// `POST base/:id/:member`: invoke a method, or append to a sub-document field.
pub async fn member_post<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    Path((id, member)): Path<(Id, String)>,
    mut ctx: RequestContext,
    body: Bytes,
) -> Result<Response> {
    let descriptor = &resource.descriptor;
    let invokable = descriptor.invokable(&member).is_some();
    if !invokable && !descriptor.is_subdocument(&member) {
        return Err(Error::NotFound);
    }
    ctx.body = parse_body(&body)?;
    ctx.params.insert("id".to_string(), id.clone());
    resource.enter(&mut ctx);

    if invokable {
        let response =
            invoke_method(resource.store.as_ref(), descriptor, &id, &member, &ctx).await?;
        let status = if response.is_error() {
            log::warn!("{}.{} on {} failed: {:?}", descriptor.name, member, id, response);
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        return Ok((status, Json(response)).into_response());
    }

    subdoc_handlers::append_element(&resource, &id, &member, &ctx).await
}

/// `PUT base/:id/:member`: append to a sub-document field.
pub async fn member_put<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    Path((id, member)): Path<(Id, String)>,
    mut ctx: RequestContext,
    body: Bytes,
) -> Result<Response> {
    if !resource.descriptor.is_subdocument(&member) {
        return Err(Error::NotFound);
    }
    ctx.body = parse_body(&body)?;
    resource.enter(&mut ctx);
    subdoc_handlers::append_element(&resource, &id, &member, &ctx).await
}
