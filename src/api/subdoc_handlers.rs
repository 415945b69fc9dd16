//! Endpoints for embedded document arrays.
//!
//! Every operation loads the parent through the scoped id filter first, so
//! an out-of-scope parent is indistinguishable from a missing one.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;

use crate::api::context::parse_body;
use crate::api::handlers::AppState;
use crate::api::routes::Resource;
use crate::error::{Error, Result};
use crate::logic::scoped_id_filter;
use crate::model::{document_id, Document, Id, RequestContext, ID_FIELD};
use crate::store::DocumentStore;

async fn load_parent<S: DocumentStore + 'static>(
    resource: &Resource<S>,
    id: &str,
    field: &str,
    ctx: &RequestContext,
) -> Result<Document> {
    if !resource.descriptor.is_subdocument(field) || !resource.store.is_valid_id(id) {
        return Err(Error::NotFound);
    }
    resource
        .store
        .find_one(&resource.descriptor.name, &scoped_id_filter(id, &ctx.scope), &[])
        .await?
        .ok_or(Error::NotFound)
}

/// The element array for `field`, created when absent or null.
fn elements_mut<'a>(parent: &'a mut Document, field: &str) -> Result<&'a mut Vec<Value>> {
    let slot = parent
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut().ok_or_else(|| {
        Error::BadRequest(format!("field '{field}' does not hold a list of documents"))
    })
}

fn element_position(elements: &[Value], sub_id: &str) -> Option<usize> {
    elements.iter().position(|element| {
        element
            .as_object()
            .and_then(document_id)
            .map(|id| id == sub_id)
            .unwrap_or(false)
    })
}

fn find_element(parent: &Document, field: &str, sub_id: &str) -> Option<Value> {
    let elements = parent.get(field)?.as_array()?;
    element_position(elements, sub_id).map(|index| elements[index].clone())
}

pub(crate) async fn list_elements<S: DocumentStore + 'static>(
    resource: &Resource<S>,
    id: &str,
    field: &str,
    ctx: &RequestContext,
) -> Result<Json<Value>> {
    let parent = load_parent(resource, id, field, ctx).await?;
    Ok(Json(
        parent
            .get(field)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
    ))
}

pub(crate) async fn append_element<S: DocumentStore + 'static>(
    resource: &Resource<S>,
    id: &str,
    field: &str,
    ctx: &RequestContext,
) -> Result<Response> {
    let mut parent = load_parent(resource, id, field, ctx).await?;
    let mut element = ctx.body.clone();
    let element_id = match document_id(&element) {
        Some(existing) if resource.store.is_valid_id(existing) => existing.to_string(),
        _ => resource.store.generate_id(),
    };
    element.insert(ID_FIELD.to_string(), Value::String(element_id.clone()));
    elements_mut(&mut parent, field)?.push(Value::Object(element.clone()));

    let model = &resource.descriptor.name;
    resource
        .store
        .save(model, &parent)
        .await
        .map_err(Error::write_rejected)?;
    log::debug!("Appended {}.{} element {} to {}", model, field, element_id, id);

    let stored = reload_element(resource, id, field, &element_id, ctx)
        .await
        .unwrap_or(Value::Object(element));
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

async fn reload_element<S: DocumentStore + 'static>(
    resource: &Resource<S>,
    id: &str,
    field: &str,
    sub_id: &str,
    ctx: &RequestContext,
) -> Option<Value> {
    let parent = load_parent(resource, id, field, ctx).await.ok()?;
    find_element(&parent, field, sub_id)
}

/// `GET base/:id/:field/:sub_id`
pub async fn read_element<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    Path((id, field, sub_id)): Path<(Id, String, Id)>,
    mut ctx: RequestContext,
) -> Result<Json<Value>> {
    resource.enter(&mut ctx);
    let parent = load_parent(&resource, &id, &field, &ctx).await?;
    find_element(&parent, &field, &sub_id)
        .map(Json)
        .ok_or(Error::NotFound)
}

/// `POST base/:id/:field/:sub_id`: copy body properties onto the element.
pub async fn update_element<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    Path((id, field, sub_id)): Path<(Id, String, Id)>,
    mut ctx: RequestContext,
    body: Bytes,
) -> Result<Json<Value>> {
    ctx.body = parse_body(&body)?;
    resource.enter(&mut ctx);
    let mut parent = load_parent(&resource, &id, &field, &ctx).await?;

    let elements = elements_mut(&mut parent, &field)?;
    let index = element_position(elements, &sub_id).ok_or(Error::NotFound)?;
    if let Value::Object(element) = &mut elements[index] {
        for (name, value) in &ctx.body {
            if name != ID_FIELD {
                element.insert(name.clone(), value.clone());
            }
        }
    }
    let updated = elements[index].clone();

    resource
        .store
        .save(&resource.descriptor.name, &parent)
        .await
        .map_err(Error::write_rejected)?;
    Ok(Json(updated))
}

/// `DELETE base/:id/:field/:sub_id`
pub async fn delete_element<S: DocumentStore + 'static>(
    State(resource): State<AppState<S>>,
    Path((id, field, sub_id)): Path<(Id, String, Id)>,
    mut ctx: RequestContext,
) -> Result<StatusCode> {
    resource.enter(&mut ctx);
    let mut parent = load_parent(&resource, &id, &field, &ctx).await?;

    let elements = elements_mut(&mut parent, &field)?;
    let index = element_position(elements, &sub_id).ok_or(Error::NotFound)?;
    elements.remove(index);

    resource
        .store
        .save(&resource.descriptor.name, &parent)
        .await
        .map_err(Error::write_rejected)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn elements_are_located_by_id() {
        let mut parent = json!({"notes": [{"_id": "a", "body": "x"}, {"_id": "b", "body": "y"}]})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(find_element(&parent, "notes", "b").unwrap()["body"], json!("y"));
        assert!(find_element(&parent, "notes", "c").is_none());
        assert!(find_element(&parent, "missing", "a").is_none());

        elements_mut(&mut parent, "tags").unwrap().push(json!({"_id": "t"}));
        assert_eq!(parent["tags"], json!([{"_id": "t"}]));

        parent.insert("title".into(), json!("scalar"));
        assert!(matches!(
            elements_mut(&mut parent, "title"),
            Err(Error::BadRequest(_))
        ));
    }
}
