use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Query},
    http::{request::Parts, HeaderMap, StatusCode},
};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{Document, RequestContext};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Builds a [`RequestContext`] from the request line and headers.
///
/// Route parameters and the body are attached by the handler.
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let query = if parts.uri.query().is_some() {
            Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
                .map(|Query(query)| query)
                .map_err(|_| StatusCode::BAD_REQUEST)?
        } else {
            HashMap::new()
        };

        Ok(RequestContext {
            user_id: extract_header_value(&parts.headers, USER_ID_HEADER),
            headers: header_map(&parts.headers),
            query,
            ..RequestContext::default()
        })
    }
}

fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

/// Decode a request body into a document. An empty body is an empty document.
pub fn parse_body(body: &Bytes) -> Result<Document> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(Error::BadRequest("request body must be a JSON object".to_string())),
        Err(err) => Err(Error::BadRequest(format!("invalid JSON body: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn extracts_user_headers_and_query() {
        let request = Request::builder()
            .uri("/tasks?done=false&__limit=5")
            .header("X-User-Id", "alice")
            .header("X-Tenant", "acme")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.user_id.as_deref(), Some("alice"));
        assert_eq!(ctx.header("x-tenant"), Some("acme"));
        assert_eq!(ctx.query["done"], "false");
        assert_eq!(ctx.query["__limit"], "5");
        assert!(ctx.body.is_empty());
    }

    #[test]
    fn bodies_must_be_objects() {
        assert!(parse_body(&Bytes::new()).unwrap().is_empty());
        assert!(parse_body(&Bytes::from_static(b"  \n")).unwrap().is_empty());
        assert_eq!(
            parse_body(&Bytes::from_static(br#"{"a": 1}"#)).unwrap()["a"],
            serde_json::json!(1)
        );
        assert!(matches!(
            parse_body(&Bytes::from_static(b"[1]")),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            parse_body(&Bytes::from_static(b"{nope")),
            Err(Error::BadRequest(_))
        ));
    }
}
