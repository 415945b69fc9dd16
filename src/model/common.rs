use serde_json::{Map, Value};
use uuid::Uuid;

pub type Id = String;

/// A stored record, exactly as it travels over the wire.
pub type Document = Map<String, Value>;

/// Name of the identifier field on every stored document and embedded element.
pub const ID_FIELD: &str = "_id";

const OBJECT_ID_LEN: usize = 24;

/// Generate a 24 character lowercase hex identifier.
pub fn generate_id() -> Id {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(OBJECT_ID_LEN);
    id
}

/// Whether `id` has the shape of an identifier produced by [`generate_id`].
pub fn is_object_id(id: &str) -> bool {
    id.len() == OBJECT_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// The `_id` of a document as a string, if it has one.
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Flatten a reference value into the list of ids it holds.
///
/// Scalars become a one element list, arrays keep their string members and
/// `null` yields nothing.
pub fn reference_ids(value: &Value) -> Vec<Id> {
    match value {
        Value::String(id) => vec![id.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id.clone()),
                Value::Object(doc) => document_id(doc).map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::Object(doc) => document_id(doc).map(str::to_string).into_iter().collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_are_object_ids() {
        for _ in 0..32 {
            let id = generate_id();
            assert!(is_object_id(&id), "{id} should be a valid id");
        }
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_object_id(""));
        assert!(!is_object_id("123"));
        assert!(!is_object_id("zzzzzzzzzzzzzzzzzzzzzzzz"));
        assert!(!is_object_id("0123456789abcdef012345678"));
        assert!(is_object_id("0123456789ABCDEF01234567"));
    }

    #[test]
    fn reference_ids_normalizes_scalars_and_lists() {
        assert_eq!(reference_ids(&json!("a")), vec!["a"]);
        assert_eq!(reference_ids(&json!(["a", "b", 3])), vec!["a", "b"]);
        assert_eq!(reference_ids(&json!({"_id": "c", "name": "x"})), vec!["c"]);
        assert!(reference_ids(&Value::Null).is_empty());
    }
}
