use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::model::{Document, RequestContext, ID_FIELD};

/// Where the mandatory filter fields for a request come from.
#[derive(Clone, Default)]
pub enum ScopeRule {
    #[default]
    Unscoped,
    Fixed(Document),
    Computed(Arc<dyn Fn(&RequestContext) -> Document + Send + Sync>),
}

impl ScopeRule {
    pub fn fixed(fields: Document) -> Self {
        Self::Fixed(fields)
    }

    pub fn computed<F>(rule: F) -> Self
    where
        F: Fn(&RequestContext) -> Document + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(rule))
    }

    /// The scoping mapping in force for `ctx`.
    pub fn resolve(&self, ctx: &RequestContext) -> Document {
        match self {
            Self::Unscoped => Document::new(),
            Self::Fixed(fields) => fields.clone(),
            Self::Computed(rule) => rule(ctx),
        }
    }
}

impl fmt::Debug for ScopeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unscoped => f.write_str("Unscoped"),
            Self::Fixed(fields) => f.debug_tuple("Fixed").field(fields).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Resolve the rule for `ctx` and record the result on it.
pub fn enter_scope(rule: &ScopeRule, ctx: &mut RequestContext) {
    ctx.scope = rule.resolve(ctx);
}

/// Overwrite `fields` with every scoping value. Client values always lose.
pub fn apply_scope(fields: &mut Document, scope: &Document) {
    for (name, value) in scope {
        fields.insert(name.clone(), value.clone());
    }
}

/// `{_id: id}` narrowed by the scope.
pub fn scoped_id_filter(id: &str, scope: &Document) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    apply_scope(&mut filter, scope);
    filter
}

/// Copy body properties onto `document`, dropping anything the scope covers
/// as well as the identifier.
pub fn merge_unscoped(document: &mut Document, body: &Document, scope: &Document) {
    for (name, value) in body {
        if name == ID_FIELD || scope.contains_key(name) {
            continue;
        }
        document.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn scope_overrides_client_values() {
        let scope = doc(json!({"owner": "alice"}));
        let mut fields = doc(json!({"owner": "bob", "title": "x"}));
        apply_scope(&mut fields, &scope);
        assert_eq!(Value::Object(fields), json!({"owner": "alice", "title": "x"}));
    }

    #[test]
    fn id_filter_keeps_scope() {
        let scope = doc(json!({"owner": "alice", "_id": "spoofed"}));
        let filter = scoped_id_filter("abc", &scope);
        assert_eq!(Value::Object(filter), json!({"_id": "spoofed", "owner": "alice"}));
        assert_eq!(
            Value::Object(scoped_id_filter("abc", &Document::new())),
            json!({"_id": "abc"})
        );
    }

    #[test]
    fn merge_skips_scoped_fields_and_id() {
        let scope = doc(json!({"owner": "alice"}));
        let mut stored = doc(json!({"_id": "1", "owner": "alice", "title": "old"}));
        let body = doc(json!({"_id": "2", "owner": "bob", "title": "new"}));

        merge_unscoped(&mut stored, &body, &scope);
        assert_eq!(
            Value::Object(stored),
            json!({"_id": "1", "owner": "alice", "title": "new"})
        );
    }

    #[test]
    fn computed_rules_see_the_request() {
        let rule = ScopeRule::computed(|ctx| {
            let mut scope = Document::new();
            if let Some(user) = &ctx.user_id {
                scope.insert("owner".into(), json!(user));
            }
            scope
        });
        let mut ctx = RequestContext::for_user("carol");
        enter_scope(&rule, &mut ctx);
        assert_eq!(Value::Object(ctx.scope), json!({"owner": "carol"}));

        assert!(ScopeRule::Unscoped.resolve(&RequestContext::new()).is_empty());
        let fixed = ScopeRule::fixed(doc(json!({"tenant": "acme"})));
        assert_eq!(fixed.resolve(&RequestContext::new())["tenant"], json!("acme"));
    }
}
