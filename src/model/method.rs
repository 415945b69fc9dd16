use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::model::{Document, RequestContext};

/// The only three answers an invoked method can give.
///
/// Serializes as `{"redirect": url}`, `{"alert": message}` or `{"error": message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodResponse {
    Redirect(String),
    Alert(String),
    Error(String),
}

impl MethodResponse {
    pub fn redirect(url: impl Into<String>) -> Self {
        Self::Redirect(url.into())
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self::Alert(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Instance operation run against a loaded document.
///
/// Mutations made to the document are saved once the method answers with a
/// redirect or an alert.
pub type MethodFn =
    Arc<dyn Fn(&mut Document, &RequestContext) -> anyhow::Result<MethodResponse> + Send + Sync>;

#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub handler: MethodFn,
    /// Marker consulted by the default invokable-method test.
    pub web_invokable: bool,
}

impl MethodDef {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Document, &RequestContext) -> anyhow::Result<MethodResponse>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            web_invokable: false,
        }
    }

    pub fn web_invokable(mut self) -> Self {
        self.web_invokable = true;
        self
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("web_invokable", &self.web_invokable)
            .finish()
    }
}

/// Decides which declared methods may be called over HTTP.
pub type InvokablePredicate = Arc<dyn Fn(&MethodDef) -> bool + Send + Sync>;

pub fn default_invokable_test() -> InvokablePredicate {
    Arc::new(|method: &MethodDef| method.web_invokable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_serialize_to_single_key_objects() {
        let redirect = serde_json::to_value(MethodResponse::redirect("/task.html")).unwrap();
        assert_eq!(redirect, serde_json::json!({"redirect": "/task.html"}));

        let error = serde_json::to_value(MethodResponse::error("boom")).unwrap();
        assert_eq!(error, serde_json::json!({"error": "boom"}));
        assert!(MethodResponse::error("boom").is_error());
        assert!(!MethodResponse::alert("hi").is_error());
    }

    #[test]
    fn default_test_honours_the_marker() {
        let test = default_invokable_test();
        let hidden = MethodDef::new("hidden", |_, _| Ok(MethodResponse::alert("no")));
        let exposed = hidden.clone().web_invokable();
        assert!(!test(&hidden));
        assert!(test(&exposed));
    }
}
