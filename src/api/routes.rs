use axum::{
    routing::{get, MethodRouter},
    Router,
};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::{handlers, subdoc_handlers};
use crate::config::ApiConfig;
use crate::logic::{describe, enter_scope, pluralize, RelationshipQueue, ScopeRule};
use crate::model::{
    default_invokable_test, InvokablePredicate, MethodDef, ModelDescriptor, ModelRegistry,
    RelationshipDescriptor, RequestContext,
};
use crate::store::DocumentStore;

/// Everything the generator consumes, read once at registration.
#[derive(Clone)]
pub struct ApiOptions {
    /// Prefix for every generated route. Always ends in `/`.
    pub path: String,
    pub lowercase: bool,
    pub pluralize: bool,
    /// Register `PUT` aliases next to the `POST` routes.
    pub puts: bool,
    pub relate: bool,
    /// Models that get a resource but no routes.
    pub exclude: Vec<String>,
    pub filter: ScopeRule,
    pub invokable_method_test: InvokablePredicate,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            lowercase: true,
            pluralize: false,
            puts: false,
            relate: false,
            exclude: Vec::new(),
            filter: ScopeRule::Unscoped,
            invokable_method_test: default_invokable_test(),
        }
    }
}

impl From<&ApiConfig> for ApiOptions {
    fn from(config: &ApiConfig) -> Self {
        Self {
            path: normalize_prefix(&config.path),
            lowercase: config.lowercase,
            pluralize: config.pluralize,
            puts: config.puts,
            relate: config.relate,
            exclude: config.exclude.clone(),
            filter: config
                .filter
                .clone()
                .map(ScopeRule::Fixed)
                .unwrap_or_default(),
            invokable_method_test: default_invokable_test(),
        }
    }
}

impl ApiOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = normalize_prefix(path);
        self
    }

    pub fn lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    pub fn pluralize(mut self, pluralize: bool) -> Self {
        self.pluralize = pluralize;
        self
    }

    pub fn puts(mut self, puts: bool) -> Self {
        self.puts = puts;
        self
    }

    pub fn relate(mut self, relate: bool) -> Self {
        self.relate = relate;
        self
    }

    pub fn exclude(mut self, model: impl Into<String>) -> Self {
        self.exclude.push(model.into());
        self
    }

    pub fn filter(mut self, filter: ScopeRule) -> Self {
        self.filter = filter;
        self
    }

    pub fn invokable_method_test<F>(mut self, test: F) -> Self
    where
        F: Fn(&MethodDef) -> bool + Send + Sync + 'static,
    {
        self.invokable_method_test = Arc::new(test);
        self
    }

    /// Route segment for a model name.
    pub fn route_name(&self, model: &str) -> String {
        let name = if self.pluralize {
            pluralize(model)
        } else {
            model.to_string()
        };
        if self.lowercase {
            name.to_lowercase()
        } else {
            name
        }
    }
}

fn normalize_prefix(path: &str) -> String {
    let trimmed = path.trim();
    let mut prefix = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// One model's endpoints and the shared state its handlers run against.
pub struct Resource<S> {
    pub descriptor: ModelDescriptor,
    pub base_path: String,
    pub(crate) store: Arc<S>,
    pub(crate) scope: ScopeRule,
    pub(crate) relations: RelationshipQueue<S>,
}

impl<S: DocumentStore + 'static> Resource<S> {
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn relations(&self) -> &RelationshipQueue<S> {
        &self.relations
    }

    /// Resolve the scoping filter for this request.
    pub(crate) fn enter(&self, ctx: &mut RequestContext) {
        enter_scope(&self.scope, ctx);
    }

    /// Router for every endpoint of this model, ready to merge.
    pub fn router(self: &Arc<Self>, puts: bool) -> Router {
        let base = self.base_path.clone();
        let item = format!("{base}/:id");
        let member = format!("{item}/:member");
        let element = format!("{member}/:sub_id");

        let mut collection_route: MethodRouter<Arc<Self>> =
            get(handlers::search::<S>).post(handlers::create::<S>);
        let mut item_route: MethodRouter<Arc<Self>> = get(handlers::read::<S>)
            .post(handlers::update::<S>)
            .delete(handlers::delete::<S>);
        let mut member_route: MethodRouter<Arc<Self>> =
            get(handlers::member_get::<S>).post(handlers::member_post::<S>);
        let mut element_route: MethodRouter<Arc<Self>> = get(subdoc_handlers::read_element::<S>)
            .post(subdoc_handlers::update_element::<S>)
            .delete(subdoc_handlers::delete_element::<S>);

        if puts {
            collection_route = collection_route.put(handlers::create::<S>);
            item_route = item_route.put(handlers::update::<S>);
            member_route = member_route.put(handlers::member_put::<S>);
            element_route = element_route.put(subdoc_handlers::update_element::<S>);
        }

        self.log_routes(puts);

        Router::new()
            .route(&base, collection_route)
            .route(&item, item_route)
            .route(&member, member_route)
            .route(&element, element_route)
            .with_state(self.clone())
    }

    fn log_routes(&self, puts: bool) {
        let verbs = |with_put: &[&'static str]| {
            let mut verbs = with_put.to_vec();
            if puts {
                verbs.push("PUT");
            }
            verbs.into_iter().join("|")
        };
        let base = &self.base_path;
        log::debug!("{} {}", verbs(&["GET", "POST"]), base);
        log::debug!("{} {}/:id", verbs(&["GET", "POST", "DELETE"]), base);
        for method in self.descriptor.invokable_methods() {
            log::debug!("POST {}/:id/{}", base, method);
        }
        for field in self.descriptor.subdocument_fields() {
            log::debug!("{} {}/:id/{}", verbs(&["GET", "POST"]), base, field);
            log::debug!(
                "{} {}/:id/{}/:sub_id",
                verbs(&["GET", "POST", "DELETE"]),
                base,
                field
            );
        }
    }
}

/// The generated routes plus a handle on every model's resource.
pub struct GeneratedApi<S> {
    pub router: Router,
    /// Keyed by route name. Excluded models are present but unrouted.
    pub resources: BTreeMap<String, Arc<Resource<S>>>,
}

impl<S: DocumentStore + 'static> GeneratedApi<S> {
    pub fn resource(&self, route_name: &str) -> Option<&Arc<Resource<S>>> {
        self.resources.get(route_name)
    }

    /// Every relationship the generator wired up, across all models.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &RelationshipDescriptor)> {
        self.resources.values().flat_map(|resource| {
            resource
                .descriptor
                .relationships
                .iter()
                .map(move |relation| (resource.descriptor.name.as_str(), relation))
        })
    }

    /// Wait for every background relationship update scheduled so far.
    pub async fn settle(&self) {
        for resource in self.resources.values() {
            resource.relations.settle().await;
        }
    }
}

/// Introspect every registered model and build its REST endpoints.
pub fn generate_api<S: DocumentStore + 'static>(
    registry: &ModelRegistry,
    store: Arc<S>,
    options: &ApiOptions,
) -> GeneratedApi<S> {
    let relations = RelationshipQueue::new(store.clone());
    let mut router = Router::new();
    let mut resources = BTreeMap::new();

    for schema in registry.iter() {
        let descriptor = describe(
            schema,
            registry,
            options.relate,
            &options.invokable_method_test,
        );
        let route_name = options.route_name(&schema.name);
        let resource = Arc::new(Resource {
            descriptor,
            base_path: format!("{}{}", options.path, route_name),
            store: store.clone(),
            scope: options.filter.clone(),
            relations: relations.clone(),
        });

        if options.exclude.iter().any(|name| name == &schema.name) {
            log::debug!("Skipping routes for excluded model {}", schema.name);
        } else {
            router = router.merge(resource.router(options.puts));
        }
        resources.insert(route_name, resource);
    }

    log::info!(
        "Generated REST endpoints for {} model(s) under {}",
        resources.len(),
        options.path
    );
    GeneratedApi { router, resources }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_normalized() {
        assert_eq!(normalize_prefix("/"), "/");
        assert_eq!(normalize_prefix(""), "/");
        assert_eq!(normalize_prefix("/api"), "/api/");
        assert_eq!(normalize_prefix("api/v1/"), "/api/v1/");
    }

    #[test]
    fn route_names_follow_case_and_plural_flags() {
        let options = ApiOptions::new();
        assert_eq!(options.route_name("Task"), "task");

        let options = ApiOptions::new().pluralize(true);
        assert_eq!(options.route_name("Person"), "people");

        let options = ApiOptions::new().lowercase(false).pluralize(true);
        assert_eq!(options.route_name("Company"), "Companies");
    }

    #[test]
    fn config_maps_onto_options() {
        let mut scope = crate::model::Document::new();
        scope.insert("tenant".into(), serde_json::json!("acme"));
        let config = ApiConfig {
            path: "/api".into(),
            lowercase: false,
            pluralize: true,
            puts: true,
            relate: true,
            exclude: vec!["Audit".into()],
            filter: Some(scope),
        };

        let options = ApiOptions::from(&config);
        assert_eq!(options.path, "/api/");
        assert!(options.puts && options.relate && options.pluralize && !options.lowercase);
        assert_eq!(options.exclude, vec!["Audit"]);
        assert!(matches!(options.filter, ScopeRule::Fixed(ref f) if f["tenant"] == "acme"));
    }
}
