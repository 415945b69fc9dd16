use axum::{routing::get, serve, Router};
use docrest::api::{generate_api, health_check, ApiOptions};
use docrest::config::AppConfig;
use docrest::model::{
    document_id, Document, FieldDef, MethodDef, MethodResponse, ModelRegistry, ModelSchema,
    RequestContext,
};
use docrest::store::{DocumentStore, MemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    // Load configuration
    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{}",
        config.server.host,
        config.server.port
    );

    let registry = ModelRegistry::new().with(task_schema());
    let store = Arc::new(MemoryStore::with_registry(&registry));
    seed_tasks(store.as_ref()).await?;

    let api = generate_api(&registry, store, &ApiOptions::from(&config.api));
    let app = Router::new()
        .route("/health", get(health_check))
        .merge(api.router)
        .fallback_service(ServeDir::new("html"));

    run_server(app, &config).await?;

    Ok(())
}

fn task_schema() -> ModelSchema {
    ModelSchema::new("Task")
        .field(FieldDef::value("description").required())
        .field(FieldDef::value("done").default_value(json!(false)).required())
        .method(MethodDef::new("upper_case", upper_case).web_invokable())
}

fn upper_case(task: &mut Document, _ctx: &RequestContext) -> anyhow::Result<MethodResponse> {
    let description = task
        .get("description")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("task has no description"))?
        .to_uppercase();
    task.insert("description".to_string(), Value::String(description));
    let id = document_id(task).unwrap_or_default();
    Ok(MethodResponse::redirect(format!("/task.html?_id={id}")))
}

/// Make sure there are at least two tasks to look at.
async fn seed_tasks(store: &MemoryStore) -> anyhow::Result<()> {
    if !store.is_empty("Task") {
        return Ok(());
    }
    for description in ["Task A", "Task B"] {
        let mut task = Document::new();
        task.insert("description".to_string(), json!(description));
        store.insert("Task", task).await?;
    }
    log::info!("Seeded {} tasks", store.len("Task"));
    Ok(())
}

async fn run_server(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("docrest server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
