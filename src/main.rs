use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use bankwise::config::Config;
use bankwise::db;
use bankwise::models;
use bankwise::services::document_service::{HashEmbedder, PlainTextExtractor};
use bankwise::services::vector_store::{InMemoryVectorStore, QdrantVectorStore, VectorStore};
use bankwise::services::{
    AnalyticsService, ChatOrchestrator, DocumentService, LLMServiceImpl, QuerySpecParser,
    RagContextService, SqlGenerator,
};
use bankwise::utils::JwtUtil;
use bankwise::{AppState, handlers, middleware};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::chat::chat_turn,
        handlers::documents::upload_document,
        handlers::documents::get_document,
        handlers::artifacts::list_artifacts,
        handlers::artifacts::get_artifact,
        handlers::artifacts::create_artifact,
        handlers::artifacts::add_artifact_version,
        handlers::artifacts::delete_artifact,
        handlers::llm::list_providers,
        handlers::llm::get_provider,
        handlers::llm::get_active_provider,
        handlers::llm::create_provider,
        handlers::llm::update_provider,
        handlers::llm::delete_provider,
        handlers::llm::activate_provider,
        handlers::llm::deactivate_provider,
        handlers::llm::test_provider_connection,
        handlers::llm::get_status,
    ),
    components(
        schemas(
            models::Document,
            models::PageContent,
            models::ExtractionStatus,
            models::Artifact,
            models::ArtifactType,
            models::ArtifactVersion,
            models::ChatMessage,
            models::MessageRole,
            models::QuerySpec,
        )
    ),
    tags(
        (name = "Chat", description = "Conversational turn endpoint (JSON or SSE)"),
        (name = "Documents", description = "Document ingest and lookup"),
        (name = "Artifacts", description = "Chart/markdown/code artifact CRUD"),
        (name = "LLM", description = "LLM provider management"),
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(utoipa::openapi::security::Http::new(
                utoipa::openapi::security::HttpAuthScheme::Bearer,
            )),
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("bankwise.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("bankwise starting up");
    tracing::info!("configuration loaded successfully");

    let db_pool = db::create_sqlite_pool(&config.database.app_database_url).await?;
    tracing::info!("application database pool created");

    let warehouse_pool = db::create_warehouse_pool(&config.database.warehouse_database_url).await?;
    tracing::info!("KPI warehouse database pool created");

    let jwt_util = Arc::new(JwtUtil::new(&config.auth.jwt_secret));

    let llm_service =
        Arc::new(LLMServiceImpl::new(db_pool.clone(), config.llm.enabled, config.llm.cache_ttl_hours()));
    tracing::info!(enabled = config.llm.enabled, "LLM service initialized");

    let vector_store: Arc<dyn VectorStore> = if config.vector_store.url.starts_with("memory") {
        tracing::warn!("vector store configured as in-memory; not suitable for production");
        Arc::new(InMemoryVectorStore::new())
    } else {
        Arc::new(QdrantVectorStore::new(config.vector_store.url.clone(), config.vector_store.api_key.clone()))
    };

    let embedder = Arc::new(HashEmbedder);
    let extractor = Arc::new(PlainTextExtractor);

    let query_spec_parser = Arc::new(QuerySpecParser::new(Some(Arc::clone(&llm_service))));
    let rag_context_service = Arc::new(RagContextService::new(Arc::clone(&vector_store), embedder.clone()));
    let sql_generator = Arc::new(SqlGenerator::new(Some(Arc::clone(&llm_service))));
    let analytics_service = Arc::new(AnalyticsService::new(warehouse_pool.clone()));
    let document_service =
        Arc::new(DocumentService::new(db_pool.clone(), Arc::clone(&vector_store), extractor, embedder));

    let chat_orchestrator = Arc::new(ChatOrchestrator::new(
        db_pool.clone(),
        Arc::clone(&query_spec_parser),
        Arc::clone(&rag_context_service),
        Arc::clone(&sql_generator),
        Arc::clone(&analytics_service),
        Arc::clone(&document_service),
        Arc::clone(&llm_service),
        config.chat.stream_queue_size,
        config.chat.max_tokens,
        config.chat.turn_timeout_secs,
    ));

    let app_state = Arc::new(AppState {
        db: db_pool.clone(),
        warehouse_db: warehouse_pool,
        llm_service: Arc::clone(&llm_service),
        rag_context_service,
        query_spec_parser,
        sql_generator,
        analytics_service,
        document_service,
        chat_orchestrator,
        jwt_secret: Arc::from(config.auth.jwt_secret.as_str()),
    });

    let auth_state = middleware::AuthState { jwt_util: Arc::clone(&jwt_util) };

    let protected_routes = Router::new()
        .route("/api/chat", post(handlers::chat::chat_turn))
        .route("/api/documents", post(handlers::documents::upload_document))
        .route("/api/documents/:id", get(handlers::documents::get_document))
        .route(
            "/api/artifacts",
            get(handlers::artifacts::list_artifacts).post(handlers::artifacts::create_artifact),
        )
        .route(
            "/api/artifacts/:id",
            get(handlers::artifacts::get_artifact).delete(handlers::artifacts::delete_artifact),
        )
        .route("/api/artifacts/:id/versions", post(handlers::artifacts::add_artifact_version))
        .route("/api/llm/status", get(handlers::llm::get_status))
        .route(
            "/api/llm/providers",
            get(handlers::llm::list_providers).post(handlers::llm::create_provider),
        )
        .route("/api/llm/providers/active", get(handlers::llm::get_active_provider))
        .route(
            "/api/llm/providers/:id",
            get(handlers::llm::get_provider)
                .put(handlers::llm::update_provider)
                .delete(handlers::llm::delete_provider),
        )
        .route("/api/llm/providers/:id/activate", post(handlers::llm::activate_provider))
        .route("/api/llm/providers/:id/deactivate", post(handlers::llm::deactivate_provider))
        .route("/api/llm/providers/:id/test", post(handlers::llm::test_provider_connection))
        .with_state(Arc::clone(&app_state))
        .layer(axum_middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    let health_routes = Router::new().route("/health", get(health_check)).route("/ready", get(ready_check));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(protected_routes)
        .merge(health_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);
    tracing::info!("bankwise is ready to serve requests");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check() -> &'static str {
    "READY"
}
