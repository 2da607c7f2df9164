use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use lumeo::agent::{LecturePlanner, SceneCodeAgent};
use lumeo::assembly::LectureAssembler;
use lumeo::config::PipelineConfig;
use lumeo::elevenlabs_client::ElevenLabsClient;
use lumeo::openai_client::OpenAiClient;
use lumeo::pipeline::Orchestrator;
use lumeo::renderer::LocalSceneRenderer;
use lumeo::sandbox::ManimSandbox;
use lumeo::storage::StorageClient;
use lumeo::store::PgStore;
use lumeo::{db, handlers, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let config = PipelineConfig::from_env();
    tracing::info!("Pipeline config: {:?}", config);

    let db_pool = db::create_pool()
        .await
        .expect("Failed to create database pool");

    let openai_api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set");
    let elevenlabs_api_key =
        std::env::var("ELEVENLABS_API_KEY").expect("ELEVENLABS_API_KEY must be set");
    let storage_url = std::env::var("SUPABASE_URL").expect("SUPABASE_URL must be set");
    let storage_key = std::env::var("SUPABASE_KEY").expect("SUPABASE_KEY must be set");

    let model = Arc::new(OpenAiClient::new(openai_api_key));
    let sandbox = Arc::new(ManimSandbox::new());
    let storage = Arc::new(StorageClient::new(storage_url, storage_key));
    let tts = Arc::new(ElevenLabsClient::new(elevenlabs_api_key));

    let store = Arc::new(PgStore::new(db_pool));
    let planner = Arc::new(LecturePlanner::new(model.clone(), config.generation_timeout));
    let agent = Arc::new(SceneCodeAgent::new(
        model,
        sandbox.clone(),
        config.max_agent_attempts,
        config.generation_timeout,
    ));
    let renderer = Arc::new(LocalSceneRenderer::new(
        tts,
        sandbox,
        storage.clone(),
        config.render_timeout,
    ));
    let assembler = Arc::new(LectureAssembler::new(storage));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        planner,
        agent,
        renderer,
        assembler,
        config,
    ));

    let shared_state = Arc::new(AppState {
        store,
        orchestrator,
    });

    let app = Router::new()
        .merge(handlers::lectures::routes())
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");
    axum::serve(listener, app).await.expect("Server error");
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
