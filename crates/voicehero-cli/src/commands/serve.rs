use axum::{response::Json, routing::get, Router};
use clap::Args;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use utoipa::OpenApi;
use voicehero_analytics::{configure_routes, AnalyticsApiDoc, AnalyticsEventsService, AppState};
use voicehero_database::DbConnection;
use voicehero_widget::{BotFilter, BotFilterConfig};

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1:3000", env = "VOICEHERO_ADDRESS")]
    pub address: String,

    /// Database connection URL
    #[arg(
        long,
        default_value = "sqlite://voicehero.db?mode=rwc",
        env = "VOICEHERO_DATABASE_URL"
    )]
    pub database_url: String,

    /// Additional user agent substrings treated as bots
    #[arg(long = "bot-token", env = "VOICEHERO_BOT_TOKENS", value_delimiter = ',')]
    pub bot_tokens: Vec<String>,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        debug!("Initializing database connection...");
        let db = voicehero_database::establish_connection(&self.database_url).await?;

        let mut bot_config = BotFilterConfig::default();
        bot_config.denylist.extend(self.bot_tokens.iter().cloned());

        let app = build_app(db, BotFilter::new(bot_config));

        let listener = TcpListener::bind(&self.address).await?;
        info!("VoiceHero ingest API listening on {}", self.address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("VoiceHero ingest API exited");
        Ok(())
    }
}

pub fn build_app(db: Arc<DbConnection>, bot_filter: BotFilter) -> Router {
    let state = Arc::new(AppState::new(
        Arc::new(AnalyticsEventsService::new(db)),
        bot_filter,
    ));

    Router::new()
        .nest("/api", configure_routes().with_state(state))
        .route("/api-docs/openapi.json", get(openapi_spec))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    let mut doc = AnalyticsApiDoc::openapi();
    doc.servers = Some(vec![utoipa::openapi::Server::new("/api")]);
    Json(doc)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, initiating graceful shutdown...");
}
