//! Songbook Backend
//!
//! REST backend for church music groups: songs, repertoires with alternate
//! versions, play history and group membership. SQLite persistence and
//! Tantivy full-text search.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod search;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::TokenService;
use config::Config;
use db::Repository;
use models::MAX_PLAY_HISTORY;
use search::SearchIndex;

#[derive(Parser)]
#[command(name = "songbook-backend", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Cut every song's play history down to its newest entries, then exit
    TrimHistory {
        /// Number of entries to keep per song
        #[arg(long, env = "SONGBOOK_HISTORY_KEEP", default_value_t = MAX_PLAY_HISTORY)]
        keep: usize,
        /// Report what would be trimmed without writing
        #[arg(long)]
        dry_run: bool,
    },
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize database
    tracing::info!("Database path: {:?}", config.db_path);
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, repo).await,
        Command::TrimHistory { keep, dry_run } => {
            let report = repo.trim_song_histories(keep, dry_run).await?;
            tracing::info!(
                examined = report.songs_examined,
                trimmed = report.songs_trimmed,
                removed = report.entries_removed,
                dry_run,
                "Play history trimmed to {} entries per song",
                keep
            );
            Ok(())
        }
    }
}

async fn serve(config: Config, repo: Arc<Repository>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting Songbook Backend");
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    let tokens = match &config.token_secret {
        Some(secret) => TokenService::new(secret.as_bytes(), config.token_ttl_hours),
        None => {
            tracing::warn!(
                "No token secret configured (SONGBOOK_TOKEN_SECRET). Using a random secret; tokens will not survive a restart!"
            );
            TokenService::ephemeral(config.token_ttl_hours)
        }
    };

    // Initialize search index
    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    // Build initial search index from database
    tracing::info!("Building search index...");
    let songs = repo.list_songs(None, None).await?;
    search.rebuild(&songs).await?;

    let state = AppState {
        repo,
        search,
        config: Arc::new(config.clone()),
        tokens: Arc::new(tokens),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let tokens = state.tokens.clone();

    // API routes
    let api_routes = Router::new()
        // Auth
        .route("/auth/register", post(api::register))
        .route("/auth/login", post(api::login))
        .route("/auth/me", get(api::me))
        // Songs
        .route("/songs", get(api::list_songs).post(api::create_song))
        .route("/songs/search", get(api::search_songs))
        .route("/songs/stats/group/{group_id}", get(api::song_group_stats))
        .route(
            "/songs/{id}",
            get(api::get_song)
                .put(api::update_song)
                .delete(api::delete_song),
        )
        .route("/songs/{id}/played", post(api::record_song_play))
        .route("/songs/{id}/media", post(api::add_song_media))
        .route("/songs/{id}/media/{link_id}", delete(api::remove_song_media))
        // Repertoires
        .route(
            "/repertoires",
            get(api::list_repertoires).post(api::create_repertoire),
        )
        .route(
            "/repertoires/stats/group/{group_id}",
            get(api::repertoire_group_stats),
        )
        .route(
            "/repertoires/{id}",
            get(api::get_repertoire)
                .put(api::update_repertoire)
                .delete(api::delete_repertoire),
        )
        .route("/repertoires/{id}/played", post(api::record_repertoire_play))
        .route("/repertoires/{id}/sheet", get(api::repertoire_sheet))
        .route("/repertoires/{id}/media", post(api::add_repertoire_media))
        .route(
            "/repertoires/{id}/media/{link_id}",
            delete(api::remove_repertoire_media),
        )
        // Versions
        .route(
            "/repertoires/{id}/versions",
            get(api::list_versions).post(api::create_version),
        )
        .route(
            "/repertoires/{id}/versions/{version_id}",
            put(api::update_version).delete(api::delete_version),
        )
        .route(
            "/repertoires/{id}/versions/{version_id}/songs",
            get(api::list_song_modifications).put(api::batch_song_modifications),
        )
        .route(
            "/repertoires/{id}/versions/{version_id}/songs/{song_id}",
            put(api::upsert_song_modification).delete(api::remove_song_modification),
        )
        .route(
            "/repertoires/{id}/versions/{version_id}/reorder",
            put(api::reorder_songs),
        )
        .route(
            "/repertoires/{id}/versions/{version_id}/lyrics",
            get(api::get_bulk_lyrics).put(api::save_bulk_lyrics),
        )
        // Groups
        .route("/groups", get(api::list_groups).post(api::create_group))
        .route("/groups/join", post(api::join_group))
        .route(
            "/groups/{id}",
            get(api::get_group)
                .put(api::update_group)
                .delete(api::delete_group),
        )
        .route(
            "/groups/{id}/regenerate-code",
            post(api::regenerate_invitation_code),
        )
        .route(
            "/groups/{id}/toggle-invitation",
            post(api::toggle_invitation),
        )
        .route("/groups/{id}/members", post(api::add_member))
        .route(
            "/groups/{id}/members/{user_id}",
            delete(api::remove_member),
        )
        .route("/groups/{id}/moderators", post(api::add_moderator))
        .route(
            "/groups/{id}/moderators/{user_id}",
            delete(api::remove_moderator),
        )
        // Verify bearer tokens when present
        .layer(middleware::from_fn(move |req, next| {
            auth::bearer_auth_layer(tokens.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
