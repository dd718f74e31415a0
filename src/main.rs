use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{middleware, routing, Router};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod auth;
mod chat_view;
mod config;
mod error;
mod manager;
mod message_view;
mod relay;
mod user_view;
mod utils;


use config::Config;
use relay::Relay;

pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub config: Config,
    pub relay: Relay,
}

pub fn app(state: Arc<AppState>) -> Router {
    let protect = middleware::from_fn_with_state(state.clone(), auth::protect);

    let users = Router::new()
        // only the search is protected, registration is open
        .route(
            "/",
            routing::get(user_view::list_users)
                .route_layer(protect.clone())
                .post(user_view::register),
        )
        .route("/login", routing::post(user_view::login));

    let chats = Router::new()
        .route(
            "/",
            routing::post(chat_view::access_chat).get(chat_view::fetch_chats),
        )
        .route("/group", routing::post(chat_view::create_group_chat))
        .route("/rename", routing::put(chat_view::rename_group))
        .route("/groupadd", routing::put(chat_view::add_to_group))
        .route("/groupremove", routing::put(chat_view::remove_from_group))
        .route_layer(protect.clone());

    let messages = Router::new()
        .route("/", routing::post(message_view::send_message))
        .route("/:chat_id", routing::get(message_view::all_messages))
        .route_layer(protect.clone());

    Router::new()
        .route("/", routing::get(|| async { "API is running" }))
        .route("/ws", routing::get(relay::ws_handler))
        .nest("/api/user", users)
        .nest("/api/chat", chats)
        .nest("/api/message", messages)
        .fallback(error::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    error::hide_details(config.production);

    let pool = SqlitePoolOptions::new()
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;
    sqlx::migrate!().run(&pool).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState {
        pool,
        config,
        relay: Relay::new(),
    });

    tracing::info!("server started on port {}", addr.port());
    axum::Server::bind(&addr)
        .serve(app(state).into_make_service())
        .await?;
    Ok(())
}
