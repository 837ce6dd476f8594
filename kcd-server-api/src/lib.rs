use axum::{
    Router,
    routing::{get, post},
};
use kcd_server_domain::app::AppState;
use log::info;
use tower_http::cors::CorsLayer;

mod auth;
pub mod error;
mod game;
pub mod jwt;


pub fn router(app: AppState) -> Router {
    let api: Router<AppState> = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/game/start", post(game::start_game))
        .route("/game/score", post(game::update_score))
        .route("/game/state", get(game::get_state));

    Router::new()
        .route("/", get(|| async { "KCD Scorekeeper Backend is running!" }))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(app)
}

pub async fn run(
    app: AppState,
    host: &str,
    port: u16,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;

    info!("HTTP server listening on {}:{}", host, port);
    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("HTTP server shut down gracefully");
    Ok(())
}
