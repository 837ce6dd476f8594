use std::sync::Arc;

use kcd_persistence_sqlite::{
    create_db_pool, games::SqliteGameRepository, init_schema, users::SqliteUserRepository,
};
use kcd_server::{config::ServerConfig, logs::init_logger};
use kcd_server_api::jwt::JwtServiceImpl;
use kcd_server_domain::{
    account::ArcUserRepository, app::construct_app, game::ArcGameRepository, jwt::ArcJwtService,
};
use log::{error, info};

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received. Preparing graceful exit...");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logger(&config) {
        eprintln!("Failed to initialize logger: {}", e);
        std::process::exit(1);
    }

    let pool = create_db_pool(&config.db_path);
    if let Err(e) = init_schema(&pool).await {
        error!("Failed to initialize database at {}: {}", config.db_path, e);
        std::process::exit(1);
    }
    info!("Using database at {}", config.db_path);

    let user_repository: ArcUserRepository =
        Arc::new(Box::new(SqliteUserRepository::new(pool.clone())));
    let game_repository: ArcGameRepository =
        Arc::new(Box::new(SqliteGameRepository::new(pool.clone())));
    let jwt_service: ArcJwtService = Arc::new(Box::new(JwtServiceImpl::from_config(
        config.jwt_secret.as_deref(),
    )));

    let app = construct_app(
        user_repository,
        game_repository,
        jwt_service,
        config.bcrypt_cost,
    );

    info!("Starting application");

    if let Err(e) =
        kcd_server_api::run(app, &config.http_host, config.http_port, shutdown_signal()).await
    {
        error!("HTTP server failed: {}", e);
    }

    pool.close().await;
}
