use std::sync::Arc;

use kcd_persistence_sqlite::{
    create_db_pool, games::SqliteGameRepository, init_schema, users::SqliteUserRepository,
};
use kcd_server::config::ServerConfig;
use kcd_server_api::jwt::JwtServiceImpl;
use kcd_server_domain::{account::AccountService, app::construct_app};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: add_user <username> <password>");
        std::process::exit(1);
    }

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pool = create_db_pool(&config.db_path);
    if let Err(e) = init_schema(&pool).await {
        eprintln!("Failed to initialize database at {}: {}", config.db_path, e);
        std::process::exit(1);
    }

    let app = construct_app(
        Arc::new(Box::new(SqliteUserRepository::new(pool.clone()))),
        Arc::new(Box::new(SqliteGameRepository::new(pool.clone()))),
        Arc::new(Box::new(JwtServiceImpl::from_config(
            config.jwt_secret.as_deref(),
        ))),
        config.bcrypt_cost,
    );

    let username = &args[1];
    let password = &args[2];
    let result = app.account_service.register(username, password).await;
    pool.close().await;

    match result {
        Ok(id) => println!("Created user [{}] with id {}", username, id),
        Err(e) => {
            eprintln!("Failed to create user [{}]: {}", username, e);
            std::process::exit(1);
        }
    }
}
