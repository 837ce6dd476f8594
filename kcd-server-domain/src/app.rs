use std::sync::Arc;

use crate::{
    account::{AccountServiceImpl, ArcAccountService, ArcUserRepository},
    game::{ArcGameRepository, ArcGameService, GameServiceImpl},
    jwt::ArcJwtService,
};

#[derive(Clone)]
pub struct AppState {
    pub account_service: ArcAccountService,
    pub game_service: ArcGameService,

    pub game_repository: ArcGameRepository,
}

pub fn construct_app(
    user_repository: ArcUserRepository,
    game_repository: ArcGameRepository,
    jwt_service: ArcJwtService,
    password_hash_cost: u32,
) -> AppState {
    let account_service: ArcAccountService = Arc::new(Box::new(
        AccountServiceImpl::new(user_repository, jwt_service)
            .with_hash_cost(password_hash_cost),
    ));

    let game_service: ArcGameService =
        Arc::new(Box::new(GameServiceImpl::new(game_repository.clone())));

    AppState {
        account_service,
        game_service,

        game_repository,
    }
}
