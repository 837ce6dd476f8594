use std::sync::Arc;

use log::info;

use crate::{
    ServiceError, ServiceResult,
    jwt::{ArcJwtService, IdentityClaim},
    util::validate_credentials,
};

pub type UserId = i64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
}

const INVALID_CREDENTIALS: &str = "Invalid username or password.";

pub type ArcUserRepository = Arc<Box<dyn UserRepository + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait UserRepository {
    /// Fails with `NotPossible` when the username is already taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> ServiceResult<UserId>;
    async fn get_user_by_name(&self, username: &str) -> ServiceResult<Option<User>>;
}

pub type ArcAccountService = Arc<Box<dyn AccountService + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait AccountService {
    async fn register(&self, username: &str, password: &str) -> ServiceResult<UserId>;
    async fn verify(&self, username: &str, password: &str) -> ServiceResult<User>;
    async fn login(&self, username: &str, password: &str) -> ServiceResult<(String, User)>;
    fn validate_token(&self, token: &str) -> ServiceResult<IdentityClaim>;
}

pub struct AccountServiceImpl {
    user_repository: ArcUserRepository,
    jwt_service: ArcJwtService,
    hash_cost: u32,
}

impl AccountServiceImpl {
    pub fn new(user_repository: ArcUserRepository, jwt_service: ArcJwtService) -> Self {
        Self {
            user_repository,
            jwt_service,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_hash_cost(mut self, hash_cost: u32) -> Self {
        self.hash_cost = hash_cost;
        self
    }
}

#[async_trait::async_trait]
impl AccountService for AccountServiceImpl {
    async fn register(&self, username: &str, password: &str) -> ServiceResult<UserId> {
        validate_credentials(username, password)?;
        let password_hash = bcrypt::hash(password, self.hash_cost)
            .map_err(|e| ServiceError::Internal(format!("Failed to hash password: {}", e)))?;
        let id = self
            .user_repository
            .create_user(username, &password_hash)
            .await?;
        info!("Registered user {} with id {}", username, id);
        Ok(id)
    }

    async fn verify(&self, username: &str, password: &str) -> ServiceResult<User> {
        let Some(user) = self.user_repository.get_user_by_name(username).await? else {
            info!("Login attempt for user {}: failure", username);
            return ServiceError::unauthorized(INVALID_CREDENTIALS);
        };
        let valid = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| ServiceError::Internal(format!("Failed to verify password: {}", e)))?;
        info!(
            "Login attempt for user {}: {}",
            username,
            if valid { "success" } else { "failure" }
        );
        if !valid {
            return ServiceError::unauthorized(INVALID_CREDENTIALS);
        }
        Ok(user)
    }

    async fn login(&self, username: &str, password: &str) -> ServiceResult<(String, User)> {
        let user = self.verify(username, password).await?;
        let token = self.jwt_service.issue_jwt(&user)?;
        Ok((token, user))
    }

    fn validate_token(&self, token: &str) -> ServiceResult<IdentityClaim> {
        self.jwt_service.validate_jwt(token)
    }
}
