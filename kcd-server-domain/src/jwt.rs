use std::sync::Arc;

use crate::{ServiceResult, account::User, account::UserId};

/// The verified payload of a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub user_id: UserId,
    pub username: String,
}

pub type ArcJwtService = Arc<Box<dyn JwtService + Send + Sync>>;

pub trait JwtService {
    fn issue_jwt(&self, user: &User) -> ServiceResult<String>;
    fn validate_jwt(&self, token: &str) -> ServiceResult<IdentityClaim>;
}
