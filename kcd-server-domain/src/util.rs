use validator::Validate;

use crate::{ServiceError, ServiceResult};

#[derive(Validate)]
struct CredentialsValidator {
    #[validate(length(min = 1, max = 64))]
    username: String,
    #[validate(length(min = 1))]
    password: String,
}

/// Checks that both fields are present. The username is taken verbatim, so
/// "alice" and "Alice" are different accounts.
pub fn validate_credentials(username: &str, password: &str) -> ServiceResult<()> {
    if username.trim().is_empty() || password.is_empty() {
        return ServiceError::bad_request("Username and password are required.");
    }
    let validator = CredentialsValidator {
        username: username.to_string(),
        password: password.to_string(),
    };
    if let Err(e) = validator.validate() {
        return ServiceError::bad_request(format!("Invalid credentials: {}", e));
    }
    Ok(())
}
