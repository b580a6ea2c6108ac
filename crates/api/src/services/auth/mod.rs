//! Authentication service.
//!
//! Password registration and login backed by Argon2id hashes, plus bearer
//! token resolution for the auth extractors.

mod error;
pub mod token;

pub use error::AuthError;
pub use token::{Claims, TokenError, TokenIssuer};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;
use sqlx::PgPool;

use nutritracker_core::{Email, UserRole};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::user::User;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;

/// Registration payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Login payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Authentication service.
///
/// Handles registration, login and token resolution.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    tokens: &'a TokenIssuer,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, tokens: &'a TokenIssuer) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens,
        }
    }

    /// Register a regular user and issue a token.
    ///
    /// Validation happens before any database access.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingFields`, `AuthError::PasswordMismatch` or
    /// `AuthError::Validation` for bad input, and
    /// `AuthError::UserAlreadyExists` if the email or username is taken.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(User, String), AuthError> {
        let username = request.username.trim();
        if username.is_empty() || request.email.trim().is_empty() || request.password.is_empty() {
            return Err(AuthError::MissingFields(
                "Username, email and password are required",
            ));
        }
        if request.password != request.confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        let email = validate_new_account(username, &request.email, &request.password)?;
        let user =
            create_account(&self.users, username, &email, &request.password, UserRole::User)
                .await?;
        let token = self.tokens.issue(user.id)?;

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        Ok((user, token))
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email is unknown, the
    /// account is inactive, or the password is wrong.
    pub async fn login(&self, request: &LoginRequest) -> Result<(User, String), AuthError> {
        if request.email.trim().is_empty() || request.password.is_empty() {
            return Err(AuthError::MissingFields("Email and password are required"));
        }

        // A malformed email cannot match any stored account
        let email = Email::parse(&request.email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        verify_password(&request.password, &password_hash)?;

        let token = self.tokens.issue(user.id)?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok((user, token))
    }

    /// Resolve a bearer token to an active user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Token` if the token is invalid or expired and
    /// `AuthError::UserInactive` if its user is gone or deactivated.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.tokens.verify(token)?;

        match self.users.get_by_id(claims.user_id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(AuthError::UserInactive),
        }
    }
}

/// Create an admin account (used for seeding).
///
/// # Errors
///
/// Returns `AuthError::Validation` for bad input and
/// `AuthError::UserAlreadyExists` if the email or username is taken.
pub async fn create_admin(
    pool: &PgPool,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User, AuthError> {
    let username = username.trim();
    let email = validate_new_account(username, email, password)?;
    let user = create_account(
        &UserRepository::new(pool),
        username,
        &email,
        password,
        UserRole::Admin,
    )
    .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "Admin account created");
    Ok(user)
}

async fn create_account(
    users: &UserRepository<'_>,
    username: &str,
    email: &Email,
    password: &str,
    role: UserRole,
) -> Result<User, AuthError> {
    if users.exists(email, username).await? {
        return Err(AuthError::UserAlreadyExists);
    }

    let password_hash = hash_password(password)?;

    // The unique constraints still catch a concurrent registration
    users
        .create(username, email, &password_hash, role)
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::Repository(other),
        })
}

/// Validate username, email and password for a new account.
///
/// Collects every failure so the client sees them all at once.
fn validate_new_account(username: &str, email: &str, password: &str) -> Result<Email, AuthError> {
    let mut details = Vec::new();

    if let Err(msg) = validate_username(username) {
        details.push(msg);
    }
    let email = match Email::parse(email) {
        Ok(email) => Some(email),
        Err(e) => {
            details.push(format!("Invalid email: {e}"));
            None
        }
    };
    if let Err(msg) = validate_password(password) {
        details.push(msg);
    }

    match email {
        Some(email) if details.is_empty() => Ok(email),
        _ => Err(AuthError::Validation(details)),
    }
}

/// Usernames are 3-30 characters of ASCII letters, digits, `_` or `-`.
fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(
            "Username may only contain letters, numbers, underscores and hyphens".to_owned(),
        );
    }
    Ok(())
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        ));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_against_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username("jane_doe-42").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
        assert!(validate_username("no spaces").is_err());
        assert!(validate_username("émile").is_err());
    }

    #[test]
    fn test_validate_new_account_collects_all_problems() {
        let err = validate_new_account("x", "not-an-email", "short").unwrap_err();
        let AuthError::Validation(details) = err else {
            panic!("expected validation error");
        };
        assert_eq!(details.len(), 3);
    }

    #[test]
    fn test_validate_new_account_normalizes_email() {
        let email = validate_new_account("alice", " Alice@Example.com ", "longenough").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
    }

    #[test]
    fn test_register_request_uses_camel_case() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "username": "alice",
            "email": "a@b.co",
            "password": "pw",
            "confirmPassword": "pw2"
        }))
        .unwrap();
        assert_eq!(request.confirm_password, "pw2");
    }
}
