//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! ADMIN_USERNAME=admin ADMIN_EMAIL=admin@example.com ADMIN_PASSWORD=... nt-cli admin create
//! ```
//!
//! # Environment Variables
//!
//! - `NUTRITRACKER_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `ADMIN_USERNAME`, `ADMIN_EMAIL`, `ADMIN_PASSWORD` - the account to create

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use nutritracker_api::db::create_pool;
use nutritracker_api::services::auth::{self, AuthError, MIN_PASSWORD_LENGTH};
use nutritracker_core::UserId;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Required environment variables are missing.
    #[error("Missing environment variables: {}", .0.join(", "))]
    MissingEnvVars(Vec<&'static str>),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password too short.
    #[error("Password must be at least 8 characters long")]
    WeakPassword,

    /// Email or username taken.
    #[error("Admin with this email or username already exists")]
    UserExists,

    /// Account rejected by validation or storage.
    #[error("{0}")]
    Auth(AuthError),
}

impl From<AuthError> for AdminError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserAlreadyExists => Self::UserExists,
            other => Self::Auth(other),
        }
    }
}

/// Credentials read from the environment.
#[derive(Debug)]
struct AdminSeed {
    username: String,
    email: String,
    password: SecretString,
}

impl AdminSeed {
    /// Collect the variables, reporting every missing one at once.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AdminError> {
        let mut missing = Vec::new();
        let mut get = |name: &'static str| {
            let value = lookup(name).filter(|v| !v.trim().is_empty());
            if value.is_none() {
                missing.push(name);
            }
            value.unwrap_or_default()
        };

        let username = get("ADMIN_USERNAME");
        let email = get("ADMIN_EMAIL");
        let password = get("ADMIN_PASSWORD");

        if !missing.is_empty() {
            return Err(AdminError::MissingEnvVars(missing));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AdminError::WeakPassword);
        }

        Ok(Self {
            username,
            email,
            password: SecretString::from(password),
        })
    }
}

/// Create the admin account described by `ADMIN_*` environment variables.
///
/// # Returns
///
/// The ID of the created admin user.
pub async fn create_from_env() -> Result<UserId, AdminError> {
    dotenvy::dotenv().ok();

    let seed = AdminSeed::from_lookup(|name| std::env::var(name).ok())?;
    let database_url = super::database_url()
        .ok_or_else(|| AdminError::MissingEnvVars(vec!["NUTRITRACKER_DATABASE_URL"]))?;

    tracing::info!("Connecting to database...");
    let pool = create_pool(&database_url).await?;

    tracing::info!("Creating admin user: {} ({})", seed.username, seed.email);
    let user = auth::create_admin(
        &pool,
        &seed.username,
        &seed.email,
        seed.password.expose_secret(),
    )
    .await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Username: {}, Email: {}",
        user.id,
        user.username,
        user.email
    );
    tracing::warn!("The password came from ADMIN_PASSWORD; keep your .env file out of version control.");

    Ok(user.id)
}
