use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng as SaltRng},
};
use rand_core::{OsRng, RngCore};
use tracing::{debug, info};

use parley_db::queries;
use parley_types::models::UserSummary;

use crate::bridge::BOT_EMAIL;
use crate::error::ServiceError;
use crate::state::AppStateInner;
use crate::views;

/// Sessions expire this many hours after login. No refresh.
pub const SESSION_TTL_HOURS: i64 = 24;

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
}

pub(crate) fn new_salt() -> SaltString {
    SaltString::generate(&mut SaltRng)
}

/// Hash `password` with Argon2id. Returns (PHC hash string, salt).
pub(crate) fn hash_password(password: &str) -> anyhow::Result<(String, String)> {
    let salt = new_salt();
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok((hash, salt.as_str().to_string()))
}

/// Accounts with a hash that does not parse (the bot) can never log in.
fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// 128 random bits, hex encoded.
fn new_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl AppStateInner {
    pub async fn register_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<i64, ServiceError> {
        if email.trim().is_empty() || name.trim().is_empty() || password.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "email, name and password are required".into(),
            ));
        }
        // The bot account is provisioned lazily; its address is never up for grabs.
        if email.eq_ignore_ascii_case(BOT_EMAIL) {
            return Err(ServiceError::EmailInUse);
        }

        let email = email.to_string();
        let name = name.to_string();
        let password = password.to_string();

        let user_id = self
            .run_blocking(move |db| {
                let (hash, salt) = hash_password(&password)?;
                db.with_tx(|conn| {
                    queries::insert_user(conn, &email, &name, &hash, &salt)?
                        .ok_or(ServiceError::EmailInUse)
                })
            })
            .await?;

        info!("Registered user {}", user_id);
        Ok(user_id)
    }

    /// Wrong password and unknown email fail the same way.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let email = email.to_string();
        let password = password.to_string();

        let session = self
            .run_blocking(move |db| {
                let user = db
                    .with_conn(|conn| queries::user_by_email(conn, &email))?
                    .ok_or(ServiceError::InvalidCredentials)?;

                if !verify_password(&password, &user.pass_hash) {
                    return Err(ServiceError::InvalidCredentials);
                }

                let token = new_token();
                let expires_at = chrono::Utc::now() + chrono::Duration::hours(SESSION_TTL_HOURS);
                db.with_tx(|conn| queries::insert_session(conn, &token, user.id, expires_at))?;

                Ok(Session {
                    token,
                    user_id: user.id,
                })
            })
            .await?;

        debug!("User {} logged in", session.user_id);
        Ok(session)
    }

    /// Owner of an unexpired session token.
    pub async fn authenticate(&self, token: &str) -> Result<i64, ServiceError> {
        if token.is_empty() {
            return Err(ServiceError::Unauthorized);
        }
        let token = token.to_string();
        self.run_blocking(move |db| db.session_user(&token)?.ok_or(ServiceError::Unauthorized))
            .await
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, ServiceError> {
        let rows = self.run_blocking(|db| Ok(db.list_users()?)).await?;
        Ok(rows.into_iter().map(views::user_summary).collect())
    }
}
