use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::entities::user;
use crate::errors::ServiceError;

/// Shopper registration and login.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
}

/// Issued on successful registration or login.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub token: String,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, auth: Arc<AuthService>) -> Self {
        Self { db, auth }
    }

    /// Creates a shopper account and signs them in.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthenticatedSession, ServiceError> {
        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::BadRequest(
                "An account with this email already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let account = user::ActiveModel {
            id: Set(user_id),
            email: Set(email.to_string()),
            password_hash: Set(self.auth.hash_password(password)?),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        account.insert(&*self.db).await?;

        let token = self.auth.issue_token(user_id, email)?;
        info!("Registered user {}", user_id);
        Ok(AuthenticatedSession {
            user_id,
            email: email.to_string(),
            name: name.to_string(),
            token,
        })
    }

    /// Verifies credentials and issues a token. Wrong email and wrong
    /// password fail identically.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedSession, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid email or password".to_string());
        let account = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?
            .ok_or_else(invalid)?;

        if !self.auth.verify_password(password, &account.password_hash)? {
            return Err(invalid());
        }

        let token = self.auth.issue_token(account.id, &account.email)?;
        Ok(AuthenticatedSession {
            user_id: account.id,
            email: account.email,
            name: account.name,
            token,
        })
    }
}
