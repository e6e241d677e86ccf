use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};

use super::Repository;
use crate::auth::{password_reset_token, user};
use crate::errors::ServiceError;

/// Accounts and their single-use password reset tokens.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl Repository for UserRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl UserRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.get_db())
            .await?)
    }

    /// Inserts a user. A duplicate email surfaces as a unique violation from the store.
    #[instrument(skip(self, password_hash))]
    pub async fn create(
        &self,
        email: &str,
        password_hash: String,
    ) -> Result<user::Model, ServiceError> {
        let now = Utc::now();
        let model = user::ActiveModel {
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.get_db())
        .await?;

        info!(user_id = model.id, "User registered");
        Ok(model)
    }

    /// Replaces the stored hash for `email`. Returns the number of rows changed.
    #[instrument(skip(self, password_hash))]
    pub async fn update_password(
        &self,
        email: &str,
        password_hash: String,
    ) -> Result<u64, ServiceError> {
        let result = user::Entity::update_many()
            .col_expr(user::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user::Column::Email.eq(email))
            .exec(self.get_db())
            .await?;

        Ok(result.rows_affected)
    }

    #[instrument(skip(self, token_hash))]
    pub async fn create_reset_token(
        &self,
        email: &str,
        token_hash: String,
        expires_at: DateTime<Utc>,
    ) -> Result<password_reset_token::Model, ServiceError> {
        let model = password_reset_token::ActiveModel {
            email: Set(email.to_string()),
            token_hash: Set(token_hash),
            expires_at: Set(expires_at),
            created_at: Set(Utc::now()),
            used_at: Set(None),
            ..Default::default()
        }
        .insert(self.get_db())
        .await?;

        info!(token_id = model.id, "Password reset token issued");
        Ok(model)
    }

    /// Whether `token_hash` names an unused, unexpired token for `email`. Read only.
    #[instrument(skip(self, token_hash))]
    pub async fn has_usable_reset_token(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<bool, ServiceError> {
        Ok(usable_reset_token(self.get_db(), email, token_hash, Utc::now())
            .await?
            .is_some())
    }

    /// Consumes a matching unused, unexpired reset token and sets the new hash.
    ///
    /// Both writes happen in one transaction. Returns `false` without changing
    /// anything when no usable token matches.
    #[instrument(skip(self, token_hash, password_hash))]
    pub async fn reset_password_with_token(
        &self,
        email: &str,
        token_hash: &str,
        password_hash: String,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let txn = self.get_db().begin().await?;

        let Some(token) = usable_reset_token(&txn, email, token_hash, now).await? else {
            warn!("Rejected password reset with unknown, used or expired token");
            return Ok(false);
        };

        // Guarded on used_at so two concurrent resets cannot both consume it.
        let consumed = password_reset_token::Entity::update_many()
            .col_expr(password_reset_token::Column::UsedAt, Expr::value(Some(now)))
            .filter(password_reset_token::Column::Id.eq(token.id))
            .filter(password_reset_token::Column::UsedAt.is_null())
            .exec(&txn)
            .await?;
        if consumed.rows_affected != 1 {
            return Ok(false);
        }

        let updated = user::Entity::update_many()
            .col_expr(user::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Email.eq(email))
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            return Ok(false);
        }

        txn.commit().await?;
        info!(token_id = token.id, "Password reset via token");
        Ok(true)
    }
}

async fn usable_reset_token<C: ConnectionTrait>(
    conn: &C,
    email: &str,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<password_reset_token::Model>, ServiceError> {
    let candidate = password_reset_token::Entity::find()
        .filter(password_reset_token::Column::Email.eq(email))
        .filter(password_reset_token::Column::TokenHash.eq(token_hash))
        .filter(password_reset_token::Column::UsedAt.is_null())
        .order_by_desc(password_reset_token::Column::Id)
        .one(conn)
        .await?;
    Ok(candidate.filter(|t| t.is_usable(now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_support::setup;
    use chrono::Duration;

    async fn repo() -> (UserRepository, tempfile::TempDir) {
        let (db, _images, dir) = setup().await;
        (UserRepository::new(db), dir)
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let (repo, _dir) = repo().await;
        repo.create("a@example.com", "h1".to_string()).await.unwrap();

        let err = repo
            .create("a@example.com", "h2".to_string())
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn update_password_reports_affected_rows() {
        let (repo, _dir) = repo().await;
        repo.create("b@example.com", "old".to_string()).await.unwrap();

        assert_eq!(
            repo.update_password("b@example.com", "new".to_string())
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            repo.update_password("nobody@example.com", "x".to_string())
                .await
                .unwrap(),
            0
        );

        let user = repo.find_by_email("b@example.com").await.unwrap().unwrap();
        assert_eq!(user.password_hash, "new");
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let (repo, _dir) = repo().await;
        repo.create("c@example.com", "old".to_string()).await.unwrap();
        repo.create_reset_token(
            "c@example.com",
            "abc123".to_string(),
            Utc::now() + Duration::minutes(30),
        )
        .await
        .unwrap();

        assert!(repo
            .reset_password_with_token("c@example.com", "abc123", "new".to_string())
            .await
            .unwrap());
        assert!(!repo
            .reset_password_with_token("c@example.com", "abc123", "newer".to_string())
            .await
            .unwrap());

        let user = repo.find_by_email("c@example.com").await.unwrap().unwrap();
        assert_eq!(user.password_hash, "new");
    }

    #[tokio::test]
    async fn checking_a_reset_token_does_not_consume_it() {
        let (repo, _dir) = repo().await;
        repo.create("e@example.com", "old".to_string()).await.unwrap();
        repo.create_reset_token(
            "e@example.com",
            "live".to_string(),
            Utc::now() + Duration::minutes(30),
        )
        .await
        .unwrap();

        assert!(repo.has_usable_reset_token("e@example.com", "live").await.unwrap());
        assert!(repo.has_usable_reset_token("e@example.com", "live").await.unwrap());
        assert!(!repo.has_usable_reset_token("e@example.com", "nope").await.unwrap());

        assert!(repo
            .reset_password_with_token("e@example.com", "live", "new".to_string())
            .await
            .unwrap());
        assert!(!repo.has_usable_reset_token("e@example.com", "live").await.unwrap());
    }

    #[tokio::test]
    async fn expired_or_foreign_tokens_are_rejected() {
        let (repo, _dir) = repo().await;
        repo.create("d@example.com", "old".to_string()).await.unwrap();
        repo.create_reset_token(
            "d@example.com",
            "stale".to_string(),
            Utc::now() - Duration::minutes(1),
        )
        .await
        .unwrap();
        repo.create_reset_token(
            "someone@example.com",
            "theirs".to_string(),
            Utc::now() + Duration::minutes(30),
        )
        .await
        .unwrap();

        assert!(!repo
            .reset_password_with_token("d@example.com", "stale", "x".to_string())
            .await
            .unwrap());
        assert!(!repo
            .reset_password_with_token("d@example.com", "theirs", "x".to_string())
            .await
            .unwrap());

        let user = repo.find_by_email("d@example.com").await.unwrap().unwrap();
        assert_eq!(user.password_hash, "old");
    }
}
