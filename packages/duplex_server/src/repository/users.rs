//! User accounts: argon2-hashed passwords, lookups, profile updates.

use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{ChatRepository, parse_id, parse_ts};
use crate::models::User;

/// Hash a password with Argon2id and a random salt.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2id hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("invalid password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_id(&row.get::<String, _>("id"))?,
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts(row.get("updated_at"))?,
    })
}

/// Optional profile changes applied by `update_profile`.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl ChatRepository {
    /// Create a user with an argon2-hashed password. Fails on duplicate
    /// username or email (UNIQUE constraints).
    pub async fn create_user(
        &self,
        first_name: &str,
        last_name: Option<&str>,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.map(String::from),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, username, email, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at.timestamp_millis())
        .bind(user.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;

        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, username, email, password_hash, created_at, updated_at
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, username, email, password_hash, created_at, updated_at
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, username, email, password_hash, created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    /// Verify password against stored argon2 hash. Returns the User on success.
    pub async fn verify_user_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        let user = match self.get_user_by_username(username).await? {
            Some(u) => u,
            None => return Ok(None),
        };
        if verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    /// Apply the given profile changes and return the updated user.
    pub async fn update_profile(&self, user_id: Uuid, changes: ProfileChanges) -> Result<User> {
        let current = self
            .get_user_by_id(user_id)
            .await?
            .context("user not found")?;

        let password_hash = match changes.password.as_deref() {
            Some(password) => hash_password(password)?,
            None => current.password_hash.clone(),
        };

        sqlx::query(
            r#"
            UPDATE users
            SET first_name = ?, last_name = ?, email = ?, password_hash = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(changes.first_name.as_deref().unwrap_or(&current.first_name))
        .bind(changes.last_name.as_deref().or(current.last_name.as_deref()))
        .bind(changes.email.as_deref().unwrap_or(&current.email))
        .bind(&password_hash)
        .bind(Utc::now().timestamp_millis())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update profile")?;

        self.get_user_by_id(user_id)
            .await?
            .context("user disappeared during update")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_helpers;

    #[test]
    fn hash_and_verify_password() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[tokio::test]
    async fn create_and_look_up_user() {
        let repo = test_helpers::test_repository().await;
        let created = repo
            .create_user("Ada", Some("Lovelace"), "ada", "ada@example.com", "s3cret!!")
            .await
            .unwrap();

        let by_name = repo.get_user_by_username("ada").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.email, "ada@example.com");

        let by_id = repo.get_user_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "ada");

        assert!(repo.get_user_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let repo = test_helpers::test_repository().await;
        repo.create_user("Ada", None, "ada", "ada@example.com", "s3cret!!")
            .await
            .unwrap();
        let err = repo
            .create_user("Other", None, "ada", "other@example.com", "s3cret!!")
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn password_verification() {
        let repo = test_helpers::test_repository().await;
        repo.create_user("Ada", None, "ada", "ada@example.com", "s3cret!!")
            .await
            .unwrap();

        assert!(
            repo.verify_user_password("ada", "s3cret!!")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            repo.verify_user_password("ada", "wrong")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            repo.verify_user_password("ghost", "s3cret!!")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn profile_update_keeps_unchanged_fields() {
        let repo = test_helpers::test_repository().await;
        let user = repo
            .create_user("Ada", Some("Lovelace"), "ada", "ada@example.com", "s3cret!!")
            .await
            .unwrap();

        let updated = repo
            .update_profile(
                user.id,
                ProfileChanges {
                    email: Some("countess@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.email, "countess@example.com");
        assert_eq!(updated.first_name, "Ada");
        assert_eq!(updated.last_name.as_deref(), Some("Lovelace"));
        // Password unchanged
        assert!(
            repo.verify_user_password("ada", "s3cret!!")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn profile_update_can_change_password() {
        let repo = test_helpers::test_repository().await;
        let user = repo
            .create_user("Ada", None, "ada", "ada@example.com", "s3cret!!")
            .await
            .unwrap();

        repo.update_profile(
            user.id,
            ProfileChanges {
                password: Some("newpass99".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(
            repo.verify_user_password("ada", "s3cret!!")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            repo.verify_user_password("ada", "newpass99")
                .await
                .unwrap()
                .is_some()
        );
    }
}
