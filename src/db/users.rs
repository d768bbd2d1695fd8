use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::User;
use crate::error::{AppError, AppResult};

/// Register a calendar owner. The password is stored as an Argon2id hash.
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    email: Option<&str>,
    password: &str,
) -> AppResult<User> {
    let password_hash = hash_password(password)?;

    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, username, email, password_hash)
         VALUES (?, ?, ?, ?)
         RETURNING *",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(username)
    .bind(email)
    .bind(&password_hash)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(format!("User '{username}' already exists"))
        }
        other => AppError::Database(other),
    })
}

/// Find a user whose username or email equals `login`. A username match wins
/// when both exist.
pub async fn find_by_login(pool: &SqlitePool, login: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users
         WHERE username = ?1 OR email = ?1
         ORDER BY username = ?1 DESC
         LIMIT 1",
    )
    .bind(login)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Find a user by exact username.
pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn list_users(pool: &SqlitePool) -> AppResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
        .fetch_all(pool)
        .await?;
    Ok(users)
}

/// Replace a user's password hash.
pub async fn reset_password(
    pool: &SqlitePool,
    username: &str,
    new_password: &str,
) -> AppResult<()> {
    let hash = hash_password(new_password)?;
    let result = sqlx::query("UPDATE users SET password_hash = ? WHERE username = ?")
        .bind(&hash)
        .bind(username)
        .execute(pool)
        .await?;

    match result.rows_affected() {
        0 => Err(AppError::NotFound(format!("User '{username}' not found"))),
        _ => Ok(()),
    }
}

/// Check Basic credentials. `Ok(None)` covers both an unknown login and a
/// wrong password.
pub async fn authenticate(
    pool: &SqlitePool,
    login: &str,
    password: &str,
) -> AppResult<Option<User>> {
    let Some(user) = find_by_login(pool, login).await? else {
        return Ok(None);
    };

    let stored = PasswordHash::new(&user.password_hash).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Stored hash for '{login}' is invalid: {e}"))
    })?;
    let valid = Argon2::default()
        .verify_password(password.as_bytes(), &stored)
        .is_ok();

    Ok(valid.then_some(user))
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_create_user_returns_row() {
        let pool = db::test_pool().await;

        let user = create_user(&pool, "nadia", Some("nadia@ward3.example"), "nightshift")
            .await
            .unwrap();

        assert_eq!(user.username, "nadia");
        assert_eq!(user.email.as_deref(), Some("nadia@ward3.example"));
        assert!(user.password_hash.starts_with("$argon2"));

        let fetched = get_user_by_username(&pool, "nadia").await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let pool = db::test_pool().await;

        create_user(&pool, "nadia", None, "a").await.unwrap();
        let result = create_user(&pool, "nadia", None, "b").await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let pool = db::test_pool().await;
        create_user(&pool, "nadia", Some("nadia@ward3.example"), "nightshift")
            .await
            .unwrap();

        let by_name = authenticate(&pool, "nadia", "nightshift").await.unwrap();
        assert_eq!(by_name.map(|u| u.username).as_deref(), Some("nadia"));

        let by_email = authenticate(&pool, "nadia@ward3.example", "nightshift")
            .await
            .unwrap();
        assert_eq!(by_email.map(|u| u.username).as_deref(), Some("nadia"));

        assert!(authenticate(&pool, "nadia", "dayshift").await.unwrap().is_none());
        assert!(authenticate(&pool, "nobody", "nightshift").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_username_match_wins_over_email() {
        let pool = db::test_pool().await;
        create_user(&pool, "sam@rota.example", None, "first").await.unwrap();
        create_user(&pool, "other", Some("sam@rota.example"), "second")
            .await
            .unwrap();

        let user = find_by_login(&pool, "sam@rota.example").await.unwrap().unwrap();
        assert_eq!(user.username, "sam@rota.example");
    }

    #[tokio::test]
    async fn test_list_users_sorted() {
        let pool = db::test_pool().await;

        create_user(&pool, "zoe", None, "pass").await.unwrap();
        create_user(&pool, "amir", None, "pass").await.unwrap();
        let names: Vec<String> = list_users(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();

        assert_eq!(names, vec!["amir", "zoe"]);
    }

    #[tokio::test]
    async fn test_reset_password() {
        let pool = db::test_pool().await;

        create_user(&pool, "nadia", None, "old").await.unwrap();
        reset_password(&pool, "nadia", "new").await.unwrap();

        assert!(authenticate(&pool, "nadia", "old").await.unwrap().is_none());
        assert!(authenticate(&pool, "nadia", "new").await.unwrap().is_some());
        assert!(matches!(
            reset_password(&pool, "nobody", "x").await,
            Err(AppError::NotFound(_))
        ));
    }
}
