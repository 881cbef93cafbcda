//! Shared fixtures for tests: an in-memory database and seeded accounts.

use std::sync::OnceLock;

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;

use crate::{
    structs::{RequestStatus, User},
    utils, AppState,
};

pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// argon2 is slow in debug builds, so every fixture account shares one hash.
fn test_password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| utils::hash_password(TEST_PASSWORD).unwrap())
}

/// Fresh migrated database. A single connection keeps `:memory:` shared.
pub async fn state() -> AppState {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&db_pool).await.unwrap();
    AppState { db_pool }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// User `username` named after it, with email `{username}@example.com`.
pub async fn create_user(state: &AppState, username: &str) -> User {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (name, username, email, pwd_hash, created_at) VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(capitalize(username))
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(test_password_hash())
    .bind(Utc::now())
    .fetch_one(&state.db_pool)
    .await
    .unwrap()
}

/// "ana" and "ben", already partners.
pub async fn linked_pair(state: &AppState) -> (User, User) {
    let mut ana = create_user(state, "ana").await;
    let mut ben = create_user(state, "ben").await;
    for (user_id, partner_id) in [(ana.id, ben.id), (ben.id, ana.id)] {
        sqlx::query("UPDATE users SET partner_id = $1 WHERE id = $2")
            .bind(partner_id)
            .bind(user_id)
            .execute(&state.db_pool)
            .await
            .unwrap();
    }
    ana.partner_id = Some(ben.id);
    ben.partner_id = Some(ana.id);
    (ana, ben)
}

pub async fn request_status(state: &AppState, request_id: i64) -> RequestStatus {
    sqlx::query_scalar::<_, RequestStatus>("SELECT status FROM partner_requests WHERE id = $1")
        .bind(request_id)
        .fetch_one(&state.db_pool)
        .await
        .unwrap()
}
