//! Shared helpers for tests that exercise handlers against a live database.
//! These tests are ignored by default; point DATABASE_URL at a scratch
//! database and run `cargo test -- --ignored`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::extract::AuthUser;
use crate::config::Config;
use crate::state::AppState;
use crate::storage::FileStore;

pub async fn pool() -> PgPool {
    let url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
    let pool = PgPool::connect(&url).await.expect("database connect");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub fn state(db: PgPool) -> AppState {
    let config = Config {
        database_url: String::new(),
        jwt_secret: "test-secret".to_string(),
        token_ttl_minutes: 60,
        upload_root: std::env::temp_dir().display().to_string(),
        port: 0,
        rust_log: "info".to_string(),
    };
    AppState {
        db,
        config,
        files: FileStore::new(std::env::temp_dir()),
    }
}

/// Inserts a fresh user and returns it as the authenticated caller.
pub async fn create_user(db: &PgPool) -> AuthUser {
    let email = format!("{}@example.com", Uuid::new_v4());
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash) VALUES ($1, 'x') RETURNING id",
    )
    .bind(&email)
    .fetch_one(db)
    .await
    .unwrap();
    AuthUser {
        id,
        email,
        roles: vec!["user".to_string()],
    }
}

pub async fn create_company(db: &PgPool, user_id: Uuid) -> Uuid {
    sqlx::query_scalar("INSERT INTO companies (user_id, name) VALUES ($1, $2) RETURNING id")
        .bind(user_id)
        .bind(format!("Acme {}", Uuid::new_v4()))
        .fetch_one(db)
        .await
        .unwrap()
}
