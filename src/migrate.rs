use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::users::{default_roles, sample_users};

/// Create the user and role tables. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roles_permissions (
            role TEXT PRIMARY KEY,
            allowed_categories TEXT NOT NULL DEFAULT '[]',
            description TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            department TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            FOREIGN KEY (role) REFERENCES roles_permissions(role)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Insert the built-in roles that are not present yet. Existing rows are
/// left untouched so edited permissions survive a re-init.
pub async fn seed_default_roles(pool: &SqlitePool) -> Result<u64> {
    let mut inserted = 0;
    for role in default_roles() {
        let categories = serde_json::to_string(&role.allowed_categories)?;
        inserted += sqlx::query(
            "INSERT OR IGNORE INTO roles_permissions (role, allowed_categories, description) VALUES (?, ?, ?)",
        )
        .bind(&role.role)
        .bind(categories)
        .bind(&role.description)
        .execute(pool)
        .await?
        .rows_affected();
    }
    Ok(inserted)
}

/// Insert the demo accounts that are not present yet.
pub async fn seed_sample_users(pool: &SqlitePool) -> Result<u64> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut inserted = 0;
    for user in sample_users() {
        inserted += sqlx::query(
            "INSERT OR IGNORE INTO users (id, username, email, role, department, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.role)
        .bind(&user.department)
        .bind(&now)
        .execute(pool)
        .await?
        .rows_affected();
    }
    Ok(inserted)
}

/// `rolesearch init`.
pub async fn run_init(config: &Config, with_sample_users: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations(&pool).await?;

    let roles = seed_default_roles(&pool).await?;
    let users = if with_sample_users {
        seed_sample_users(&pool).await?
    } else {
        0
    };
    pool.close().await;

    info!(roles, users, db = %config.db.path.display(), "database initialized");
    println!("Database initialized successfully.");
    println!("  roles added: {}", roles);
    if with_sample_users {
        println!("  sample users added: {}", users);
    }
    Ok(())
}
