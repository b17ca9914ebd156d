//! SQLite-backed users and role permissions.
//!
//! The store answers one question for the search path: which categories may
//! this user see? [`UserStore::permission_view`] joins `users` with
//! `roles_permissions` and hands the core a [`UserPermissionView`].
//!
//! Users who are not in the table are never given a role implicitly. The
//! HTTP layer may call [`UserStore::provision`] when a request carries
//! explicit `user_info`, or [`UserStore::role_view`] when a fallback role is
//! configured.

use anyhow::{bail, Context, Result};
use rolesearch_core::{RolePermission, UserPermissionView};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;

use crate::config::Config;
use crate::db;

/// Role assigned by [`UserStore::provision`] when none is given.
pub const DEFAULT_ROLE: &str = "employee";
/// Department assigned by [`UserStore::provision`] when none is given.
pub const DEFAULT_DEPARTMENT: &str = "General";

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub department: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

/// Fields for [`UserStore::add_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub department: String,
}

impl NewUser {
    fn new(id: &str, username: &str, email: &str, role: &str, department: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            department: department.to_string(),
        }
    }
}

/// Caller-supplied profile for auto-provisioning. Missing fields get
/// defaults derived from the user id.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserProvision {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl UserProvision {
    /// Fill in defaults for `user_id`.
    pub fn into_new_user(self, user_id: &str) -> NewUser {
        let prefix: String = user_id.chars().take(8).collect();
        NewUser {
            id: user_id.to_string(),
            username: self.username.unwrap_or_else(|| format!("user_{}", prefix)),
            email: self.email.unwrap_or_else(|| format!("{}@company.com", prefix)),
            role: self.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            department: self
                .department
                .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string()),
        }
    }
}

/// Built-in role table. Each role extends the one before it.
pub fn default_roles() -> Vec<RolePermission> {
    let employee = ["policy", "rules", "basic_info"];
    let manager = ["policy", "rules", "basic_info", "salary", "team_info"];
    let hr = [
        "policy",
        "rules",
        "basic_info",
        "salary",
        "team_info",
        "confidential",
    ];
    let admin = [
        "policy",
        "rules",
        "basic_info",
        "salary",
        "team_info",
        "confidential",
        "system",
    ];
    vec![
        RolePermission::new("employee", employee, "Nhân viên thường"),
        RolePermission::new("manager", manager, "Quản lý"),
        RolePermission::new("hr", hr, "Nhân sự"),
        RolePermission::new("admin", admin, "Quản trị viên"),
    ]
}

/// Demo accounts seeded by `rolesearch init --sample-users`.
pub fn sample_users() -> Vec<NewUser> {
    vec![
        NewUser::new("user001", "Nguyễn Văn A", "user001@company.com", "employee", "IT"),
        NewUser::new("user002", "Trần Thị B", "user002@company.com", "employee", "Marketing"),
        NewUser::new("user003", "Lê Văn C", "user003@company.com", "manager", "IT"),
        NewUser::new("user004", "Phạm Thị D", "user004@company.com", "manager", "Sales"),
        NewUser::new("user005", "Hoàng Văn E", "user005@company.com", "hr", "HR"),
        NewUser::new("admin001", "System Admin", "admin@company.com", "admin", "IT"),
    ]
}

fn parse_categories(json: &str) -> Result<BTreeSet<String>> {
    serde_json::from_str(json).with_context(|| format!("invalid allowed_categories: {}", json))
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        role: row.get("role"),
        department: row.get("department"),
        created_at: row.get("created_at"),
    }
}

fn role_from_row(row: &SqliteRow) -> Result<RolePermission> {
    let categories: String = row.get("allowed_categories");
    Ok(RolePermission {
        role: row.get("role"),
        allowed_categories: parse_categories(&categories)?,
        description: row.get("description"),
    })
}

/// Handle to the user/role tables.
#[derive(Debug, Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// The user's role and allowed categories, or `None` if the user or
    /// their role does not exist.
    pub async fn permission_view(&self, user_id: &str) -> Result<Option<UserPermissionView>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.username, u.role, r.allowed_categories
            FROM users u
            JOIN roles_permissions r ON u.role = r.role
            WHERE u.id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let categories: String = row.get("allowed_categories");
        Ok(Some(UserPermissionView {
            user_id: row.get("id"),
            username: row.get("username"),
            role: row.get("role"),
            allowed_categories: parse_categories(&categories)?,
        }))
    }

    /// A view granting `role` to a user who is not in the table.
    pub async fn role_view(&self, user_id: &str, role: &str) -> Result<Option<UserPermissionView>> {
        Ok(self
            .get_role(role)
            .await?
            .map(|permission| UserPermissionView::for_role(user_id, user_id, &permission)))
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, role, department, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, username, email, role, department, created_at FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    pub async fn count_users(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Insert a user. Fails if the id is taken or the role is unknown.
    pub async fn add_user(&self, user: &NewUser) -> Result<User> {
        match self.insert_user(user).await? {
            Some(created) => Ok(created),
            None => bail!("user already exists: {}", user.id),
        }
    }

    /// Insert unless the id is taken. Returns `None` when a row with the
    /// same id already exists, including one inserted concurrently.
    async fn insert_user(&self, user: &NewUser) -> Result<Option<User>> {
        if user.id.trim().is_empty() {
            bail!("user id must not be empty");
        }
        if self.get_role(&user.role).await?.is_none() {
            bail!("unknown role: {}", user.role);
        }

        let created_at = chrono::Utc::now().to_rfc3339();
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO users (id, username, email, role, department, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.role)
        .bind(&user.department)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert user {}", user.id))?
        .rows_affected();

        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(User {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            department: user.department.clone(),
            created_at,
        }))
    }

    /// Move a user to another existing role.
    pub async fn update_role(&self, user_id: &str, role: &str) -> Result<()> {
        if self.get_role(role).await?.is_none() {
            bail!("unknown role: {}", role);
        }
        let updated = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            bail!("user not found: {}", user_id);
        }
        Ok(())
    }

    pub async fn list_roles(&self) -> Result<Vec<RolePermission>> {
        let rows = sqlx::query(
            "SELECT role, allowed_categories, description FROM roles_permissions ORDER BY role",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(role_from_row).collect()
    }

    pub async fn get_role(&self, role: &str) -> Result<Option<RolePermission>> {
        let row = sqlx::query(
            "SELECT role, allowed_categories, description FROM roles_permissions WHERE role = ?",
        )
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(role_from_row).transpose()
    }

    /// Insert or replace a role's permissions.
    pub async fn upsert_role(&self, permission: &RolePermission) -> Result<()> {
        if permission.role.trim().is_empty() {
            bail!("role name must not be empty");
        }
        let categories = serde_json::to_string(&permission.allowed_categories)?;
        sqlx::query(
            r#"
            INSERT INTO roles_permissions (role, allowed_categories, description)
            VALUES (?, ?, ?)
            ON CONFLICT(role) DO UPDATE SET
                allowed_categories = excluded.allowed_categories,
                description = excluded.description
            "#,
        )
        .bind(&permission.role)
        .bind(categories)
        .bind(&permission.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create `user_id` from an explicit profile and return its view. An
    /// existing user, or one created by a concurrent call, is returned
    /// unchanged.
    pub async fn provision(
        &self,
        user_id: &str,
        profile: UserProvision,
    ) -> Result<UserPermissionView> {
        if let Some(view) = self.permission_view(user_id).await? {
            return Ok(view);
        }
        let new_user = profile.into_new_user(user_id);
        if self.insert_user(&new_user).await?.is_some() {
            tracing::info!(user = %new_user.id, role = %new_user.role, "provisioned user");
        }

        match self.permission_view(user_id).await? {
            Some(view) => Ok(view),
            None => bail!("user not found after provisioning: {}", user_id),
        }
    }
}

// ============ CLI commands ============

pub async fn run_users_list(config: &Config) -> Result<()> {
    let store = UserStore::open(config).await?;
    let users = store.list_users().await?;
    store.close().await;

    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    println!("{:<12} {:<24} {:<10} {:<12} EMAIL", "ID", "USERNAME", "ROLE", "DEPARTMENT");
    for u in &users {
        println!(
            "{:<12} {:<24} {:<10} {:<12} {}",
            u.id, u.username, u.role, u.department, u.email
        );
    }
    println!();
    println!("total users: {}", users.len());
    Ok(())
}

pub async fn run_users_add(
    config: &Config,
    id: &str,
    username: &str,
    role: &str,
    email: Option<String>,
    department: Option<String>,
) -> Result<()> {
    let profile = UserProvision {
        username: Some(username.to_string()),
        email,
        role: Some(role.to_string()),
        department,
    };
    let store = UserStore::open(config).await?;
    let result = store.add_user(&profile.into_new_user(id)).await;
    store.close().await;

    let user = result?;
    println!("Added user {} ({}) with role {}", user.id, user.username, user.role);
    Ok(())
}

pub async fn run_users_set_role(config: &Config, id: &str, role: &str) -> Result<()> {
    let store = UserStore::open(config).await?;
    let result = store.update_role(id, role).await;
    store.close().await;

    result?;
    println!("User {} now has role {}", id, role);
    Ok(())
}

pub async fn run_roles_list(config: &Config) -> Result<()> {
    let store = UserStore::open(config).await?;
    let roles = store.list_roles().await?;
    store.close().await;

    if roles.is_empty() {
        println!("No roles. Run `rolesearch init` first.");
        return Ok(());
    }
    for role in &roles {
        let categories: Vec<&str> = role.allowed_categories.iter().map(String::as_str).collect();
        println!("{}: {}", role.role, role.description);
        println!("    categories: {}", categories.join(", "));
    }
    Ok(())
}

/// `rolesearch roles set`: create a role or replace its categories.
pub async fn run_roles_set(
    config: &Config,
    role: &str,
    categories: Vec<String>,
    description: Option<String>,
) -> Result<()> {
    let store = UserStore::open(config).await?;
    let description = match description {
        Some(d) => d,
        None => store
            .get_role(role)
            .await?
            .map(|r| r.description)
            .unwrap_or_default(),
    };
    let categories = categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty());
    let permission = RolePermission::new(role, categories, description.as_str());
    let result = store.upsert_role(&permission).await;
    store.close().await;
    result?;

    let categories: Vec<&str> = permission
        .allowed_categories
        .iter()
        .map(String::as_str)
        .collect();
    println!("Role {} now grants: {}", permission.role, categories.join(", "));
    Ok(())
}
