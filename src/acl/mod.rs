//! Role-permission store.
//!
//! Roles and permissions are joined to users (`user_roles`, `user_permissions`)
//! and to each other (`role_permissions`). A user's effective permissions are
//! the direct grants plus the union of the permissions of every held role.
//! Grants are idempotent and revoking an absent grant is a no-op.

mod slug;

pub use slug::{candidates, slugify};

use std::collections::HashSet;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::authz::Principal;
use crate::errors::{is_unique_violation, AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::rbac::{Permission, Role};

/// Slug allocation attempts before giving up on a contended title.
const SLUG_ATTEMPTS: usize = 5;

pub const DEFAULT_SCOPE: &str = "default";

/// Grantee of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    User(i64),
    Role(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Catalog {
    Roles,
    Permissions,
}

impl Catalog {
    fn table(self) -> &'static str {
        match self {
            Catalog::Roles => "roles",
            Catalog::Permissions => "permissions",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Catalog::Roles => "Role",
            Catalog::Permissions => "Permission",
        }
    }
}

#[derive(Clone)]
pub struct Acl {
    pool: SqlitePool,
}

impl Acl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub async fn principal(&self, user: &AuthUser) -> AppResult<Principal> {
        let roles = self.role_slugs(user.user_id).await?;
        let permissions = self
            .effective_permissions(user.user_id)
            .await?
            .into_iter()
            .map(|p| p.slug);

        Ok(Principal::new(user.user_id, user.uuid)
            .with_admin_flag(user.is_admin)
            .with_roles(roles)
            .with_permissions(permissions))
    }

    pub async fn roles_of(&self, user_id: i64) -> AppResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT r.* FROM roles r JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = ? ORDER BY r.slug",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    pub async fn role_slugs(&self, user_id: i64) -> AppResult<Vec<String>> {
        Ok(self.roles_of(user_id).await?.into_iter().map(|r| r.slug).collect())
    }

    /// Direct grants plus grants through every held role, without duplicates.
    pub async fn effective_permissions(&self, user_id: i64) -> AppResult<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            WHERE p.id IN (
                SELECT permission_id FROM user_permissions WHERE user_id = ?
                UNION
                SELECT rp.permission_id FROM role_permissions rp
                JOIN user_roles ur ON ur.role_id = rp.role_id
                WHERE ur.user_id = ?
            )
            ORDER BY p.slug
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    pub async fn role_permissions(&self, role_id: i64) -> AppResult<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT p.* FROM permissions p JOIN role_permissions rp ON rp.permission_id = p.id WHERE rp.role_id = ? ORDER BY p.slug",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    pub async fn has_role(&self, user_id: i64, role_slug: &str) -> AppResult<bool> {
        self.has_any_role(user_id, &[role_slug]).await
    }

    pub async fn has_any_role(&self, user_id: i64, role_slugs: &[&str]) -> AppResult<bool> {
        let held: HashSet<String> = self.role_slugs(user_id).await?.into_iter().collect();
        Ok(role_slugs.iter().any(|slug| held.contains(*slug)))
    }

    pub async fn has_permission(&self, user_id: i64, permission_slug: &str) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM permissions p
            WHERE p.slug = ? AND (
                EXISTS (SELECT 1 FROM user_permissions up WHERE up.permission_id = p.id AND up.user_id = ?)
                OR EXISTS (
                    SELECT 1 FROM role_permissions rp
                    JOIN user_roles ur ON ur.role_id = rp.role_id
                    WHERE rp.permission_id = p.id AND ur.user_id = ?
                )
            )
            "#,
        )
        .bind(permission_slug)
        .bind(user_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn has_any_permission(&self, user_id: i64, permission_slugs: &[&str]) -> AppResult<bool> {
        let effective: HashSet<String> = self
            .effective_permissions(user_id)
            .await?
            .into_iter()
            .map(|p| p.slug)
            .collect();
        Ok(permission_slugs.iter().any(|slug| effective.contains(*slug)))
    }

    /// Whether the explicit join row exists (no role expansion for users).
    pub async fn is_granted(&self, subject: Subject, permission_slug: &str) -> AppResult<bool> {
        let permission = self.permission_by_slug(permission_slug).await?;
        let found: Option<i64> = match subject {
            Subject::User(user_id) => {
                sqlx::query_scalar("SELECT 1 FROM user_permissions WHERE user_id = ? AND permission_id = ?")
                    .bind(user_id)
                    .bind(permission.id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            Subject::Role(role_id) => {
                sqlx::query_scalar("SELECT 1 FROM role_permissions WHERE role_id = ? AND permission_id = ?")
                    .bind(role_id)
                    .bind(permission.id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(found.is_some())
    }

    // -------------------------------------------------------------------------
    // Grants
    // -------------------------------------------------------------------------

    /// Returns true when the grant was created, false when it already existed.
    pub async fn assign_role(&self, user_id: i64, role_slug: &str) -> AppResult<bool> {
        self.ensure_user(user_id).await?;
        let role = self.role_by_slug(role_slug).await?;

        let result = sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(role.id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns true when a grant was removed.
    pub async fn revoke_role(&self, user_id: i64, role_slug: &str) -> AppResult<bool> {
        self.ensure_user(user_id).await?;
        let role = self.role_by_slug(role_slug).await?;

        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
            .bind(user_id)
            .bind(role.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replaces every role of the user with the given one.
    pub async fn sync_roles(&self, user_id: i64, role_slugs: &[&str]) -> AppResult<()> {
        self.ensure_user(user_id).await?;
        let mut role_ids = Vec::with_capacity(role_slugs.len());
        for slug in role_slugs {
            role_ids.push(self.role_by_slug(slug).await?.id);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        for role_id in role_ids {
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(role_id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn allow(&self, subject: Subject, permission_slug: &str) -> AppResult<bool> {
        self.ensure_subject(subject).await?;
        let permission = self.permission_by_slug(permission_slug).await?;

        let sql = match subject {
            Subject::User(_) => {
                "INSERT OR IGNORE INTO user_permissions (user_id, permission_id, created_at) VALUES (?, ?, ?)"
            }
            Subject::Role(_) => {
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id, created_at) VALUES (?, ?, ?)"
            }
        };
        let result = sqlx::query(sql)
            .bind(subject_id(subject))
            .bind(permission.id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke_permission(&self, subject: Subject, permission_slug: &str) -> AppResult<bool> {
        self.ensure_subject(subject).await?;
        let permission = self.permission_by_slug(permission_slug).await?;

        let sql = match subject {
            Subject::User(_) => "DELETE FROM user_permissions WHERE user_id = ? AND permission_id = ?",
            Subject::Role(_) => "DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?",
        };
        let result = sqlx::query(sql)
            .bind(subject_id(subject))
            .bind(permission.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    pub async fn create_role(&self, title: &str, scope: Option<&str>) -> AppResult<Role> {
        let id = self.create_entry(Catalog::Roles, title, scope).await?;
        self.role(id).await
    }

    pub async fn create_permission(&self, title: &str, scope: Option<&str>) -> AppResult<Permission> {
        let id = self.create_entry(Catalog::Permissions, title, scope).await?;
        self.permission(id).await
    }

    pub async fn role(&self, id: i64) -> AppResult<Role> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::entity_not_found("Role"))
    }

    pub async fn role_by_slug(&self, slug: &str) -> AppResult<Role> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::entity_not_found("Role"))
    }

    pub async fn permission(&self, id: i64) -> AppResult<Permission> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::entity_not_found("Permission"))
    }

    pub async fn permission_by_slug(&self, slug: &str) -> AppResult<Permission> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::entity_not_found("Permission"))
    }

    pub async fn update_role(&self, id: i64, title: Option<&str>, scope: Option<&str>) -> AppResult<Role> {
        self.update_entry(Catalog::Roles, id, title, scope).await?;
        self.role(id).await
    }

    pub async fn update_permission(&self, id: i64, title: Option<&str>, scope: Option<&str>) -> AppResult<Permission> {
        self.update_entry(Catalog::Permissions, id, title, scope).await?;
        self.permission(id).await
    }

    pub async fn delete_role(&self, id: i64) -> AppResult<Role> {
        let role = self.role(id).await?;
        sqlx::query("DELETE FROM roles WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(role)
    }

    pub async fn delete_permission(&self, id: i64) -> AppResult<Permission> {
        let permission = self.permission(id).await?;
        sqlx::query("DELETE FROM permissions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(permission)
    }

    /// Inserts a role or permission with a free slug derived from the title.
    ///
    /// The probe picks the first free `base`, `base-1`, ... candidate; the UNIQUE(slug)
    /// index settles races between concurrent creators and the loser retries.
    async fn create_entry(&self, catalog: Catalog, title: &str, scope: Option<&str>) -> AppResult<i64> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::invalid_field("title", "Title is required"));
        }
        let base = slugify(title);
        if base.is_empty() {
            return Err(AppError::invalid_field("title", "Title must contain letters or digits"));
        }
        let scope = scope.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SCOPE);

        self.ensure_title_free(catalog, title, None).await?;

        for attempt in 1..=SLUG_ATTEMPTS {
            let slug = self.next_free_slug(catalog, &base).await?;
            let now = Utc::now();
            let sql = format!(
                "INSERT INTO {} (slug, title, scope, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
                catalog.table()
            );
            let result = sqlx::query(&sql)
                .bind(&slug)
                .bind(title)
                .bind(scope)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await;

            match result {
                Ok(done) => return Ok(done.last_insert_rowid()),
                Err(err) if is_unique_violation(&err, Some(".slug")) => {
                    tracing::warn!(table = catalog.table(), slug = %slug, attempt, "slug taken concurrently, retrying");
                }
                Err(err) if is_unique_violation(&err, Some(".title")) => {
                    return Err(title_conflict(catalog, title));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::conflict(format!(
            "Could not allocate a unique slug for {} \"{}\"",
            catalog.label().to_lowercase(),
            title
        )))
    }

    async fn update_entry(&self, catalog: Catalog, id: i64, title: Option<&str>, scope: Option<&str>) -> AppResult<()> {
        let (current_title, current_scope): (String, String) =
            sqlx::query_as(&format!("SELECT title, scope FROM {} WHERE id = ?", catalog.table()))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::entity_not_found(catalog.label()))?;

        let title = match title.map(str::trim) {
            Some("") => return Err(AppError::invalid_field("title", "Title is required")),
            Some(t) => t.to_string(),
            None => current_title,
        };
        let scope = scope
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or(current_scope);

        self.ensure_title_free(catalog, &title, Some(id)).await?;

        let sql = format!("UPDATE {} SET title = ?, scope = ?, updated_at = ? WHERE id = ?", catalog.table());
        sqlx::query(&sql)
            .bind(&title)
            .bind(&scope)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if is_unique_violation(&err, Some(".title")) {
                    title_conflict(catalog, &title)
                } else {
                    err.into()
                }
            })?;
        Ok(())
    }

    /// Titles are unique across every scope.
    async fn ensure_title_free(&self, catalog: Catalog, title: &str, except: Option<i64>) -> AppResult<()> {
        let sql = format!("SELECT id FROM {} WHERE title = ? AND id != ?", catalog.table());
        let existing: Option<i64> = sqlx::query_scalar(&sql)
            .bind(title)
            .bind(except.unwrap_or(-1))
            .fetch_optional(&self.pool)
            .await?;
        match existing {
            Some(_) => Err(title_conflict(catalog, title)),
            None => Ok(()),
        }
    }

    async fn next_free_slug(&self, catalog: Catalog, base: &str) -> AppResult<String> {
        let sql = format!("SELECT slug FROM {} WHERE slug = ? OR slug LIKE ?", catalog.table());
        let taken: HashSet<String> = sqlx::query_scalar::<_, String>(&sql)
            .bind(base)
            .bind(format!("{base}-%"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();

        Ok(candidates(base)
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| format!("{base}-{}", taken.len() + 1)))
    }

    async fn ensure_user(&self, user_id: i64) -> AppResult<()> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        found.map(|_| ()).ok_or_else(|| AppError::entity_not_found("User"))
    }

    async fn ensure_subject(&self, subject: Subject) -> AppResult<()> {
        match subject {
            Subject::User(user_id) => self.ensure_user(user_id).await,
            Subject::Role(role_id) => self.role(role_id).await.map(|_| ()),
        }
    }
}

fn subject_id(subject: Subject) -> i64 {
    match subject {
        Subject::User(id) | Subject::Role(id) => id,
    }
}

fn title_conflict(catalog: Catalog, title: &str) -> AppError {
    AppError::conflict(format!("{} with title \"{}\" already exists", catalog.label(), title))
}
