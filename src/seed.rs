//! Default roles and permissions. Safe to run repeatedly.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::acl::{Acl, Subject, DEFAULT_SCOPE};
use crate::authz::{roles, Action, Capability, ResourceKind};
use crate::errors::AppResult;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
    pub grants_created: usize,
}

/// Permission slugs each seeded role receives.
pub fn default_grants(role: &str) -> Vec<String> {
    let all = Capability::all();
    let slugs: Vec<Capability> = match role {
        roles::SUPER_ADMIN => all.collect(),
        roles::ADMIN => all.filter(|c| c.resource != ResourceKind::Settings).collect(),
        roles::EDITOR => all
            .filter(|c| {
                let content = matches!(
                    c.resource,
                    ResourceKind::Request | ResourceKind::Complaint | ResourceKind::Resource | ResourceKind::News
                );
                let write = matches!(c.action, Action::View | Action::Create | Action::Edit);
                (content && write) || *c == Capability::new(Action::View, ResourceKind::Commissioner)
            })
            .collect(),
        roles::VIEWER => all
            .filter(|c| {
                c.action == Action::View && !matches!(c.resource, ResourceKind::User | ResourceKind::Settings)
            })
            .collect(),
        _ => Vec::new(),
    };
    slugs.iter().map(Capability::slug).collect()
}

fn role_title(slug: &str) -> &'static str {
    match slug {
        roles::SUPER_ADMIN => "Super Admin",
        roles::ADMIN => "Admin",
        roles::EDITOR => "Editor",
        _ => "Viewer",
    }
}

pub async fn seed_acl(pool: &SqlitePool) -> AppResult<SeedReport> {
    let acl = Acl::new(pool.clone());
    let mut report = SeedReport::default();

    for capability in Capability::all() {
        if insert_fixed(pool, "permissions", &capability.slug(), &capability.title()).await? {
            report.permissions_created += 1;
        }
    }

    for slug in [roles::SUPER_ADMIN, roles::ADMIN, roles::EDITOR, roles::VIEWER] {
        if insert_fixed(pool, "roles", slug, role_title(slug)).await? {
            report.roles_created += 1;
        }

        let role = acl.role_by_slug(slug).await?;
        for permission in default_grants(slug) {
            if acl.allow(Subject::Role(role.id), &permission).await? {
                report.grants_created += 1;
            }
        }
    }

    info!(
        permissions = report.permissions_created,
        roles = report.roles_created,
        grants = report.grants_created,
        "acl seeded"
    );
    Ok(report)
}

/// Seeded rows keep their well-known slug instead of one derived from the title.
async fn insert_fixed(pool: &SqlitePool, table: &'static str, slug: &str, title: &str) -> AppResult<bool> {
    let now = Utc::now();
    let sql = format!(
        "INSERT OR IGNORE INTO {table} (slug, title, scope, created_at, updated_at) VALUES (?, ?, ?, ?, ?)"
    );
    let result = sqlx::query(&sql)
        .bind(slug)
        .bind(title)
        .bind(DEFAULT_SCOPE)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
