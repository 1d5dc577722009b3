use std::collections::HashSet;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;
use crate::jwt::AuthUser;

/// Principal represents the authenticated user with their resolved roles and effective permissions
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: i64,
    pub uuid: Uuid,
    pub is_admin: bool,
    pub roles: HashSet<String>,
    /// Direct grants plus everything granted through held roles.
    pub permissions: HashSet<String>,
}

impl Principal {
    pub fn new(user_id: i64, uuid: Uuid) -> Self {
        Self {
            user_id,
            uuid,
            is_admin: false,
            roles: HashSet::new(),
            permissions: HashSet::new(),
        }
    }

    pub fn with_admin_flag(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_permissions(mut self, perms: impl IntoIterator<Item = String>) -> Self {
        self.permissions = perms.into_iter().collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|role| self.has_role(role.as_ref()))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        permissions.iter().any(|perm| self.has_permission(perm.as_ref()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }

        let user = AuthUser::from_request_parts(parts, state).await?;
        let principal = state.acl().principal(&user).await?;
        parts.extensions.insert(principal.clone());
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_of_checks_intersect_sets() {
        let principal = Principal::new(1, Uuid::new_v4())
            .with_roles(vec!["editor".to_string()])
            .with_permissions(vec!["edit-news".to_string()]);

        assert!(principal.has_any_role(&["admin", "editor"]));
        assert!(!principal.has_any_role(&["admin"]));
        assert!(principal.has_any_permission(&["delete-news", "edit-news"]));
        assert!(!principal.has_any_permission::<&str>(&[]));
    }
}
