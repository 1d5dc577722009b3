use async_trait::async_trait;

use super::principal::Principal;
use super::AccessRule;
use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Denied, with the message returned to the caller.
    Deny(String),
}

/// Capability check strategy for pluggable authorization logic
#[async_trait]
pub trait CapabilityPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy has anything to check for the rule.
    fn applies_to(&self, rule: &AccessRule) -> bool;

    async fn evaluate(&self, principal: &Principal, rule: &AccessRule) -> Decision;
}

/// Boolean admin flag on the user record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminFlagPolicy;

#[async_trait]
impl CapabilityPolicy for AdminFlagPolicy {
    fn name(&self) -> &'static str {
        "admin_flag"
    }

    fn applies_to(&self, rule: &AccessRule) -> bool {
        rule.admin_flag
    }

    async fn evaluate(&self, principal: &Principal, _rule: &AccessRule) -> Decision {
        if principal.is_admin {
            Decision::Allow
        } else {
            Decision::Deny("Admins only".to_string())
        }
    }
}

/// Role/permission graph check.
///
/// Evaluation order:
/// 1. roles and permissions configured -> any role AND any permission
/// 2. roles only -> any role
/// 3. permissions only -> any permission
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleGraphPolicy;

#[async_trait]
impl CapabilityPolicy for RoleGraphPolicy {
    fn name(&self) -> &'static str {
        "role_graph"
    }

    fn applies_to(&self, rule: &AccessRule) -> bool {
        !rule.roles.is_empty() || !rule.permissions.is_empty()
    }

    async fn evaluate(&self, principal: &Principal, rule: &AccessRule) -> Decision {
        let wants_roles = !rule.roles.is_empty();
        let wants_permissions = !rule.permissions.is_empty();

        if wants_roles && wants_permissions {
            if principal.has_any_role(&rule.roles) && principal.has_any_permission(&rule.permissions) {
                return Decision::Allow;
            }
            return Decision::Deny(format!(
                "You do not have the required roles or permissions to access this resource. Required roles: {} and permissions: {}",
                join_with_commas_and(&rule.roles),
                join_with_commas_and(&rule.permissions)
            ));
        }

        if wants_roles {
            if principal.has_any_role(&rule.roles) {
                return Decision::Allow;
            }
            return Decision::Deny(format!(
                "Only {} can access this resource",
                join_with_commas_and(&rule.roles)
            ));
        }

        if principal.has_any_permission(&rule.permissions) {
            return Decision::Allow;
        }
        Decision::Deny(format!(
            "You do not have permission to access this resource. Required permissions: {}",
            join_with_commas_and(&rule.permissions)
        ))
    }
}

static POLICIES: [&(dyn CapabilityPolicy); 2] = [&AdminFlagPolicy, &RoleGraphPolicy];

/// Runs every applicable strategy; the first denial wins.
pub async fn authorize(principal: &Principal, rule: &AccessRule) -> Result<(), AppError> {
    for policy in POLICIES.iter().filter(|p| p.applies_to(rule)) {
        if let Decision::Deny(message) = policy.evaluate(principal, rule).await {
            tracing::debug!(
                user_id = principal.user_id,
                policy = policy.name(),
                roles = ?rule.roles,
                permissions = ?rule.permissions,
                "access denied"
            );
            return Err(AppError::forbidden(message));
        }
    }
    Ok(())
}

/// "`a`", "`a` and `b`", "`a`, `b` and `c`".
pub fn join_with_commas_and<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| format!("`{}`", item.as_ref())).collect();
    match quoted.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    }
}
